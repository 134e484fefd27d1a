use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub languages_path: PathBuf,
    pub poll_interval_ms: u64,
    pub backstop_grace_ms: u64,
    pub work_dir: PathBuf,
    pub verdict_ttl_secs: u64,
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            languages_path: env::var("GAVEL_LANGUAGES")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/languages.json")),
            poll_interval_ms: env_u64("GAVEL_POLL_INTERVAL_MS", 10).max(1),
            backstop_grace_ms: env_u64("GAVEL_BACKSTOP_GRACE_MS", 1000),
            work_dir: env::var("GAVEL_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            verdict_ttl_secs: env_u64("GAVEL_VERDICT_TTL_SECS", 86400),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backstop_grace(&self) -> Duration {
        Duration::from_millis(self.backstop_grace_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
