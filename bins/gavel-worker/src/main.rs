mod processor;

use gavel_common::{redis, Config};
use gavel_judge::{Judge, LanguageRegistry, Supervisor, SupervisorSettings};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, instrument, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Gavel worker booting...");

    let config = Config::from_env();

    let registry = LanguageRegistry::load_or_builtin(&config.languages_path).map_err(|e| {
        error!("Failed to load language configurations: {}", e);
        error!("Check {} or unset GAVEL_LANGUAGES", config.languages_path.display());
        e
    })?;

    match registry.source() {
        Some(path) => info!("Loaded languages from {}: {:?}", path.display(), registry.list_languages()),
        None => info!("Using builtin languages: {:?}", registry.list_languages()),
    }

    let settings = SupervisorSettings::from_config(&config);
    debug!(
        poll_interval_ms = settings.poll_interval.as_millis() as u64,
        backstop_grace_ms = settings.backstop_grace.as_millis() as u64,
        work_dir = ?settings.work_dir,
        "Supervisor settings"
    );
    let judge = Judge::new(Supervisor::new(Arc::new(registry), settings));

    // Connect to Redis
    let client = ::redis::Client::open(config.redis_url.as_str())?;
    let mut redis_conn = ::redis::aio::ConnectionManager::new(client).await?;

    info!("Connected to Redis: {}", config.redis_url);
    info!("Queue: {}", redis::SUBMISSION_QUEUE);

    // Setup graceful shutdown
    let shutdown = async {
        signal::ctrl_c().await.expect("failed to install CTRL+C signal handler");
        warn!("Received shutdown signal, stopping worker...");
    };

    tokio::select! {
        _ = worker_loop(&mut redis_conn, &judge, config.verdict_ttl_secs) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip(redis_conn, judge))]
async fn worker_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    judge: &Judge,
    verdict_ttl_secs: u64,
) -> anyhow::Result<()> {
    loop {
        // BLPOP with 5 second timeout for graceful shutdown
        match redis::pop_submission(redis_conn, 5.0).await {
            Ok(Some(submission)) => {
                let submission_id = submission.id;
                info!(
                    submission_id = %submission_id,
                    problem_id = submission.problem_id,
                    language = %submission.language,
                    source_size = submission.code.len(),
                    "Received submission"
                );

                let problem = redis::load_problem(redis_conn, submission.problem_id).await;
                let record = processor::process_submission(judge, &submission, problem).await;

                // Persist verdict to Redis
                match redis::store_verdict(redis_conn, &record, verdict_ttl_secs).await {
                    Ok(_) => {
                        info!(submission_id = %submission_id, verdict = %record.verdict.verdict, "Verdict persisted to Redis");
                    }
                    Err(e) => {
                        error!(submission_id = %submission_id, error = %e, "Failed to persist verdict");
                        // Non-fatal - worker continues
                    }
                }
            }
            Ok(None) => {
                // Timeout - check for shutdown
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
