/// Language Registry - maps a language tag to how its source is launched
///
/// **Sources:**
/// - Builtin set (python, javascript) when no languages file exists
/// - `config/languages.json`, written by `gavel-cli add-lang`
///
/// **Lookup:** tags are lowercased on registration and resolution.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Placeholder in `args` replaced with the source artifact path
pub const FILE_PLACEHOLDER: &str = "{file}";

/// How to launch source code for one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub name: String,
    /// File name the source is written under inside the run directory
    pub file_name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(name: &str, file_name: &str, command: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_lowercase(),
            file_name: file_name.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Arguments for a run whose source lives at `source`.
    /// Without a placeholder the path is appended.
    pub fn args_for(&self, source: &Path) -> Vec<String> {
        let path = source.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(FILE_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(FILE_PLACEHOLDER, &path)
                } else {
                    arg.clone()
                }
            })
            .collect();

        if !substituted {
            args.push(path.into_owned());
        }
        args
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct LanguagesJson {
    pub languages: Vec<LaunchSpec>,
}

impl LanguagesJson {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize languages")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Registry of launchable languages
///
/// New languages are added here (or in `languages.json`); the judge and
/// supervisor only ever ask the registry.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    specs: HashMap<String, LaunchSpec>,
    source: Option<PathBuf>,
}

impl LanguageRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Python and JavaScript, launched through their interpreters
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(LaunchSpec::new("python", "main.py", "python3", &["{file}"]));
        registry.register(LaunchSpec::new("javascript", "main.js", "node", &["{file}"]));
        registry
    }

    /// Load from a `languages.json` file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Language config file not found: {}", path.display());
        }

        let file = LanguagesJson::load(path)?;
        let mut registry = Self::empty();
        for spec in file.languages {
            if spec.command.is_empty() {
                bail!("Language '{}' has an empty command", spec.name);
            }
            if registry.resolve(&spec.name).is_some() {
                bail!("Language '{}' is defined twice", spec.name);
            }
            registry.register(spec);
        }
        registry.source = Some(path.to_path_buf());

        Ok(registry)
    }

    /// Load from `path`, or fall back to the builtin set when the file is absent
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::builtin())
        }
    }

    pub fn register(&mut self, mut spec: LaunchSpec) {
        spec.name = spec.name.to_lowercase();
        self.specs.insert(spec.name.clone(), spec);
    }

    /// Case-insensitive lookup
    pub fn resolve(&self, language: &str) -> Option<&LaunchSpec> {
        self.specs.get(&language.to_lowercase())
    }

    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.specs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every spec, ordered by name, in the on-disk layout
    pub fn to_json(&self) -> LanguagesJson {
        LanguagesJson {
            languages: self
                .list_languages()
                .iter()
                .filter_map(|name| self.resolve(name).cloned())
                .collect(),
        }
    }

    /// File the registry was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_languages() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.list_languages(), vec!["javascript", "python"]);
        assert_eq!(registry.resolve("python").unwrap().command, "python3");
        assert!(registry.source().is_none());
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = LanguageRegistry::builtin();
        assert!(registry.resolve("Python").is_some());
        assert!(registry.resolve("JAVASCRIPT").is_some());
        assert!(registry.resolve("cobol").is_none());
    }

    #[test]
    fn test_args_substitute_placeholder() {
        let spec = LaunchSpec::new("java", "Main.java", "java", &["-Xss64m", "{file}"]);
        let args = spec.args_for(Path::new("/tmp/run/Main.java"));
        assert_eq!(args, vec!["-Xss64m", "/tmp/run/Main.java"]);
    }

    #[test]
    fn test_args_append_path_without_placeholder() {
        let spec = LaunchSpec::new("sh", "main.sh", "sh", &[]);
        let args = spec.args_for(Path::new("/tmp/run/main.sh"));
        assert_eq!(args, vec!["/tmp/run/main.sh"]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("languages.json");
        let file = LanguagesJson {
            languages: vec![
                LaunchSpec::new("Ruby", "main.rb", "ruby", &["{file}"]),
                LaunchSpec::new("sh", "main.sh", "sh", &[]),
            ],
        };
        file.save(&path).unwrap();

        let registry = LanguageRegistry::load(&path).unwrap();
        assert_eq!(registry.list_languages(), vec!["ruby", "sh"]);
        assert_eq!(registry.source(), Some(path.as_path()));
    }

    #[test]
    fn test_load_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("languages.json");
        fs::write(
            &path,
            r#"{"languages": [
                {"name": "python", "file_name": "a.py", "command": "python3"},
                {"name": "Python", "file_name": "b.py", "command": "python"}
            ]}"#,
        )
        .unwrap();

        assert!(LanguageRegistry::load(&path).is_err());
    }

    #[test]
    fn test_to_json_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("languages.json");
        LanguageRegistry::builtin().to_json().save(&path).unwrap();

        let registry = LanguageRegistry::load(&path).unwrap();
        assert_eq!(registry.list_languages(), vec!["javascript", "python"]);
        assert_eq!(registry.resolve("javascript").unwrap().command, "node");
    }

    #[test]
    fn test_load_or_builtin_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LanguageRegistry::load_or_builtin(&dir.path().join("missing.json")).unwrap();
        assert_eq!(registry.list_languages(), vec!["javascript", "python"]);
    }
}
