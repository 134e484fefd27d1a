// CLI commands for judging locally and talking to the gavel queue
use anyhow::{bail, Context, Result};
use gavel_common::types::{ExecutionRequest, ExecutionResult, Problem, Submission, SubmissionVerdict, VerdictRecord};
use gavel_common::{redis, Config};
use gavel_judge::languages::LanguagesJson;
use gavel_judge::{Judge, LanguageRegistry, LaunchSpec, Supervisor, SupervisorSettings};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Pretty-print any boundary record to stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn read_file(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {} {}", what, path.display()))
}

fn load_problem_file(path: &Path) -> Result<Problem> {
    let content = read_file(path, "problem")?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse problem {}", path.display()))
}

fn local_supervisor(languages: &Path, config: &Config) -> Result<Supervisor> {
    let registry = LanguageRegistry::load_or_builtin(languages)?;
    Ok(Supervisor::new(
        Arc::new(registry),
        SupervisorSettings::from_config(config),
    ))
}

async fn connect(config: &Config) -> Result<::redis::aio::ConnectionManager> {
    let client = ::redis::Client::open(config.redis_url.as_str())
        .with_context(|| format!("Invalid Redis URL {}", config.redis_url))?;
    ::redis::aio::ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))
}

/// Judge a source file against a problem file, entirely in-process
#[instrument(skip(config))]
pub async fn judge_local(
    problem_path: &Path,
    language: &str,
    source_path: &Path,
    languages: &Path,
    config: &Config,
) -> Result<SubmissionVerdict> {
    let problem = load_problem_file(problem_path)?;
    let code = read_file(source_path, "source")?;
    debug!(problem_id = problem.id, test_cases = problem.test_cases.len(), "Loaded problem file");
    let judge = Judge::new(local_supervisor(languages, config)?);

    Ok(judge.judge(Some(&problem), language, &code).await)
}

/// One supervised run with explicit limits and optional stdin file
#[instrument(skip(config))]
pub async fn run_local(
    language: &str,
    source_path: &Path,
    input_path: Option<&Path>,
    time_limit_ms: u64,
    memory_limit_mb: u64,
    languages: &Path,
    config: &Config,
) -> Result<ExecutionResult> {
    let code = read_file(source_path, "source")?;
    let stdin = match input_path {
        Some(path) => read_file(path, "input")?,
        None => String::new(),
    };
    let supervisor = local_supervisor(languages, config)?;
    let request = ExecutionRequest::new(code, language, stdin, time_limit_ms, memory_limit_mb);

    Ok(supervisor.run(&request).await)
}

/// Enqueue a submission for the workers
pub async fn submit(problem_id: u64, language: &str, source_path: &Path, config: &Config) -> Result<Uuid> {
    let code = read_file(source_path, "source")?;
    let submission = Submission::new(problem_id, language, code);

    let mut conn = connect(config).await?;
    redis::push_submission(&mut conn, &submission)
        .await
        .context("Failed to enqueue submission")?;

    info!(
        submission_id = %submission.id,
        problem_id,
        language,
        queue = redis::SUBMISSION_QUEUE,
        "Submission queued"
    );
    Ok(submission.id)
}

/// Stored verdict for a submission, `None` while it is still pending
pub async fn status(submission_id: &Uuid, config: &Config) -> Result<Option<VerdictRecord>> {
    let mut conn = connect(config).await?;
    let record = redis::get_verdict(&mut conn, submission_id)
        .await
        .context("Failed to read verdict")?;

    match &record {
        Some(record) => debug!(submission_id = %submission_id, verdict = %record.verdict.verdict, "Verdict found"),
        None => debug!(submission_id = %submission_id, "Verdict pending"),
    }
    Ok(record)
}

/// Languages file contents, seeded with the builtin set when absent
fn load_languages_config(path: &Path) -> Result<LanguagesJson> {
    if !path.exists() {
        return Ok(LanguageRegistry::builtin().to_json());
    }
    LanguagesJson::load(path)
}

/// Append a language to the languages file
pub fn add_language(
    path: &Path,
    name: &str,
    command: &str,
    args: &[String],
    file_name: &str,
) -> Result<LaunchSpec> {
    // Validate inputs
    if name.trim().is_empty() || command.trim().is_empty() {
        bail!("Language name and command cannot be empty");
    }
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name == "." || file_name == ".." {
        bail!("Invalid source file name '{}'", file_name);
    }

    let mut languages_json = load_languages_config(path)?;

    // Check if language already exists
    if languages_json
        .languages
        .iter()
        .any(|l| l.name.eq_ignore_ascii_case(name))
    {
        bail!("Language '{}' already exists in {}", name, path.display());
    }

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let spec = LaunchSpec::new(name, file_name, command, &args);
    languages_json.languages.push(spec.clone());

    languages_json.save(path)?;
    info!(language = %spec.name, command = %spec.command, path = %path.display(), "Language added");
    Ok(spec)
}

/// Registered language tags, from the file or the builtin set
pub fn list_languages(path: &Path) -> Result<Vec<LaunchSpec>> {
    let registry = LanguageRegistry::load_or_builtin(path)?;
    Ok(registry.to_json().languages)
}
