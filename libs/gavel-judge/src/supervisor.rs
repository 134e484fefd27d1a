/// Process Supervisor - runs one ExecutionRequest to one ExecutionResult
///
/// **Per run:**
/// 1. Resolve the language through the registry (unknown → CE, nothing spawned)
/// 2. Write the source into a fresh temporary directory owned by this run
/// 3. Spawn with piped stdin/stdout/stderr, feed stdin then close it
/// 4. Attach the Resource Monitor to the new pid
/// 5. Wait for exit, a monitor breach, or the backstop deadline
///    (`time_limit + grace`), killing the child on the latter two
/// 6. Stop the monitor only after the child is reaped, then build the result
///
/// **Guarantees:**
/// - The temporary directory is a drop guard: removed on every exit path
/// - Faults (artifact I/O, spawn, wait) become typed verdicts, never errors
/// - The child is killed if the run future is dropped mid-flight
use crate::languages::{LanguageRegistry, LaunchSpec};
use crate::monitor::{Breach, ResourceMonitor, DEFAULT_POLL_INTERVAL};
use crate::result::ResultBuilder;
use gavel_common::types::{ExecutionRequest, ExecutionResult, RunVerdict};
use gavel_common::Config;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Safety limits checked before anything touches the filesystem
const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// How long pipe readers may lag behind process exit
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

pub const DEFAULT_BACKSTOP_GRACE: Duration = Duration::from_millis(1000);

/// Internal failure taxonomy; mapped to a run verdict at the boundary
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Source code exceeds maximum size of {0} bytes")]
    SourceTooLarge(usize),
    #[error("Standard input exceeds maximum size of {0} bytes")]
    InputTooLarge(usize),
    #[error("Failed to prepare source artifact: {0}")]
    Artifact(#[source] io::Error),
    #[error("Failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for process: {0}")]
    Wait(#[source] io::Error),
}

impl ExecutionError {
    /// Everything before a live process is a setup failure; a lost wait is a
    /// runtime error of the spawned program.
    pub fn into_result(self) -> ExecutionResult {
        match self {
            ExecutionError::Wait(_) => ExecutionResult {
                verdict: RunVerdict::RuntimeError,
                message: format!("Runtime Error: {}", self),
                ..ExecutionResult::setup_failure(String::new())
            },
            other => ExecutionResult::setup_failure(other.to_string()),
        }
    }
}

/// Anything that can execute a request; the judge is generic over this
pub trait Executor: Send + Sync {
    /// Whether `language` can be launched at all
    fn supports(&self, language: &str) -> bool;

    /// Run to completion. Infallible: faults come back as verdicts.
    fn execute(&self, request: &ExecutionRequest) -> impl Future<Output = ExecutionResult> + Send;
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub poll_interval: Duration,
    pub backstop_grace: Duration,
    /// Parent for per-run temporary directories (system temp dir if unset)
    pub work_dir: Option<PathBuf>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            backstop_grace: DEFAULT_BACKSTOP_GRACE,
            work_dir: None,
        }
    }
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            backstop_grace: config.backstop_grace(),
            work_dir: Some(config.work_dir.clone()),
        }
    }
}

/// Source file for one run, removed with its directory on drop
struct SourceArtifact {
    dir: TempDir,
    path: PathBuf,
}

impl SourceArtifact {
    async fn create(
        work_dir: Option<&Path>,
        file_name: &str,
        code: &str,
    ) -> Result<Self, ExecutionError> {
        if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name) {
            return Err(ExecutionError::Artifact(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid source file name '{}'", file_name),
            )));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("gavel-run-");
        let dir = match work_dir {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .map_err(ExecutionError::Artifact)?;

        let path = dir.path().join(file_name);
        tokio::fs::write(&path, code)
            .await
            .map_err(ExecutionError::Artifact)?;

        Ok(Self { dir, path })
    }

    fn dir(&self) -> &Path {
        self.dir.path()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// How the wait ended
enum Finish {
    Exited(io::Result<ExitStatus>),
    Breach(Breach),
    Backstop,
}

/// Pipe reader whose bytes stay reachable even if the task never finishes
struct PipeReader {
    captured: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

fn spawn_reader<R>(stream: Option<R>) -> PipeReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let task = tokio::spawn(async move {
        let Some(mut stream) = stream else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]);
                }
                Err(e) => {
                    debug!(error = %e, "Pipe read ended early");
                    break;
                }
            }
        }
    });

    PipeReader { captured, task }
}

/// Collect whatever a reader captured, giving it a short grace after exit.
/// Bytes read before the grace runs out are kept either way.
async fn collect_output(reader: PipeReader, stream: &str) -> String {
    let PipeReader { captured, mut task } = reader;
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(stream, error = %e, "Output reader failed"),
        Err(_) => {
            // A descendant still holds the pipe open
            warn!(stream, "Output pipe still open after exit; keeping what was read");
            task.abort();
        }
    }

    let bytes = std::mem::take(&mut *captured.lock().unwrap_or_else(PoisonError::into_inner));
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn terminate(child: &mut Child) -> io::Result<ExitStatus> {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Kill request failed; process likely already exited");
    }
    child.wait().await
}

/// Local-process supervisor
#[derive(Debug, Clone)]
pub struct Supervisor {
    registry: Arc<LanguageRegistry>,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(registry: Arc<LanguageRegistry>, settings: SupervisorSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Execute one request. Always returns a complete result.
    #[instrument(
        skip(self, request),
        fields(
            language = %request.language,
            time_limit_ms = request.time_limit_ms,
            memory_limit_mb = request.memory_limit_mb
        )
    )]
    pub async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        match self.try_run(request).await {
            Ok(result) => {
                debug!(
                    verdict = %result.verdict,
                    exit_code = ?result.exit_code,
                    execution_time_ms = result.execution_time_ms,
                    memory_used_kb = result.memory_used_kb,
                    "Execution finished"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "Execution failed");
                e.into_result()
            }
        }
    }

    async fn try_run(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutionError> {
        let spec = self
            .registry
            .resolve(&request.language)
            .ok_or_else(|| ExecutionError::UnsupportedLanguage(request.language.clone()))?;

        if request.code.len() > MAX_SOURCE_CODE_BYTES {
            return Err(ExecutionError::SourceTooLarge(MAX_SOURCE_CODE_BYTES));
        }
        if request.stdin.len() > MAX_STDIN_BYTES {
            return Err(ExecutionError::InputTooLarge(MAX_STDIN_BYTES));
        }

        // Lives until the end of this function, whichever way it ends
        let artifact =
            SourceArtifact::create(self.settings.work_dir.as_deref(), &spec.file_name, &request.code)
                .await?;

        self.supervise(spec, &artifact, request).await
    }

    async fn supervise(
        &self,
        spec: &LaunchSpec,
        artifact: &SourceArtifact,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut command = Command::new(&spec.command);
        command
            .args(spec.args_for(artifact.path()))
            .current_dir(artifact.dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            command: spec.command.clone(),
            source,
        })?;

        // `id()` is only None once reaped; the monitor then sees no process
        let pid = child.id().unwrap_or_default();
        let mut monitor = ResourceMonitor::new(request.time_limit_ms, request.memory_limit_mb)
            .with_poll_interval(self.settings.poll_interval)
            .attach(pid);

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let stdin_task = child.stdin.take().map(|mut stdin| {
            let input = request.stdin.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    // The program may exit without reading its input
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        debug!(error = %e, "Failed to write stdin");
                    }
                }
                // Dropping the handle closes the pipe (EOF)
            })
        });

        let backstop = tokio::time::sleep(
            Duration::from_millis(request.time_limit_ms) + self.settings.backstop_grace,
        );
        tokio::pin!(backstop);

        let finish = tokio::select! {
            status = child.wait() => Finish::Exited(status),
            breach = monitor.breached() => Finish::Breach(breach),
            _ = &mut backstop => Finish::Backstop,
        };

        let mut backstop_fired = false;
        let status = match finish {
            Finish::Exited(status) => status,
            Finish::Breach(breach) => {
                debug!(pid, ?breach, "Terminating on monitor request");
                terminate(&mut child).await
            }
            Finish::Backstop => {
                backstop_fired = true;
                warn!(pid, "Backstop deadline reached; killing process");
                terminate(&mut child).await
            }
        };
        let elapsed = started.elapsed();

        // Child is reaped (or the wait failed): flags are final now
        let report = monitor.stop().await;

        if let Some(task) = stdin_task {
            task.abort();
        }
        let stdout = collect_output(stdout_reader, "stdout").await;
        let stderr = collect_output(stderr_reader, "stderr").await;

        let status = status.map_err(ExecutionError::Wait)?;

        if report.timed_out || report.memory_exceeded || backstop_fired {
            info!(
                pid,
                timed_out = report.timed_out,
                memory_exceeded = report.memory_exceeded,
                backstop_fired,
                peak_memory_kb = report.peak_memory_kb(),
                "Process terminated for exceeding limits"
            );
        }

        Ok(ResultBuilder::new()
            .exit_code(status.code())
            .output(stdout, stderr)
            .elapsed(elapsed)
            .monitor_report(report)
            .backstop_fired(backstop_fired)
            .build())
    }
}

impl Executor for Supervisor {
    fn supports(&self, language: &str) -> bool {
        self.registry.resolve(language).is_some()
    }

    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.run(request).await
    }
}
