/// Execution Result Builder - folds one finished run into an ExecutionResult
///
/// **Classification order:**
/// 1. Monitor time flag, or the supervisor's backstop → TLE
/// 2. Monitor memory flag → MLE
/// 3. Non-zero exit or death by signal → RE, quoting the start of stderr
/// 4. Otherwise → OK
///
/// Memory is the monitor's peak, not a final reading; time is the
/// supervisor's own wall clock.
use crate::monitor::MonitorReport;
use gavel_common::types::{ExecutionResult, RunVerdict};
use std::time::Duration;

/// Characters of stderr quoted in a runtime-error message
pub const STDERR_EXCERPT_CHARS: usize = 200;

/// First `STDERR_EXCERPT_CHARS` characters (not bytes) of `stderr`
pub fn stderr_excerpt(stderr: &str) -> &str {
    match stderr.char_indices().nth(STDERR_EXCERPT_CHARS) {
        Some((idx, _)) => &stderr[..idx],
        None => stderr,
    }
}

/// Monitor flags first, then exit status
pub fn classify(
    report: &MonitorReport,
    backstop_fired: bool,
    exit_code: Option<i32>,
    stderr: &str,
) -> (RunVerdict, String) {
    if report.timed_out || backstop_fired {
        (RunVerdict::TimeLimitExceeded, "Time Limit Exceeded".to_string())
    } else if report.memory_exceeded {
        (RunVerdict::MemoryLimitExceeded, "Memory Limit Exceeded".to_string())
    } else if exit_code != Some(0) {
        (
            RunVerdict::RuntimeError,
            format!("Runtime Error: {}", stderr_excerpt(stderr)),
        )
    } else {
        (RunVerdict::Ok, "Execution completed successfully".to_string())
    }
}

/// Raw observations of one finished (or killed) process
#[derive(Debug, Default)]
pub struct ResultBuilder {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    elapsed: Duration,
    report: MonitorReport,
    backstop_fired: bool,
}

impl ResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// Wall-clock time measured by the supervisor
    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn monitor_report(mut self, report: MonitorReport) -> Self {
        self.report = report;
        self
    }

    pub fn backstop_fired(mut self, fired: bool) -> Self {
        self.backstop_fired = fired;
        self
    }

    pub fn build(self) -> ExecutionResult {
        let (verdict, message) = classify(
            &self.report,
            self.backstop_fired,
            self.exit_code,
            &self.stderr,
        );

        ExecutionResult {
            verdict,
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code: self.exit_code,
            execution_time_ms: self.elapsed.as_millis() as u64,
            memory_used_kb: self.report.peak_memory_kb(),
            message,
        }
    }
}
