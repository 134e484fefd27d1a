use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Submission verdict
///
/// Variants are declared in ascending severity, so `Ord` encodes the
/// precedence CE > TLE > MLE > RE > WA > AC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "MLE")]
    MemoryLimitExceeded,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "CE")]
    CompilationError,
}

impl Verdict {
    pub fn code(&self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::RuntimeError => "RE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::CompilationError => "CE",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of a single supervised run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunVerdict {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "MLE")]
    MemoryLimitExceeded,
    #[serde(rename = "RE")]
    RuntimeError,
    /// Setup failure: nothing was (successfully) spawned
    #[serde(rename = "CE")]
    SetupFailure,
}

impl fmt::Display for RunVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            RunVerdict::Ok => "OK",
            RunVerdict::TimeLimitExceeded => "TLE",
            RunVerdict::MemoryLimitExceeded => "MLE",
            RunVerdict::RuntimeError => "RE",
            RunVerdict::SetupFailure => "CE",
        };
        f.write_str(code)
    }
}

/// One execution of candidate code (immutable once built)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: String,
    pub stdin: String,
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
}

impl ExecutionRequest {
    pub fn new(
        code: impl Into<String>,
        language: impl Into<String>,
        stdin: impl Into<String>,
        time_limit_ms: u64,
        memory_limit_mb: u64,
    ) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            stdin: stdin.into(),
            time_limit_ms,
            memory_limit_mb,
        }
    }
}

/// Typed outcome of one run
///
/// `memory_used_kb` is the peak resident memory sampled while the process
/// ran, `execution_time_ms` is wall-clock from spawn to exit or kill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub verdict: RunVerdict,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    pub memory_used_kb: u64,
    pub message: String,
}

impl ExecutionResult {
    /// Result for a run that never got as far as a live process
    pub fn setup_failure(message: impl Into<String>) -> Self {
        Self {
            verdict: RunVerdict::SetupFailure,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            execution_time_ms: 0,
            memory_used_kb: 0,
            message: message.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == RunVerdict::Ok
    }
}

fn default_time_limit_ms() -> u64 {
    2000
}

fn default_memory_limit_mb() -> u64 {
    256
}

/// Test case as held by the problem store (read-only to the judge)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input_data: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_sample: bool,
}

/// Problem with its ordered test cases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl Problem {
    pub fn samples(&self) -> impl Iterator<Item = &TestCase> {
        self.test_cases.iter().filter(|tc| tc.is_sample)
    }
}

/// Aggregated result for one submission
///
/// `test_cases_passed` only counts cases before the first failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionVerdict {
    pub verdict: Verdict,
    pub message: String,
    pub test_cases_passed: u32,
    pub total_test_cases: u32,
    pub execution_time_ms: u64,
    pub memory_used_kb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl SubmissionVerdict {
    /// CE raised before any test case ran
    pub fn setup_failure(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::CompilationError,
            message: message.into(),
            test_cases_passed: 0,
            total_test_cases: 0,
            execution_time_ms: 0,
            memory_used_kb: 0,
            expected: None,
            actual: None,
        }
    }
}

/// Queued unit of work for a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub problem_id: u64,
    pub language: String,
    pub code: String,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(problem_id: u64, language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            problem_id,
            language: language.into(),
            code: code.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// What the worker hands to the persistence side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub submission_id: Uuid,
    pub problem_id: u64,
    pub language: String,
    #[serde(flatten)]
    pub verdict: SubmissionVerdict,
    pub judged_at: DateTime<Utc>,
}

impl VerdictRecord {
    pub fn new(submission: &Submission, verdict: SubmissionVerdict) -> Self {
        Self {
            submission_id: submission.id,
            problem_id: submission.problem_id,
            language: submission.language.clone(),
            verdict,
            judged_at: Utc::now(),
        }
    }
}
