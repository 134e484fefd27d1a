pub mod types;
pub mod redis;
pub mod config;

// Re-export commonly used types for convenience
pub use types::{
    ExecutionRequest, ExecutionResult, Problem, RunVerdict, Submission, SubmissionVerdict,
    TestCase, Verdict, VerdictRecord,
};
pub use config::Config;
