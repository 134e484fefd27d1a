/// Submission processing - one dequeued submission to one verdict record
///
/// Takes the outcome of the problem lookup rather than a connection, so the
/// worker loop owns all Redis I/O and a store fault still yields a verdict.
use gavel_common::types::{Problem, Submission, SubmissionVerdict, VerdictRecord};
use gavel_judge::{Executor, Judge};
use std::fmt::Display;
use tracing::{error, info, instrument};

#[instrument(
    skip_all,
    fields(submission_id = %submission.id, problem_id = submission.problem_id, language = %submission.language)
)]
pub async fn process_submission<E, Err>(
    judge: &Judge<E>,
    submission: &Submission,
    problem: Result<Option<Problem>, Err>,
) -> VerdictRecord
where
    E: Executor,
    Err: Display,
{
    let verdict = match problem {
        Ok(problem) => {
            judge
                .judge(problem.as_ref(), &submission.language, &submission.code)
                .await
        }
        Err(e) => {
            error!(error = %e, "Failed to load problem");
            SubmissionVerdict::setup_failure(format!("Problem store unavailable: {}", e))
        }
    };

    info!(
        verdict = %verdict.verdict,
        passed = verdict.test_cases_passed,
        total = verdict.total_test_cases,
        execution_time_ms = verdict.execution_time_ms,
        memory_used_kb = verdict.memory_used_kb,
        "Submission judged"
    );

    VerdictRecord::new(submission, verdict)
}
