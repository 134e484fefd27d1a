use crate::types::{Problem, Submission, VerdictRecord};
use redis::{AsyncCommands, RedisResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Redis layout shared by the worker and the CLI, so key names never drift.
/// Problems are owned by the external store; gavel only reads them.

pub const SUBMISSION_QUEUE: &str = "gavel:queue:submissions";
pub const PROBLEM_PREFIX: &str = "gavel:problem";
pub const VERDICT_PREFIX: &str = "gavel:verdict";
pub const STATUS_PREFIX: &str = "gavel:status";

pub fn problem_key(problem_id: u64) -> String {
    format!("{}:{}", PROBLEM_PREFIX, problem_id)
}

pub fn verdict_key(submission_id: &uuid::Uuid) -> String {
    format!("{}:{}", VERDICT_PREFIX, submission_id)
}

pub fn status_key(submission_id: &uuid::Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, submission_id)
}

fn encode<T: Serialize>(value: &T) -> RedisResult<String> {
    serde_json::to_string(value).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
    })
}

fn decode<T: DeserializeOwned>(payload: &str) -> RedisResult<T> {
    serde_json::from_str(payload).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string()))
    })
}

/// Enqueue a submission (RPUSH, FIFO with BLPOP)
pub async fn push_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload = encode(submission)?;
    conn.rpush(SUBMISSION_QUEUE, payload).await
}

/// Pop the next submission, waiting at most `timeout_seconds`
pub async fn pop_submission(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<Submission>> {
    let result: Option<(String, String)> = conn.blpop(SUBMISSION_QUEUE, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => Ok(Some(decode(&payload)?)),
        None => Ok(None),
    }
}

/// Load a problem with its full ordered test-case set
pub async fn load_problem(
    conn: &mut redis::aio::ConnectionManager,
    problem_id: u64,
) -> RedisResult<Option<Problem>> {
    let payload: Option<String> = conn.get(problem_key(problem_id)).await?;
    payload.as_deref().map(decode::<Problem>).transpose()
}

/// Persist a verdict record plus a bare status string for cheap polling
pub async fn store_verdict(
    conn: &mut redis::aio::ConnectionManager,
    record: &VerdictRecord,
    ttl_secs: u64,
) -> RedisResult<()> {
    let payload = encode(record)?;
    let _: () = conn
        .set_ex(verdict_key(&record.submission_id), payload, ttl_secs)
        .await?;
    let _: () = conn
        .set_ex(
            status_key(&record.submission_id),
            record.verdict.verdict.code(),
            ttl_secs,
        )
        .await?;

    Ok(())
}

pub async fn get_verdict(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &uuid::Uuid,
) -> RedisResult<Option<VerdictRecord>> {
    let payload: Option<String> = conn.get(verdict_key(submission_id)).await?;
    payload.as_deref().map(decode::<VerdictRecord>).transpose()
}
