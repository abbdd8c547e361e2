use crate::types::SubmissionRecord;
use redis::{AsyncCommands, RedisResult};
use uuid::Uuid;

/// Redis layout for submission records.
/// The grading pipeline owns no durable state; the API persists what it hands back.

pub const SUBMISSION_PREFIX: &str = "codelab:submission";
pub const LESSON_PREFIX: &str = "codelab:lesson";

/// Most recent submission ids remembered per lesson
pub const LESSON_HISTORY_LEN: isize = 50;

pub fn submission_key(id: &Uuid) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, id)
}

pub fn lesson_submissions_key(lesson_id: &str) -> String {
    format!("{}:{}:submissions", LESSON_PREFIX, lesson_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Store a submission record with a TTL, and index it under its lesson
pub async fn store_submission(
    conn: &mut redis::aio::ConnectionManager,
    record: &SubmissionRecord,
    ttl_seconds: u64,
) -> RedisResult<()> {
    let payload = serde_json::to_string(record).map_err(serialization_error)?;
    let _: () = conn.set_ex(submission_key(&record.id), payload, ttl_seconds).await?;

    if let Some(lesson_id) = &record.lesson_id {
        let key = lesson_submissions_key(lesson_id);
        let _: () = conn.lpush(&key, record.id.to_string()).await?;
        let _: () = conn.ltrim(&key, 0, LESSON_HISTORY_LEN - 1).await?;
        let _: () = conn.expire(&key, ttl_seconds as i64).await?;
    }

    Ok(())
}

pub async fn get_submission(
    conn: &mut redis::aio::ConnectionManager,
    id: &Uuid,
) -> RedisResult<Option<SubmissionRecord>> {
    let payload: Option<String> = conn.get(submission_key(id)).await?;

    match payload {
        Some(data) => {
            let record: SubmissionRecord = serde_json::from_str(&data).map_err(|e| {
                redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            })?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Newest-first submission ids recorded for a lesson
pub async fn lesson_submissions(
    conn: &mut redis::aio::ConnectionManager,
    lesson_id: &str,
) -> RedisResult<Vec<Uuid>> {
    let ids: Vec<String> = conn
        .lrange(lesson_submissions_key(lesson_id), 0, LESSON_HISTORY_LEN - 1)
        .await?;
    Ok(ids.iter().filter_map(|id| Uuid::parse_str(id).ok()).collect())
}
