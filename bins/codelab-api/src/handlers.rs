// HTTP route handlers for the Codelab grading API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use codelab_common::redis;
use codelab_common::types::{Language, TestCase};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

/// Largest accepted source file
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// Largest accepted total of test case inputs and expected outputs
pub const MAX_TEST_DATA_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub source_code: String,
    pub language: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub source_code: String,
    pub language: String,
    #[serde(default)]
    pub stdin: Option<String>,
}

/// A rejected request, rendered as `{"error": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub fn validate_source(source_code: &str) -> Result<(), ApiError> {
    if source_code.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "source_code cannot be empty",
        ));
    }
    if source_code.len() > MAX_SOURCE_BYTES {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("source_code exceeds {} bytes", MAX_SOURCE_BYTES),
        ));
    }
    Ok(())
}

pub fn validate_test_data(test_cases: &[TestCase], stdin: Option<&str>) -> Result<(), ApiError> {
    let total: usize = test_cases
        .iter()
        .map(|tc| tc.input.len() + tc.expected_output.len())
        .sum::<usize>()
        + stdin.map(str::len).unwrap_or(0);

    if total > MAX_TEST_DATA_BYTES {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("test input exceeds {} bytes", MAX_TEST_DATA_BYTES),
        ));
    }
    Ok(())
}

/// GET /status - Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "persistence": state.redis.is_some(),
            "pass_threshold": state.pipeline.grading_config().pass_threshold,
            "default_runtime_id": state.pipeline.registry().default_runtime_id(),
            "time": Utc::now(),
        })),
    )
}

/// GET /languages - Languages learners can submit in
pub async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let languages: Vec<Language> = state
        .pipeline
        .registry()
        .active_languages()
        .into_iter()
        .cloned()
        .collect();
    Json(languages)
}

/// POST /grade - Grade a submission against its test cases
pub async fn grade_submission(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_source(&payload.source_code)?;
    validate_test_data(&payload.test_cases, None)?;

    let started = Instant::now();
    let record = state
        .pipeline
        .grade_submission(
            &payload.source_code,
            &payload.language,
            payload.lesson_id.as_deref(),
            &payload.test_cases,
        )
        .await;
    metrics::record_verdict(&record.verdict, started.elapsed());

    if let Some(conn) = &state.redis {
        let mut conn = conn.clone();
        match redis::store_submission(&mut conn, &record, state.submission_ttl).await {
            Ok(()) => info!(submission_id = %record.id, "Submission stored"),
            Err(e) => error!(submission_id = %record.id, error = %e, "Failed to store submission"),
        }
    }

    Ok((StatusCode::OK, Json(record)))
}

/// POST /run - Execute once without grading
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_source(&payload.source_code)?;
    validate_test_data(&[], payload.stdin.as_deref())?;

    let outcome = state
        .pipeline
        .run_adhoc(
            &payload.source_code,
            &payload.language,
            payload.stdin.as_deref(),
        )
        .await;
    metrics::record_outcome(&outcome);

    info!(
        language = %payload.language,
        status = %outcome.status,
        wall_time_ms = outcome.wall_time_ms,
        "Ad-hoc run finished"
    );

    Ok(Json(outcome))
}

/// GET /submissions/{id} - Fetch a stored submission record
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = Uuid::parse_str(&submission_id)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Invalid submission ID format"))?;

    let Some(conn) = &state.redis else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Submission storage is not configured",
        ));
    };

    let mut conn = conn.clone();
    match redis::get_submission(&mut conn, &id).await {
        Ok(Some(record)) => Ok((StatusCode::OK, Json(record)).into_response()),
        Ok(None) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Submission {} not found", id),
        )),
        Err(e) => {
            error!(submission_id = %id, error = %e, "Failed to fetch submission");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to fetch submission: {}", e),
            ))
        }
    }
}

/// GET /lessons/{lesson_id}/submissions - Recent submission ids for a lesson
pub async fn lesson_submissions(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(conn) = &state.redis else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Submission storage is not configured",
        ));
    };

    let mut conn = conn.clone();
    match redis::lesson_submissions(&mut conn, &lesson_id).await {
        Ok(ids) => Ok(Json(serde_json::json!({
            "lesson_id": lesson_id,
            "submissions": ids,
        }))
        .into_response()),
        Err(e) => {
            error!(lesson_id = %lesson_id, error = %e, "Failed to list lesson submissions");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to list submissions: {}", e),
            ))
        }
    }
}

/// GET /metrics - Prometheus exposition
pub async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
