use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

/// Request bodies carry the source plus all test data, both already size-checked in handlers
const MAX_BODY_BYTES: usize = handlers::MAX_SOURCE_BYTES + handlers::MAX_TEST_DATA_BYTES + 64 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::health_check))
        .route("/languages", get(handlers::list_languages))
        .route("/grade", post(handlers::grade_submission))
        .route("/run", post(handlers::run_code))
        .route("/submissions/:submission_id", get(handlers::get_submission))
        .route(
            "/lessons/:lesson_id/submissions",
            get(handlers::lesson_submissions),
        )
        .route("/metrics", get(handlers::metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
