// In-process executor double speaking the Judge0 submission protocol
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// How the mock executor answers polls
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Print the sum of all integers found on stdin, after `processing_polls` in-progress replies
    SumStdin { processing_polls: u32 },
    /// Stay in "Processing" forever
    NeverFinish,
    /// Reply to every poll with this JSON body
    Fixed(Value),
    /// Reject submissions with this HTTP status
    RejectSubmit(u16),
}

/// A submission as the mock received it, already base64-decoded
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub language_id: u32,
    pub source_code: String,
    pub stdin: Option<String>,
    pub query: HashMap<String, String>,
    pub auth: Option<String>,
}

#[derive(Deserialize)]
struct SubmissionBody {
    source_code: String,
    language_id: u32,
    #[serde(default)]
    stdin: Option<String>,
}

#[derive(Clone)]
struct MockState {
    behavior: MockBehavior,
    auth_header: String,
    submissions: Arc<Mutex<Vec<RecordedSubmission>>>,
    polls: Arc<Mutex<HashMap<String, u32>>>,
}

fn decode_if(base64: bool, value: String) -> String {
    if !base64 {
        return value;
    }
    general_purpose::STANDARD
        .decode(value.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or(value)
}

fn is_base64(query: &HashMap<String, String>) -> bool {
    query.get("base64_encoded").map(|v| v == "true").unwrap_or(false)
}

async fn create_submission(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<SubmissionBody>,
) -> (StatusCode, Json<Value>) {
    if let MockBehavior::RejectSubmit(code) = state.behavior {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({ "error": "executor unavailable" })));
    }

    let base64 = is_base64(&query);
    let mut submissions = state.submissions.lock().unwrap();
    submissions.push(RecordedSubmission {
        language_id: body.language_id,
        source_code: decode_if(base64, body.source_code),
        stdin: body.stdin.map(|s| decode_if(base64, s)),
        auth: headers
            .get(state.auth_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
        query,
    });

    let token = format!("token-{}", submissions.len() - 1);
    (StatusCode::CREATED, Json(json!({ "token": token })))
}

async fn poll_submission(
    State(state): State<MockState>,
    Path(token): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let index: Option<usize> = token.strip_prefix("token-").and_then(|i| i.parse().ok());
    let submission = index.and_then(|i| state.submissions.lock().unwrap().get(i).cloned());
    let Some(submission) = submission else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })));
    };

    let polls = {
        let mut polls = state.polls.lock().unwrap();
        let count = polls.entry(token).or_insert(0);
        *count += 1;
        *count
    };

    let processing = json!({ "status": { "id": 2, "description": "Processing" } });
    let body = match &state.behavior {
        MockBehavior::NeverFinish => processing,
        MockBehavior::Fixed(value) => value.clone(),
        MockBehavior::RejectSubmit(_) => processing,
        MockBehavior::SumStdin { processing_polls } if polls <= *processing_polls => processing,
        MockBehavior::SumStdin { .. } => {
            let sum: i64 = submission
                .stdin
                .unwrap_or_default()
                .split_whitespace()
                .filter_map(|t| t.parse::<i64>().ok())
                .sum();
            let stdout = format!("{}\n", sum);
            let stdout = if is_base64(&query) {
                general_purpose::STANDARD.encode(stdout)
            } else {
                stdout
            };
            json!({
                "status": { "id": 3, "description": "Accepted" },
                "stdout": stdout,
                "stderr": null,
                "compile_output": null,
                "message": null,
                "time": "0.011",
                "memory": 3400
            })
        }
    };

    (StatusCode::OK, Json(body))
}

pub struct MockExecutor {
    addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    submissions: Arc<Mutex<Vec<RecordedSubmission>>>,
}

impl MockExecutor {
    pub async fn start(behavior: MockBehavior) -> Self {
        Self::start_with_auth_header(behavior, "X-Auth-Token").await
    }

    pub async fn start_with_auth_header(behavior: MockBehavior, auth_header: &str) -> Self {
        let state = MockState {
            behavior,
            auth_header: auth_header.to_lowercase(),
            submissions: Arc::new(Mutex::new(Vec::new())),
            polls: Arc::new(Mutex::new(HashMap::new())),
        };
        let submissions = state.submissions.clone();

        let app = Router::new()
            .route("/submissions", post(create_submission))
            .route("/submissions/:token", get(poll_submission))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("Failed to bind mock executor: {}", e));
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await;
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            submissions,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

impl Drop for MockExecutor {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
