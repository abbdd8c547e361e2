/// Execution Client - Submit and Poll Against the External Executor
///
/// **Core Responsibility:**
/// Turn one `ExecutionRequest` into one normalized `ExecutionOutcome`.
///
/// **Job State Machine:**
/// `Queued → Processing → {Accepted | CompileError | RuntimeError |
///  TimeLimitExceeded | MemoryLimitExceeded | InternalError}`
///
/// **Failure Rules:**
/// - No submission token → `InternalError` carrying the transport error
/// - Transport failure while polling → `InternalError`
/// - Attempt budget exhausted before a terminal status → `InternalError`
///   ("execution timeout"), distinct from the program's own `TimeLimitExceeded`
/// - Nothing is retried except the polling loop itself
///
/// The client never returns an error: every failure is an outcome.

use crate::decoder::{decode_with, OutputEncoding, RawField};
use crate::judge0::Judge0Backend;
use async_trait::async_trait;
use codelab_common::config::ExecutorConfig;
use codelab_common::types::{ExecutionOutcome, ExecutionRequest, TerminalStatus};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Failures talking to the executor, before any job status is known
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to executor failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("executor responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("executor response did not include a submission token")]
    MissingToken,
    #[error("could not decode executor response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorStatus {
    pub id: u32,
    #[serde(default)]
    pub description: String,
}

/// Raw job state as returned by the executor's poll endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmissionSnapshot {
    pub status: ExecutorStatus,
    #[serde(default)]
    pub stdout: Option<RawField>,
    #[serde(default)]
    pub stderr: Option<RawField>,
    #[serde(default)]
    pub compile_output: Option<RawField>,
    /// CPU seconds; the executor sends this as a string
    #[serde(default, deserialize_with = "lenient_number")]
    pub time: Option<f64>,
    /// Kilobytes
    #[serde(default, deserialize_with = "lenient_number")]
    pub memory: Option<f64>,
}

impl SubmissionSnapshot {
    pub fn with_status(id: u32, description: &str) -> Self {
        Self {
            status: ExecutorStatus {
                id,
                description: description.to_string(),
            },
            stdout: None,
            stderr: None,
            compile_output: None,
            time: None,
            memory: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Numeric> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Numeric::Number(n)) => Some(n),
        Some(Numeric::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Transport to an executor service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutorBackend: Send + Sync {
    /// Submit a job, returning its opaque token
    async fn submit(&self, request: &ExecutionRequest) -> Result<String, TransportError>;

    async fn poll(&self, token: &str) -> Result<SubmissionSnapshot, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Processing,
    Finished(TerminalStatus),
}

/// Map an executor status id onto the job state machine
pub fn classify(status_id: u32) -> JobState {
    match status_id {
        1 => JobState::Queued,
        2 => JobState::Processing,
        3 => JobState::Finished(TerminalStatus::Accepted),
        5 => JobState::Finished(TerminalStatus::TimeLimitExceeded),
        6 => JobState::Finished(TerminalStatus::CompileError),
        7 => JobState::Finished(TerminalStatus::MemoryLimitExceeded),
        _ => JobState::Finished(TerminalStatus::RuntimeError),
    }
}

fn first_non_empty(candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Build the outcome for a terminal snapshot, decoding all output channels
pub fn outcome_from_snapshot(
    status: TerminalStatus,
    snapshot: &SubmissionSnapshot,
    encoding: OutputEncoding,
    wall_time_ms: u64,
) -> ExecutionOutcome {
    let stdout = decode_with(snapshot.stdout.as_ref(), encoding);
    let stderr = decode_with(snapshot.stderr.as_ref(), encoding);
    let compile_output = decode_with(snapshot.compile_output.as_ref(), encoding);
    let description = snapshot.status.description.as_str();

    let message = match status {
        TerminalStatus::Accepted => None,
        TerminalStatus::CompileError => first_non_empty(&[&compile_output, description])
            .or_else(|| Some("Compilation error".to_string())),
        TerminalStatus::RuntimeError => {
            first_non_empty(&[&stderr, &compile_output, description])
                .or_else(|| Some("Runtime error".to_string()))
        }
        TerminalStatus::TimeLimitExceeded => {
            first_non_empty(&[description]).or_else(|| Some("Time limit exceeded".to_string()))
        }
        TerminalStatus::MemoryLimitExceeded => {
            first_non_empty(&[description]).or_else(|| Some("Memory limit exceeded".to_string()))
        }
        TerminalStatus::InternalError => first_non_empty(&[description]),
    };

    ExecutionOutcome {
        status,
        stdout,
        stderr,
        compile_output,
        message,
        wall_time_ms,
        cpu_time_secs: snapshot.time,
        memory_kb: snapshot.memory.map(|kb| kb.max(0.0) as u64),
    }
}

/// How long and how often to poll one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for PollBudget {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_attempts: config.max_poll_attempts,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

pub struct ExecutionClient {
    backend: Arc<dyn ExecutorBackend>,
    budget: PollBudget,
    encoding: OutputEncoding,
}

impl ExecutionClient {
    pub fn new(backend: Arc<dyn ExecutorBackend>, budget: PollBudget, encoding: OutputEncoding) -> Self {
        Self {
            backend,
            budget,
            encoding,
        }
    }

    /// Client talking to a Judge0-compatible executor over HTTP
    pub fn from_config(config: &ExecutorConfig) -> Result<Self, TransportError> {
        let backend = Judge0Backend::new(config)?;
        let encoding = if config.base64 {
            OutputEncoding::Base64
        } else {
            OutputEncoding::Plain
        };
        Ok(Self::new(Arc::new(backend), PollBudget::from(config), encoding))
    }

    /// Run with the configured polling budget
    pub async fn run(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        self.run_with_budget(request, self.budget).await
    }

    #[instrument(
        skip(self, request),
        fields(runtime_id = request.runtime_id, max_attempts = budget.max_attempts)
    )]
    pub async fn run_with_budget(
        &self,
        request: &ExecutionRequest,
        budget: PollBudget,
    ) -> ExecutionOutcome {
        let started = Instant::now();

        let token = match self.backend.submit(request).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Submission to executor failed");
                return ExecutionOutcome::internal_error(
                    format!("submission failed: {}", e),
                    elapsed_ms(started),
                );
            }
        };

        debug!(token = %token, "Job submitted");

        for attempt in 1..=budget.max_attempts {
            tokio::time::sleep(budget.interval).await;

            let snapshot = match self.backend.poll(&token).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(token = %token, attempt = attempt, error = %e, "Polling executor failed");
                    return ExecutionOutcome::internal_error(
                        format!("polling failed: {}", e),
                        elapsed_ms(started),
                    );
                }
            };

            match classify(snapshot.status.id) {
                JobState::Queued | JobState::Processing => {
                    debug!(
                        token = %token,
                        attempt = attempt,
                        status = %snapshot.status.description,
                        "Job not finished yet"
                    );
                }
                JobState::Finished(status) => {
                    let wall_time_ms = elapsed_ms(started);
                    info!(
                        token = %token,
                        status = %status,
                        attempts = attempt,
                        wall_time_ms = wall_time_ms,
                        "Job finished"
                    );
                    return outcome_from_snapshot(status, &snapshot, self.encoding, wall_time_ms);
                }
            }
        }

        let wall_time_ms = elapsed_ms(started);
        warn!(
            token = %token,
            attempts = budget.max_attempts,
            wall_time_ms = wall_time_ms,
            "Gave up waiting for executor result"
        );
        ExecutionOutcome::internal_error(
            format!(
                "execution timeout: no result after {} polls ({} ms)",
                budget.max_attempts, wall_time_ms
            ),
            wall_time_ms,
        )
    }
}
