use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Executor-specific identifier of a compiler/interpreter version
pub type RuntimeId = u32;

/// Reference data describing one supported language.
/// Edited by administrators through `config/languages.json`, never by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: String,
    pub display_name: String,
    pub runtime_id: RuntimeId,
    pub file_extension: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// One submission to the executor. Built fresh per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub runtime_id: RuntimeId,
    pub source_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

/// Terminal state reached by a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminalStatus {
    Accepted,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    InternalError,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::Accepted => "accepted",
            TerminalStatus::CompileError => "compile_error",
            TerminalStatus::RuntimeError => "runtime_error",
            TerminalStatus::TimeLimitExceeded => "time_limit_exceeded",
            TerminalStatus::MemoryLimitExceeded => "memory_limit_exceeded",
            TerminalStatus::InternalError => "internal_error",
        }
    }

    /// Resource-limit statuses are reported apart from crashes
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            TerminalStatus::TimeLimitExceeded | TerminalStatus::MemoryLimitExceeded
        )
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result of a single executor job.
///
/// All three output channels have already been through the output decoder.
/// `wall_time_ms` is the time spent submitting and polling, whatever the status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: TerminalStatus,
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub wall_time_ms: u64,
    /// CPU time reported by the executor, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_kb: Option<u64>,
}

impl ExecutionOutcome {
    pub fn internal_error(message: impl Into<String>, wall_time_ms: u64) -> Self {
        Self {
            status: TerminalStatus::InternalError,
            stdout: String::new(),
            stderr: String::new(),
            compile_output: String::new(),
            message: Some(message.into()),
            wall_time_ms,
            cpu_time_secs: None,
            memory_kb: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == TerminalStatus::Accepted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub index: usize,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    pub status: TerminalStatus,
    pub wall_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerdictStatus {
    Passed,
    Failed,
    Error,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Passed => "passed",
            VerdictStatus::Failed => "failed",
            VerdictStatus::Error => "error",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final judgment of one grading run.
///
/// `tests_passed` always equals the number of passing entries in `test_results`,
/// and `score` is `tests_passed / tests_total * 100` (0 for an empty suite).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionVerdict {
    pub status: VerdictStatus,
    pub test_results: Vec<TestCaseResult>,
    pub tests_passed: usize,
    pub tests_total: usize,
    pub score: f64,
    pub aggregate_wall_time_ms: u64,
    /// Outcome of the bare execution when the lesson has no test cases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_outcome: Option<ExecutionOutcome>,
}

/// Persisted form of a verdict, handed to the rest of the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub verdict: SubmissionVerdict,
}

impl SubmissionRecord {
    pub fn new(lesson_id: Option<String>, language: &str, verdict: SubmissionVerdict) -> Self {
        Self {
            id: Uuid::new_v4(),
            lesson_id,
            language: language.to_string(),
            created_at: Utc::now(),
            verdict,
        }
    }
}
