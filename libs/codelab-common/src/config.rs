// Environment-driven configuration shared by the API and the CLI

use crate::types::RuntimeId;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_EXECUTOR_URL: &str = "http://127.0.0.1:2358";
pub const DEFAULT_API_KEY_HEADER: &str = "X-Auth-Token";
pub const DEFAULT_LANGUAGES_CONFIG: &str = "config/languages.json";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Read an environment variable, falling back to `default` when unset or unparseable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key = key, value = %raw, "Ignoring unparseable environment value");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Connection settings for the external executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Exchange source, stdin and outputs base64-encoded
    pub base64: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EXECUTOR_URL.to_string(),
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            request_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 20,
            base64: true,
        }
    }
}

impl ExecutorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_string("EXECUTOR_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: env_string("EXECUTOR_API_KEY"),
            api_key_header: env_string("EXECUTOR_API_KEY_HEADER")
                .unwrap_or(defaults.api_key_header),
            request_timeout: Duration::from_millis(env_or(
                "EXECUTOR_REQUEST_TIMEOUT_MS",
                defaults.request_timeout.as_millis() as u64,
            )),
            poll_interval: Duration::from_millis(env_or(
                "EXECUTOR_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            max_poll_attempts: env_or("EXECUTOR_MAX_POLL_ATTEMPTS", defaults.max_poll_attempts),
            base64: env_or("EXECUTOR_BASE64", defaults.base64),
        }
    }

    /// Worst-case time spent polling one job
    pub fn polling_deadline(&self) -> Duration {
        self.poll_interval * self.max_poll_attempts
    }
}

/// Grading policy
#[derive(Debug, Clone)]
pub struct GradingConfig {
    /// Minimum score (percent) for a `Passed` verdict
    pub pass_threshold: f64,
    /// Also hand the raw test input to the executor as stdin
    pub forward_stdin: bool,
    /// Runtime used when a language is unknown or inactive
    pub default_runtime_id: RuntimeId,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 80.0,
            forward_stdin: true,
            default_runtime_id: 71,
        }
    }
}

impl GradingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pass_threshold: env_or("GRADING_PASS_THRESHOLD", defaults.pass_threshold),
            forward_stdin: env_or("GRADING_FORWARD_STDIN", defaults.forward_stdin),
            default_runtime_id: env_or("DEFAULT_RUNTIME_ID", defaults.default_runtime_id),
        }
    }
}

/// Path of the administrator-edited language table
pub fn languages_config_path() -> String {
    env_string("LANGUAGES_CONFIG").unwrap_or_else(|| DEFAULT_LANGUAGES_CONFIG.to_string())
}

pub fn redis_url() -> String {
    env_string("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string())
}

pub fn submission_ttl_seconds() -> u64 {
    env_or("SUBMISSION_TTL_SECONDS", 86_400)
}

pub fn bind_addr() -> String {
    env_string("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
}
