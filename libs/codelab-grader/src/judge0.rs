// HTTP backend for Judge0-compatible executors
use crate::client::{ExecutorBackend, SubmissionSnapshot, TransportError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use codelab_common::config::ExecutorConfig;
use codelab_common::types::ExecutionRequest;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const POLL_FIELDS: &str = "status,stdout,stderr,compile_output,message,time,memory";

/// Error bodies are logged and surfaced in messages, so keep them short
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct SubmissionBody {
    source_code: String,
    language_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut short: String = body.chars().take(MAX_ERROR_BODY).collect();
    short.push_str("...");
    short
}

pub struct Judge0Backend {
    http: reqwest::Client,
    base_url: String,
    base64: bool,
}

impl Judge0Backend {
    pub fn new(config: &ExecutorConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            match (
                HeaderName::from_bytes(config.api_key_header.as_bytes()),
                HeaderValue::from_str(key),
            ) {
                (Ok(name), Ok(mut value)) => {
                    value.set_sensitive(true);
                    headers.insert(name, value);
                }
                _ => warn!(
                    header = %config.api_key_header,
                    "Executor API key is not a valid HTTP header, sending requests without it"
                ),
            }
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            base64: config.base64,
        })
    }

    fn encode(&self, text: &str) -> String {
        if self.base64 {
            general_purpose::STANDARD.encode(text)
        } else {
            text.to_string()
        }
    }

    fn body_for(&self, request: &ExecutionRequest) -> SubmissionBody {
        SubmissionBody {
            source_code: self.encode(&request.source_code),
            language_id: request.runtime_id,
            stdin: request.stdin.as_deref().map(|s| self.encode(s)),
        }
    }

    /// Read the body, turning non-2xx responses into `TransportError::Status`
    async fn checked_text(response: reqwest::Response) -> Result<String, TransportError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ExecutorBackend for Judge0Backend {
    async fn submit(&self, request: &ExecutionRequest) -> Result<String, TransportError> {
        let url = format!("{}/submissions", self.base_url);
        let response = self
            .http
            .post(&url)
            .query(&[
                ("base64_encoded", if self.base64 { "true" } else { "false" }),
                ("wait", "false"),
            ])
            .json(&self.body_for(request))
            .send()
            .await?;

        let body = Self::checked_text(response).await?;
        let parsed: TokenResponse = serde_json::from_str(&body)?;

        match parsed.token {
            Some(token) if !token.trim().is_empty() => {
                debug!(token = %token, "Executor accepted submission");
                Ok(token)
            }
            _ => Err(TransportError::MissingToken),
        }
    }

    async fn poll(&self, token: &str) -> Result<SubmissionSnapshot, TransportError> {
        let url = format!("{}/submissions/{}", self.base_url, token);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("base64_encoded", if self.base64 { "true" } else { "false" }),
                ("fields", POLL_FIELDS),
            ])
            .send()
            .await?;

        let body = Self::checked_text(response).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
