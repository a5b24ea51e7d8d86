//! HTTP transport for the worker contract

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use super::types::ToolName;
use super::worker::{Worker, WorkerRequest, WorkerResponse};
use crate::error::{ErrorKind, ToolError};

pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Worker reached by `POST <endpoint>` with a JSON body
pub struct HttpWorker {
    tool: ToolName,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpWorker {
    pub fn new(
        tool: ToolName,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::validation(format!("invalid HTTP client settings: {}", e)))?;

        Ok(Self {
            tool,
            endpoint: endpoint.into(),
            client,
        })
    }
}

/// Maps an HTTP status onto the error taxonomy
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        408 | 429 => ErrorKind::TransientInfrastructure,
        400 | 422 => ErrorKind::Validation,
        s if s >= 500 => ErrorKind::TransientInfrastructure,
        _ => ErrorKind::TerminalTool,
    }
}

fn classify_transport(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        ErrorKind::TransientInfrastructure
    } else if error.is_decode() {
        ErrorKind::TerminalTool
    } else {
        ErrorKind::TransientInfrastructure
    }
}

#[async_trait]
impl Worker for HttpWorker {
    fn tool(&self) -> ToolName {
        self.tool
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, ToolError> {
        debug!(
            tool = %self.tool,
            endpoint = %self.endpoint,
            correlation_id = %request.correlation_id,
            attempt = request.attempt,
            "POST worker"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(CORRELATION_HEADER, request.correlation_id.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| ToolError::new(classify_transport(&e), e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Prefer the worker's own structured error when it sent one
            if let Ok(parsed) = serde_json::from_str::<WorkerResponse>(&body) {
                if let Some(error) = parsed.error {
                    return Err(error);
                }
            }
            let detail: String = body.chars().take(200).collect();
            return Err(ToolError::new(
                classify_status(status),
                format!("{} returned {}: {}", self.tool, status, detail.trim()),
            ));
        }

        response.json::<WorkerResponse>().await.map_err(|e| {
            ToolError::terminal(format!("{} returned an unreadable body: {}", self.tool, e))
        })
    }
}
