use super::client::LLMClient;
use super::error::BackendError;
use super::types::{LLMRequest, LLMResponse, ToolCall};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted agent backend
///
/// Replays queued responses in order and records every request it receives.
/// An exhausted queue is reported as a backend error.
pub struct MockLLMClient {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<LLMRequest>>,
    delay: Option<Duration>,
    name: String,
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub error: Option<BackendError>,
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            error: None,
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            content: String::new(),
            tool_calls: vec![call],
            error: None,
        }
    }

    pub fn error(error: BackendError) -> Self {
        Self {
            content: String::new(),
            tool_calls: Vec::new(),
            error: Some(error),
        }
    }
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self::with_name("MockLLM")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            name: name.into(),
        }
    }

    /// Sleeps before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add_response(&self, response: MockResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    pub fn add_responses(&self, responses: impl IntoIterator<Item = MockResponse>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.extend(responses);
        }
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<LLMRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn analyze_terrain_call(
        call_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> ToolCall {
        ToolCall::new(
            call_id,
            "analyze_terrain",
            json!({ "latitude": latitude, "longitude": longitude }),
        )
    }

    pub fn optimize_layout_call(
        call_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        capacity_mw: Option<f64>,
    ) -> ToolCall {
        let mut arguments = json!({ "latitude": latitude, "longitude": longitude });
        if let Some(capacity) = capacity_mw {
            arguments["capacityMw"] = json!(capacity);
        }
        ToolCall::new(call_id, "optimize_layout", arguments)
    }

    pub fn run_simulation_call(
        call_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> ToolCall {
        ToolCall::new(
            call_id,
            "run_simulation",
            json!({ "latitude": latitude, "longitude": longitude }),
        )
    }

    pub fn generate_report_call(call_id: impl Into<String>) -> ToolCall {
        ToolCall::new(call_id, "generate_report", json!({}))
    }

    pub fn clarification_call(call_id: impl Into<String>, question: impl Into<String>) -> ToolCall {
        ToolCall::new(
            call_id,
            "request_clarification",
            json!({ "question": question.into() }),
        )
    }
}

impl Default for MockLLMClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .ok_or_else(|| BackendError::Other {
                message: "MockLLMClient: No more responses in queue".to_string(),
            })?;

        if let Some(error) = response.error {
            return Err(error);
        }

        Ok(LLMResponse::with_tool_calls(
            response.content,
            response.tool_calls,
            Duration::from_millis(10),
        ))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model_info(&self) -> Option<String> {
        Some("mock-model".to_string())
    }
}

impl std::fmt::Debug for MockLLMClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLLMClient")
            .field("name", &self.name)
            .field("remaining_responses", &self.remaining_responses())
            .finish()
    }
}
