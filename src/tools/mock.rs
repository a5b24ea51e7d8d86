use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::types::{ArtifactRef, ToolName};
use super::worker::{Worker, WorkerRequest, WorkerResponse};
use crate::error::ToolError;

/// Scripted outcome for one call to a [`MockWorker`]
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Respond(WorkerResponse),
    Fail(ToolError),
}

impl MockOutcome {
    pub fn artifact(location_ref: impl Into<String>, tool: ToolName) -> Self {
        MockOutcome::Respond(WorkerResponse::ok(vec![ArtifactRef::new(
            tool.as_str(),
            location_ref,
        )]))
    }

    pub fn transient(message: impl Into<String>) -> Self {
        MockOutcome::Fail(ToolError::transient(message))
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        MockOutcome::Respond(WorkerResponse::failed(ToolError::terminal(message)))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        MockOutcome::Respond(WorkerResponse::failed(ToolError::validation(message)))
    }
}

/// Worker double that replays queued outcomes and records every request
///
/// With an empty queue it succeeds with one artifact named after the
/// correlation id.
pub struct MockWorker {
    tool: ToolName,
    outcomes: Mutex<VecDeque<MockOutcome>>,
    requests: Mutex<Vec<WorkerRequest>>,
    delay: Option<Duration>,
}

impl MockWorker {
    pub fn new(tool: ToolName) -> Self {
        Self {
            tool,
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_outcomes(self, outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        self.add_outcomes(outcomes);
        self
    }

    pub fn add_outcome(&self, outcome: MockOutcome) {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(outcome);
        }
    }

    pub fn add_outcomes(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.extend(outcomes);
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining_outcomes(&self) -> usize {
        self.outcomes.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn tool(&self) -> ToolName {
        self.tool
    }

    fn endpoint(&self) -> String {
        format!("mock://{}", self.tool)
    }

    async fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, ToolError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.outcomes.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(MockOutcome::Respond(response)) => Ok(response),
            Some(MockOutcome::Fail(error)) => Err(error),
            None => Ok(WorkerResponse::ok(vec![ArtifactRef::new(
                self.tool.as_str(),
                format!("blob://{}/{}", self.tool, request.correlation_id),
            )])),
        }
    }
}

impl std::fmt::Debug for MockWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockWorker")
            .field("tool", &self.tool)
            .field("calls", &self.call_count())
            .field("remaining_outcomes", &self.remaining_outcomes())
            .finish()
    }
}
