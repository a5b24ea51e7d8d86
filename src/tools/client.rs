//! Tool invocation client
//!
//! Wraps a single worker call with validation, bounded retries and the
//! correlation-id result cache. Every attempt of one logical call carries the
//! same correlation id, and the outcome of every attempt is kept as a
//! separate [`AttemptRecord`].

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::cache::ResultCache;
use super::registry::WorkerRegistry;
use super::retry::{RetryPolicy, RetryState};
use super::types::{
    AttemptOutcome, AttemptRecord, CorrelationId, ToolCallRequest, ToolCallResult, ToolName,
    ToolParams,
};
use super::worker::WorkerRequest;
use crate::error::ToolError;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};

/// Anything that can run a [`ToolCallRequest`] to a terminal result
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, request: &ToolCallRequest) -> ToolCallResult;
}

pub struct ToolInvocationClient {
    registry: WorkerRegistry,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    cache: Option<ResultCache>,
    progress: Arc<dyn ProgressHandler>,
}

impl ToolInvocationClient {
    pub fn new(registry: WorkerRegistry, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            registry,
            policy,
            attempt_timeout,
            cache: None,
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    pub async fn invoke(
        &self,
        tool: ToolName,
        params: &ToolParams,
        correlation_id: &CorrelationId,
    ) -> ToolCallResult {
        let rejected = |error: ToolError| {
            warn!(
                tool = %tool,
                correlation_id = %correlation_id,
                error = %error,
                "Tool call rejected before invocation"
            );
            ToolCallResult {
                tool,
                correlation_id: correlation_id.clone(),
                success: false,
                artifacts: Vec::new(),
                error: Some(error),
                attempts: Vec::new(),
                cached: false,
            }
        };

        if params.tool() != tool {
            return rejected(ToolError::validation(format!(
                "parameters for {} cannot be sent to {}",
                params.tool(),
                tool
            )));
        }
        if let Err(error) = params.validate() {
            return rejected(error);
        }
        let Some(worker) = self.registry.get(tool) else {
            return rejected(ToolError::terminal(format!("no worker registered for {}", tool)));
        };

        if let Some(cached) = self
            .cache
            .as_ref()
            .and_then(|c| c.get(correlation_id, params))
        {
            info!(tool = %tool, correlation_id = %correlation_id, "Result served from cache");
            return ToolCallResult {
                cached: true,
                ..cached
            };
        }

        let mut state = RetryState::new(&self.policy);
        let mut attempts = Vec::new();

        loop {
            let attempt = state.attempt_count + 1;
            let started_at = Utc::now();
            let start = Instant::now();

            let request = WorkerRequest {
                params: params.clone(),
                correlation_id: correlation_id.clone(),
                attempt,
            };

            debug!(tool = %tool, correlation_id = %correlation_id, attempt, "Invoking worker");
            let outcome = match tokio::time::timeout(self.attempt_timeout, worker.call(&request))
                .await
            {
                Ok(Ok(response)) => response.into_outcome(),
                Ok(Err(error)) => Err(error),
                Err(_) => Err(ToolError::transient(format!(
                    "{} did not answer within {}ms",
                    tool,
                    self.attempt_timeout.as_millis()
                ))),
            };
            state.attempt_count = attempt;
            let duration_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(artifacts) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        started_at,
                        duration_ms,
                        outcome: AttemptOutcome::Succeeded,
                        backoff_ms: None,
                    });
                    info!(
                        tool = %tool,
                        correlation_id = %correlation_id,
                        attempts = attempt,
                        artifacts = artifacts.len(),
                        "Tool call succeeded"
                    );

                    let result = ToolCallResult {
                        tool,
                        correlation_id: correlation_id.clone(),
                        success: true,
                        artifacts,
                        error: None,
                        attempts,
                        cached: false,
                    };
                    if let Some(cache) = &self.cache {
                        cache.insert(params, &result);
                    }
                    return result;
                }
                Err(error) => {
                    state.last_error = Some(error.clone());
                    let retry = state.should_retry(&self.policy);
                    let backoff = retry.then(|| self.policy.delay_for(attempt));

                    warn!(
                        tool = %tool,
                        correlation_id = %correlation_id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        kind = %error.kind,
                        error = %error.message,
                        will_retry = retry,
                        "Tool attempt failed"
                    );
                    self.progress.on_progress(&ProgressEvent::AttemptFailed {
                        tool,
                        attempt,
                        kind: error.kind,
                        backoff,
                    });

                    attempts.push(AttemptRecord {
                        attempt,
                        started_at,
                        duration_ms,
                        outcome: AttemptOutcome::Failed { error },
                        backoff_ms: backoff.map(|d| d.as_millis() as u64),
                    });

                    match backoff {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => break,
                    }
                }
            }
        }

        ToolCallResult {
            tool,
            correlation_id: correlation_id.clone(),
            success: false,
            artifacts: Vec::new(),
            error: state.last_error,
            attempts,
            cached: false,
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolInvocationClient {
    async fn execute(&self, request: &ToolCallRequest) -> ToolCallResult {
        self.invoke(request.tool_name(), &request.params, &request.correlation_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tools::mock::{MockOutcome, MockWorker};
    use crate::tools::types::{LayoutParams, TerrainParams};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
            .without_jitter()
    }

    fn terrain_params() -> ToolParams {
        ToolParams::Terrain(TerrainParams {
            latitude: 35.067482,
            longitude: -101.395466,
            radius_km: None,
            setback_m: None,
        })
    }

    fn client_with(worker: Arc<MockWorker>) -> ToolInvocationClient {
        ToolInvocationClient::new(
            WorkerRegistry::new().with_worker(worker),
            fast_policy(),
            Duration::from_secs(5),
        )
    }

    fn corr() -> CorrelationId {
        CorrelationId::derive("s1", "i1", ToolName::Terrain, 1)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let worker = Arc::new(MockWorker::new(ToolName::Terrain));
        let client = client_with(worker.clone());

        let result = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;

        assert!(result.success);
        assert_eq!(result.attempt_count(), 1);
        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(worker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_retried_then_succeeds() {
        let worker = Arc::new(MockWorker::new(ToolName::Terrain).with_outcomes(vec![
            MockOutcome::transient("503 Service Unavailable"),
            MockOutcome::transient("throttled"),
        ]));
        let client = client_with(worker.clone());

        let result = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;

        assert!(result.success);
        assert_eq!(result.attempt_count(), 3);
        assert_eq!(result.attempts[0].backoff_ms, Some(1));
        assert_eq!(result.attempts[1].backoff_ms, Some(2));
        assert!(result.attempts[2].backoff_ms.is_none());
    }

    #[tokio::test]
    async fn test_transient_exhaustion_keeps_flat_records() {
        let worker = Arc::new(MockWorker::new(ToolName::Terrain).with_outcomes(vec![
            MockOutcome::transient("timeout 1"),
            MockOutcome::transient("timeout 2"),
            MockOutcome::transient("timeout 3"),
            MockOutcome::transient("never reached"),
        ]));
        let client = client_with(worker.clone());

        let result = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;

        assert!(!result.success);
        assert_eq!(result.attempt_count(), 3);
        assert_eq!(worker.call_count(), 3);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::TransientInfrastructure);
        assert_eq!(error.message, "timeout 3");

        let messages: Vec<_> = result
            .attempts
            .iter()
            .map(|a| a.error().unwrap().message.clone())
            .collect();
        assert_eq!(messages, vec!["timeout 1", "timeout 2", "timeout 3"]);
    }

    #[tokio::test]
    async fn test_terminal_not_retried() {
        let worker = Arc::new(
            MockWorker::new(ToolName::Terrain)
                .with_outcomes(vec![MockOutcome::terminal("site is offshore")]),
        );
        let client = client_with(worker.clone());

        let result = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;

        assert!(!result.success);
        assert_eq!(result.attempt_count(), 1);
        assert_eq!(result.error.unwrap().kind, ErrorKind::TerminalTool);
        assert_eq!(worker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_worker_validation_not_retried() {
        let worker = Arc::new(
            MockWorker::new(ToolName::Terrain)
                .with_outcomes(vec![MockOutcome::validation("radius too large")]),
        );
        let client = client_with(worker.clone());

        let result = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;

        assert_eq!(result.attempt_count(), 1);
        assert_eq!(result.error.unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_invalid_params_never_reach_worker() {
        let worker = Arc::new(MockWorker::new(ToolName::Terrain));
        let client = client_with(worker.clone());

        let params = ToolParams::Terrain(TerrainParams {
            latitude: 135.0,
            longitude: 0.0,
            radius_km: None,
            setback_m: None,
        });
        let result = client.invoke(ToolName::Terrain, &params, &corr()).await;

        assert!(!result.success);
        assert!(result.attempts.is_empty());
        assert_eq!(result.error.unwrap().kind, ErrorKind::Validation);
        assert_eq!(worker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mismatched_tool_rejected() {
        let worker = Arc::new(MockWorker::new(ToolName::Layout));
        let client = client_with(worker.clone());

        let params = ToolParams::Layout(LayoutParams {
            latitude: 1.0,
            longitude: 1.0,
            capacity_mw: None,
            turbine_count: None,
            terrain: None,
        });
        let result = client.invoke(ToolName::Terrain, &params, &corr()).await;

        assert_eq!(result.error.unwrap().kind, ErrorKind::Validation);
        assert_eq!(worker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_worker() {
        let client = client_with(Arc::new(MockWorker::new(ToolName::Layout)));
        let result = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;

        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::TerminalTool);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_transient() {
        let worker =
            Arc::new(MockWorker::new(ToolName::Terrain).with_delay(Duration::from_millis(200)));
        let client = ToolInvocationClient::new(
            WorkerRegistry::new().with_worker(worker.clone()),
            fast_policy().with_max_attempts(2),
            Duration::from_millis(10),
        );

        let result = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;

        assert!(!result.success);
        assert_eq!(result.attempt_count(), 2);
        assert_eq!(result.error.unwrap().kind, ErrorKind::TransientInfrastructure);
    }

    #[tokio::test]
    async fn test_retries_share_correlation_id() {
        let worker = Arc::new(MockWorker::new(ToolName::Terrain).with_outcomes(vec![
            MockOutcome::transient("blip"),
        ]));
        let client = client_with(worker.clone());

        client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;

        let requests = worker.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].correlation_id, requests[1].correlation_id);
        assert_eq!(requests[0].attempt, 1);
        assert_eq!(requests[1].attempt, 2);
    }

    #[tokio::test]
    async fn test_cache_deduplicates_completed_call() {
        let worker = Arc::new(MockWorker::new(ToolName::Terrain));
        let client =
            client_with(worker.clone()).with_cache(ResultCache::new(Duration::from_secs(60)));

        let first = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;
        let second = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.artifacts, second.artifacts);
        assert_eq!(worker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_ignores_entry_for_other_params() {
        let worker = Arc::new(MockWorker::new(ToolName::Terrain));
        let client =
            client_with(worker.clone()).with_cache(ResultCache::new(Duration::from_secs(60)));
        let other_site = ToolParams::Terrain(TerrainParams {
            latitude: 48.0,
            longitude: 11.0,
            radius_km: None,
            setback_m: None,
        });

        let first = client.invoke(ToolName::Terrain, &terrain_params(), &corr()).await;
        let second = client.invoke(ToolName::Terrain, &other_site, &corr()).await;

        assert!(!second.cached);
        assert_eq!(worker.call_count(), 2);
        assert_eq!(worker.requests()[1].params, other_site);
        assert!(first.success && second.success);
    }
}
