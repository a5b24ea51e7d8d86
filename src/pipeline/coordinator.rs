//! Pipeline coordinator
//!
//! Top-level entry point. Loads or creates the session, asks the router for
//! a resolution, then runs the planned stages strictly one after another.
//! Every successful stage is merged into the session before the next one is
//! derived, and the cancel flag is consulted only between stages.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::error::CoordinatorError;
use super::state::ExecutionState;
use super::trace::{ExecutionRecord, NoOpTraceSink, StageOrigin, StageTrace, TraceSink};
use super::types::{InboundRequest, PipelineFailure, PipelineResponse};
use crate::error::ToolError;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::router::{
    AgentAttempt, IntentRouter, PipelinePlan, Resolution, RouteRequest, RoutedIntent,
};
use crate::session::{Location, Session, SessionError, SessionPatch, SessionStore};
use crate::tools::{
    ArtifactRef, CorrelationId, ToolCallRequest, ToolCallResult, ToolExecutor,
    ToolInvocationClient, ToolName, ToolParams,
};

pub struct PipelineCoordinator {
    store: Arc<dyn SessionStore>,
    router: IntentRouter,
    client: Arc<ToolInvocationClient>,
    traces: Arc<dyn TraceSink>,
    progress: Arc<dyn ProgressHandler>,
    config: CoordinatorConfig,
}

/// Mutable bookkeeping for one request
struct Execution {
    state: ExecutionState,
    session: Session,
    artifacts: Vec<ArtifactRef>,
    trace: Vec<StageTrace>,
    failure: Option<PipelineFailure>,
}

impl Execution {
    fn transition(&mut self, next: ExecutionState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Unexpected execution state transition");
        }
        debug!(from = %self.state, to = %next, "Execution state");
        self.state = next;
    }
}

impl PipelineCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        router: IntentRouter,
        client: Arc<ToolInvocationClient>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            router,
            client,
            traces: Arc::new(NoOpTraceSink),
            progress: Arc::new(NoOpHandler),
            config,
        }
    }

    pub fn with_traces(mut self, traces: Arc<dyn TraceSink>) -> Self {
        self.traces = traces;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    /// Current state of a session
    pub async fn session(&self, session_id: &str) -> Result<Session, CoordinatorError> {
        Ok(self.store.get(session_id).await?)
    }

    /// Requests cancellation of the session's running pipeline
    ///
    /// Takes effect before the next stage starts. The call in flight is
    /// never interrupted.
    pub async fn cancel(&self, session_id: &str) -> Result<Session, CoordinatorError> {
        request_cancel(self.store.as_ref(), session_id).await
    }

    /// Handles one inbound request
    ///
    /// Only session storage failures are returned as errors. Routing
    /// rejections and stage failures come back as an unsuccessful response.
    pub async fn handle(
        &self,
        request: InboundRequest,
    ) -> Result<PipelineResponse, CoordinatorError> {
        if request.utterance.trim().is_empty() {
            return Err(CoordinatorError::InvalidRequest(
                "The request text is empty.".to_string(),
            ));
        }

        let start = Instant::now();
        let started_at = Utc::now();
        let session_id = request.session_id.as_str();
        self.progress.on_progress(&ProgressEvent::RequestStarted {
            session_id: session_id.to_string(),
        });

        let session = self.begin_session(session_id).await?;
        info!(
            session = session_id,
            request_seq = session.request_seq,
            "Handling request"
        );

        let explicit = request.explicit_params.clone().unwrap_or_default();
        let mut execution = Execution {
            state: ExecutionState::Planning,
            session,
            artifacts: Vec::new(),
            trace: Vec::new(),
            failure: None,
        };

        let routed = {
            let route = RouteRequest {
                utterance: &request.utterance,
                session: &execution.session,
                explicit: &explicit,
            };
            let executor = StageExecutor {
                client: self.client.as_ref(),
                store: self.store.as_ref(),
                session_id,
                stage_timeout: self.config.stage_timeout,
            };
            self.router.resolve(&route, &executor).await
        };

        let mut strategy = None;
        let mut agent_abort = None;
        let mut agent_attempts = Vec::new();

        match routed {
            Err(e) => {
                info!(session = session_id, code = e.code(), error = %e, "Request rejected");
                execution.transition(ExecutionState::Rejected);
                execution.failure = Some(PipelineFailure::Rejected {
                    code: e.code().to_string(),
                    message: e.user_message(),
                });
            }
            Ok(RoutedIntent {
                resolution,
                strategy: routed_by,
                agent_attempts: attempts,
                abort,
            }) => {
                strategy = Some(routed_by);
                agent_abort = abort;
                execution.trace.extend(agent_stage_traces(&attempts));
                agent_attempts = attempts;

                match resolution {
                    Resolution::Clarify(question) => {
                        execution.transition(ExecutionState::Rejected);
                        execution.failure = Some(PipelineFailure::Clarification { question });
                    }
                    Resolution::Executed { request, result } => {
                        let (lat, lon) = request.params.coordinates();
                        self.merge_stage(&mut execution, &result, Location::new(lat, lon))
                            .await?;
                        execution.transition(ExecutionState::Completed);
                    }
                    Resolution::Plan(plan) => {
                        self.run_plan(&mut execution, &plan).await?;
                    }
                }
            }
        }

        let success = execution.state == ExecutionState::Completed;
        let message = match &execution.failure {
            Some(failure) => failure.user_message(),
            None => success_message(&execution),
        };

        if success {
            self.progress.on_progress(&ProgressEvent::Completed {
                stages: execution.trace.iter().filter(|t| t.succeeded()).count(),
                total_time: start.elapsed(),
            });
        } else {
            self.progress.on_progress(&ProgressEvent::Failed {
                error: message.clone(),
            });
        }

        self.traces.record(&ExecutionRecord {
            session_id: session_id.to_string(),
            request_seq: execution.session.request_seq,
            utterance: request.utterance.clone(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            state: execution.state,
            success,
            strategy,
            agent_abort,
            agent_attempts,
            stages: execution.trace.clone(),
        });

        Ok(PipelineResponse {
            session_id: session_id.to_string(),
            success,
            message,
            artifacts: execution.artifacts,
            trace: execution.trace,
            state: execution.state,
            strategy,
            failure: execution.failure,
        })
    }

    /// Loads the live session, or starts a fresh one when it is absent or
    /// expired, and bumps its request counter
    async fn begin_session(&self, session_id: &str) -> Result<Session, CoordinatorError> {
        let previous_seq = match self.store.get(session_id).await {
            Ok(session) => session.request_seq,
            Err(e) if e.is_absent() => {
                info!(session = session_id, reason = %e, "Starting new session");
                0
            }
            Err(e) => return Err(e.into()),
        };

        let patch = SessionPatch::new()
            .with_request_seq(previous_seq + 1)
            .with_cancelled(false)
            .with_ttl_secs(self.config.session_ttl_secs);
        Ok(self.store.upsert(session_id, patch).await?)
    }

    async fn run_plan(
        &self,
        execution: &mut Execution,
        plan: &PipelinePlan,
    ) -> Result<(), CoordinatorError> {
        let total = plan.len();
        let session_id = execution.session.session_id.clone();
        let mut previous: Option<ToolCallResult> = None;

        for (index, planned) in plan.stages.iter().enumerate() {
            let stage = planned.stage;

            if self.is_cancelled(&session_id).await? {
                info!(session = %session_id, stage = %stage, "Cancelled before stage");
                self.progress
                    .on_progress(&ProgressEvent::Cancelled { before_stage: stage });
                execution.transition(ExecutionState::Cancelled(index));
                execution.failure = Some(PipelineFailure::Cancelled {
                    before_stage: stage,
                    index,
                });
                return Ok(());
            }

            execution.transition(ExecutionState::StageRunning(index));
            self.progress.on_progress(&ProgressEvent::StageStarted {
                stage,
                index,
                total,
            });

            let correlation_id = execution.session.correlation_id(stage);
            let stage_start = Instant::now();

            let result = match planned
                .derivation
                .derive(stage, &execution.session, previous.as_ref())
            {
                Ok(params) => {
                    invoke_within(
                        self.client.as_ref(),
                        self.config.stage_timeout,
                        stage,
                        &params,
                        &correlation_id,
                    )
                    .await
                }
                Err(error) => failed_result(stage, &correlation_id, error),
            };

            let duration = stage_start.elapsed();
            execution.trace.push(StageTrace::from_result(
                &result,
                StageOrigin::Plan,
                duration.as_millis() as u64,
            ));
            self.progress.on_progress(&ProgressEvent::StageComplete {
                stage,
                duration,
                attempts: result.attempt_count(),
                success: result.success,
            });

            if !result.success {
                let cause = result
                    .error
                    .clone()
                    .unwrap_or_else(|| ToolError::terminal("stage failed without detail"));
                warn!(
                    session = %session_id,
                    stage = %stage,
                    kind = %cause.kind,
                    attempts = result.attempt_count(),
                    correlation_id = %correlation_id,
                    "Pipeline stage failed"
                );
                execution.transition(ExecutionState::Failed(index));
                execution.failure = Some(PipelineFailure::PipelineStageFailed {
                    stage,
                    index,
                    cause,
                    attempts: result.attempt_count(),
                    correlation_id,
                });
                return Ok(());
            }

            self.merge_stage(execution, &result, planned.derivation.location())
                .await?;
            previous = Some(result);
        }

        execution.transition(ExecutionState::Completed);
        Ok(())
    }

    /// Durably merges a successful stage into the session
    async fn merge_stage(
        &self,
        execution: &mut Execution,
        result: &ToolCallResult,
        location: Location,
    ) -> Result<(), CoordinatorError> {
        let patch = SessionPatch::new()
            .with_stage_result_at(result.tool, result.artifacts.clone(), location.clone())
            .with_location(location);
        execution.session = self
            .store
            .upsert(&execution.session.session_id, patch)
            .await?;
        execution.artifacts.extend(result.artifacts.iter().cloned());
        debug!(
            session = %execution.session.session_id,
            stage = %result.tool,
            artifacts = result.artifacts.len(),
            "Stage merged into session"
        );
        Ok(())
    }

    async fn is_cancelled(&self, session_id: &str) -> Result<bool, CoordinatorError> {
        match self.store.get(session_id).await {
            Ok(session) => Ok(session.cancelled),
            Err(SessionError::NotFound(_)) | Err(SessionError::Expired(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Sets the cancel flag on a live session
///
/// Usable from a process that shares the session store but has no
/// coordinator of its own. Unknown or expired sessions are an error.
pub async fn request_cancel(
    store: &dyn SessionStore,
    session_id: &str,
) -> Result<Session, CoordinatorError> {
    store.get(session_id).await?;
    let session = store
        .upsert(session_id, SessionPatch::new().with_cancelled(true))
        .await?;
    info!(session = session_id, "Cancellation requested");
    Ok(session)
}

/// Executes agent-issued calls under the same bounds as planned stages
///
/// The cancel flag is checked before each call and every call is capped by
/// the per-stage timeout.
struct StageExecutor<'a> {
    client: &'a ToolInvocationClient,
    store: &'a dyn SessionStore,
    session_id: &'a str,
    stage_timeout: Duration,
}

#[async_trait]
impl ToolExecutor for StageExecutor<'_> {
    async fn execute(&self, request: &ToolCallRequest) -> ToolCallResult {
        let stage = request.tool_name();
        let cancelled = matches!(self.store.get(self.session_id).await, Ok(s) if s.cancelled);
        if cancelled {
            info!(session = self.session_id, stage = %stage, "Cancelled before agent call");
            return failed_result(
                stage,
                &request.correlation_id,
                ToolError::terminal("the request was cancelled"),
            );
        }
        invoke_within(
            self.client,
            self.stage_timeout,
            stage,
            &request.params,
            &request.correlation_id,
        )
        .await
    }
}

/// Runs one logical call, failing it as transient once `stage_timeout` passes
async fn invoke_within(
    client: &ToolInvocationClient,
    stage_timeout: Duration,
    stage: ToolName,
    params: &ToolParams,
    correlation_id: &CorrelationId,
) -> ToolCallResult {
    match tokio::time::timeout(stage_timeout, client.invoke(stage, params, correlation_id)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(stage = %stage, correlation_id = %correlation_id, "Stage timed out");
            failed_result(
                stage,
                correlation_id,
                ToolError::transient(format!(
                    "stage timed out after {}s",
                    stage_timeout.as_secs()
                )),
            )
        }
    }
}

fn failed_result(
    stage: ToolName,
    correlation_id: &CorrelationId,
    error: ToolError,
) -> ToolCallResult {
    ToolCallResult {
        tool: stage,
        correlation_id: correlation_id.clone(),
        success: false,
        artifacts: Vec::new(),
        error: Some(error),
        attempts: Vec::new(),
        cached: false,
    }
}

/// Stage traces for the tool calls the agent issued itself
fn agent_stage_traces(attempts: &[AgentAttempt]) -> Vec<StageTrace> {
    attempts
        .iter()
        .filter_map(|a| {
            a.result
                .as_ref()
                .map(|r| StageTrace::from_result(r, StageOrigin::Agent, a.duration_ms))
        })
        .collect()
}

fn success_message(execution: &Execution) -> String {
    let stages: Vec<&str> = execution
        .trace
        .iter()
        .filter(|t| t.succeeded())
        .map(|t| t.stage_name.display_name())
        .collect();
    let count = execution.artifacts.len();
    format!(
        "Completed {} ({} artifact{}).",
        stages.join(", "),
        count,
        if count == 1 { "" } else { "s" }
    )
}
