//! Intent routing
//!
//! [`IntentRouter`] turns an utterance plus session context into either a
//! [`PipelinePlan`], a clarification question, or the result of a call the
//! agent already executed. With an agent configured it is tried first for
//! single-stage requests; when it aborts, the deterministic strategy resolves
//! the same request once and its answer is final.

mod agent;
mod deterministic;
mod error;
mod loop_detector;
mod plan;

pub use agent::{
    build_params, tool_definitions, AgentAttempt, AgentAttemptOutcome, AgentConfig, AgentContext,
    AgentOutcome, AgentRun, AgentStrategy, CLARIFICATION_FUNCTION,
};
pub use deterministic::DeterministicStrategy;
pub use error::{AbortReason, RouterError};
pub use loop_detector::LoopDetector;
pub use plan::{prerequisite, ParamDerivation, PipelinePlan, PlannedStage, SlotValues};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::session::Session;
use crate::tools::{ToolCallRequest, ToolCallResult, ToolExecutor, ToolName};

/// Which strategy produced the resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    Deterministic,
    Agent,
    /// Deterministic resolution after the agent aborted
    DeterministicFallback,
}

impl fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteStrategy::Deterministic => "deterministic",
            RouteStrategy::Agent => "agent",
            RouteStrategy::DeterministicFallback => "deterministic_fallback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Plan(PipelinePlan),
    Clarify(String),
    /// A single stage the agent already ran to success
    Executed {
        request: ToolCallRequest,
        result: ToolCallResult,
    },
}

#[derive(Debug, Clone)]
pub struct RoutedIntent {
    pub resolution: Resolution,
    pub strategy: RouteStrategy,
    /// Agent turns taken for this request, empty for deterministic routing
    pub agent_attempts: Vec<AgentAttempt>,
    /// Set when the agent aborted and the fallback answered
    pub abort: Option<AbortReason>,
}

impl RoutedIntent {
    fn deterministic(plan: PipelinePlan) -> Self {
        Self {
            resolution: Resolution::Plan(plan),
            strategy: RouteStrategy::Deterministic,
            agent_attempts: Vec::new(),
            abort: None,
        }
    }

    /// Stages this resolution covers
    pub fn stages(&self) -> Vec<ToolName> {
        match &self.resolution {
            Resolution::Plan(plan) => plan.tools(),
            Resolution::Executed { request, .. } => vec![request.tool_name()],
            Resolution::Clarify(_) => Vec::new(),
        }
    }
}

/// One request as seen by the router
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    pub utterance: &'a str,
    pub session: &'a Session,
    pub explicit: &'a SlotValues,
}

pub struct IntentRouter {
    deterministic: DeterministicStrategy,
    agent: Option<AgentStrategy>,
    available: BTreeSet<ToolName>,
    progress: Arc<dyn ProgressHandler>,
}

impl IntentRouter {
    /// Deterministic-only router over the tools that have a worker
    pub fn new(available: BTreeSet<ToolName>) -> Self {
        Self {
            deterministic: DeterministicStrategy::new(),
            agent: None,
            available,
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_agent(mut self, agent: AgentStrategy) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn available(&self) -> &BTreeSet<ToolName> {
        &self.available
    }

    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }

    /// Resolves one request
    ///
    /// The agent runs at most once and the deterministic strategy at most
    /// once per call. `executor` is only used by the agent.
    pub async fn resolve(
        &self,
        request: &RouteRequest<'_>,
        executor: &dyn ToolExecutor,
    ) -> Result<RoutedIntent, RouterError> {
        let routed = match &self.agent {
            Some(agent) if !self.deterministic.is_multi_stage(request.utterance) => {
                self.resolve_with_agent(agent, request, executor).await?
            }
            _ => RoutedIntent::deterministic(self.plan_deterministic(request)?),
        };

        self.progress.on_progress(&ProgressEvent::IntentResolved {
            strategy: routed.strategy.to_string(),
            stages: routed.stages(),
        });
        Ok(routed)
    }

    async fn resolve_with_agent(
        &self,
        agent: &AgentStrategy,
        request: &RouteRequest<'_>,
        executor: &dyn ToolExecutor,
    ) -> Result<RoutedIntent, RouterError> {
        let ctx = AgentContext {
            utterance: request.utterance,
            session: request.session,
            explicit: request.explicit,
            available: &self.available,
        };
        let run = agent.run(&ctx, executor).await;

        let reason = match run.outcome {
            Ok(AgentOutcome::Executed { request, result }) => {
                return Ok(RoutedIntent {
                    resolution: Resolution::Executed { request, result },
                    strategy: RouteStrategy::Agent,
                    agent_attempts: run.attempts,
                    abort: None,
                });
            }
            Ok(AgentOutcome::Clarify(question)) => {
                return Ok(RoutedIntent {
                    resolution: Resolution::Clarify(question),
                    strategy: RouteStrategy::Agent,
                    agent_attempts: run.attempts,
                    abort: None,
                });
            }
            Err(reason) => reason,
        };

        info!(
            session = %request.session.session_id,
            reason = %reason,
            "Falling back to deterministic routing"
        );
        self.progress.on_progress(&ProgressEvent::AgentFallback {
            reason: reason.to_string(),
        });

        match self.plan_deterministic(request) {
            Ok(plan) => Ok(RoutedIntent {
                resolution: Resolution::Plan(plan),
                strategy: RouteStrategy::DeterministicFallback,
                agent_attempts: run.attempts,
                abort: Some(reason),
            }),
            Err(fallback) => {
                warn!(error = %fallback, "Deterministic fallback failed");
                Err(RouterError::AgentLoopAborted {
                    reason,
                    fallback: Box::new(fallback),
                })
            }
        }
    }

    fn plan_deterministic(&self, request: &RouteRequest<'_>) -> Result<PipelinePlan, RouterError> {
        let plan = self.deterministic.plan(
            request.utterance,
            Some(request.session),
            request.explicit,
            &self.available,
        );
        if let Err(e) = &plan {
            debug!(error = %e, "Deterministic strategy rejected request");
        }
        plan
    }
}
