//! Agent-assisted intent resolution
//!
//! An LLM chooses one of the stage functions and proposes its arguments.
//! The call is validated and executed here, and any failure is fed back to
//! the agent as one flat JSON error. The whole exchange is bounded by an
//! attempt budget, a wall-clock cap and a [`LoopDetector`]; the agent's own
//! behaviour is never relied on to terminate.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::error::AbortReason;
use super::loop_detector::LoopDetector;
use super::plan::{ParamDerivation, SlotValues};
use crate::error::ToolError;
use crate::llm::{ChatMessage, LLMClient, LLMRequest, ToolCall, ToolDefinition};
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::session::Session;
use crate::tools::{ToolCallRequest, ToolCallResult, ToolExecutor, ToolName, ToolParams};

pub const CLARIFICATION_FUNCTION: &str = "request_clarification";

const SYSTEM_PROMPT: &str = r#"You are the planning assistant of a wind farm assessment service.

Pick exactly ONE function that fulfils the user's request and call it:
- analyze_terrain: terrain and elevation analysis around a site
- optimize_layout: turbine layout optimization for a site
- run_simulation: wake and energy yield simulation of the current layout
- generate_report: report over the latest simulation
- request_clarification: ask the user a question when the request is unclear

RULES:
1. Always answer with a function call, never with plain text.
2. Use coordinates from the request or the known context. Never invent coordinates.
3. If a call fails, read the error and either fix the arguments or ask for clarification.
   Do not repeat an identical failing call.
"#;

const TOOL_REMINDER: &str =
    "You must call one of the available functions now. Do not respond with text.";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Attempt budget K
    pub max_attempts: u32,
    /// Wall-clock cap for the whole exchange
    pub timeout: Duration,
    /// Consecutive identical failures that count as a loop
    pub repeat_threshold: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(90),
            repeat_threshold: 2,
            temperature: 0.1,
            max_tokens: 1024,
        }
    }
}

/// Everything the agent may use to resolve one request
#[derive(Debug, Clone, Copy)]
pub struct AgentContext<'a> {
    pub utterance: &'a str,
    pub session: &'a Session,
    pub explicit: &'a SlotValues,
    pub available: &'a BTreeSet<ToolName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AgentAttemptOutcome {
    NoToolCall,
    Clarification,
    UnknownFunction { error: ToolError },
    InvalidArguments { error: ToolError },
    ToolFailed { error: ToolError },
    Succeeded,
    Backend { message: String },
}

/// One agent turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAttempt {
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(flatten)]
    pub outcome: AgentAttemptOutcome,
    pub duration_ms: u64,
    /// Tool execution performed during this turn, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolCallResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    /// The agent's call ran successfully
    Executed {
        request: ToolCallRequest,
        result: ToolCallResult,
    },
    Clarify(String),
}

#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: Result<AgentOutcome, AbortReason>,
    pub attempts: Vec<AgentAttempt>,
}

pub struct AgentStrategy {
    client: Arc<dyn LLMClient>,
    config: AgentConfig,
    progress: Arc<dyn ProgressHandler>,
}

impl AgentStrategy {
    pub fn new(client: Arc<dyn LLMClient>, config: AgentConfig) -> Self {
        Self {
            client,
            config,
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.client.name()
    }

    /// Resolves and executes the request, never exceeding the configured
    /// budget or wall-clock cap
    pub async fn run(&self, ctx: &AgentContext<'_>, executor: &dyn ToolExecutor) -> AgentRun {
        let mut attempts = Vec::new();
        let outcome = match tokio::time::timeout(
            self.config.timeout,
            self.attempt_loop(ctx, executor, &mut attempts),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(AbortReason::Timeout {
                secs: self.config.timeout.as_secs(),
            }),
        };

        if let Err(reason) = &outcome {
            warn!(
                backend = self.client.name(),
                attempts = attempts.len(),
                reason = %reason,
                "Agent strategy aborted"
            );
        }
        AgentRun { outcome, attempts }
    }

    async fn attempt_loop(
        &self,
        ctx: &AgentContext<'_>,
        executor: &dyn ToolExecutor,
        attempts: &mut Vec<AgentAttempt>,
    ) -> Result<AgentOutcome, AbortReason> {
        let tools = tool_definitions(ctx.available);
        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(context_message(ctx)),
        ];
        let mut detector = LoopDetector::new(self.config.repeat_threshold);

        for attempt in 1..=self.config.max_attempts {
            let start = Instant::now();
            self.progress
                .on_progress(&ProgressEvent::AgentAttemptStarted { attempt });

            let request = LLMRequest::new(messages.clone())
                .with_tools(tools.clone())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_tokens);

            let response = match self.client.chat(request).await {
                Ok(response) => response,
                Err(e) => {
                    attempts.push(AgentAttempt {
                        attempt,
                        function: None,
                        outcome: AgentAttemptOutcome::Backend {
                            message: e.to_string(),
                        },
                        duration_ms: elapsed_ms(start),
                        result: None,
                    });
                    return Err(AbortReason::Backend {
                        message: e.to_string(),
                    });
                }
            };

            self.progress.on_progress(&ProgressEvent::AgentResponseReceived {
                attempt,
                tool_calls: response.tool_calls.len(),
                response_time: response.response_time,
            });

            let Some(call) = response.first_tool_call().cloned() else {
                warn!(attempt, "Agent did not call a function, sending reminder");
                messages.push(ChatMessage::assistant(&response.content));
                messages.push(ChatMessage::user(TOOL_REMINDER));
                detector.reset();
                attempts.push(AgentAttempt {
                    attempt,
                    function: None,
                    outcome: AgentAttemptOutcome::NoToolCall,
                    duration_ms: elapsed_ms(start),
                    result: None,
                });
                continue;
            };

            debug!(attempt, function = %call.name, "Agent proposed call");
            messages.push(ChatMessage::assistant_with_tools(
                &response.content,
                vec![call.clone()],
            ));

            if call.name == CLARIFICATION_FUNCTION {
                let question = call
                    .arguments
                    .get("question")
                    .and_then(Value::as_str)
                    .filter(|q| !q.trim().is_empty())
                    .unwrap_or("Could you tell me more about the site and the analysis you need?")
                    .to_string();
                attempts.push(AgentAttempt {
                    attempt,
                    function: Some(call.name.clone()),
                    outcome: AgentAttemptOutcome::Clarification,
                    duration_ms: elapsed_ms(start),
                    result: None,
                });
                return Ok(AgentOutcome::Clarify(question));
            }

            let signature = LoopDetector::signature(&call.name, &call.arguments);

            let (outcome, result) = match self.prepare(&call, ctx) {
                Err(failure) => (failure, None),
                Ok(request) => {
                    let result = executor.execute(&request).await;
                    if result.success {
                        info!(
                            attempt,
                            tool = %request.tool_name(),
                            correlation_id = %request.correlation_id,
                            "Agent call succeeded"
                        );
                        attempts.push(AgentAttempt {
                            attempt,
                            function: Some(call.name.clone()),
                            outcome: AgentAttemptOutcome::Succeeded,
                            duration_ms: elapsed_ms(start),
                            result: Some(result.clone()),
                        });
                        return Ok(AgentOutcome::Executed { request, result });
                    }
                    let error = result
                        .error
                        .clone()
                        .unwrap_or_else(|| ToolError::terminal("tool failed without detail"));
                    (AgentAttemptOutcome::ToolFailed { error }, Some(result))
                }
            };

            if let Some(error) = outcome_error(&outcome) {
                warn!(
                    attempt,
                    function = %call.name,
                    kind = %error.kind,
                    error = %error.message,
                    "Agent call failed"
                );
                messages.push(ChatMessage::tool_response(
                    &call.call_id,
                    error_feedback(error),
                ));
            }
            attempts.push(AgentAttempt {
                attempt,
                function: Some(call.name.clone()),
                outcome,
                duration_ms: elapsed_ms(start),
                result,
            });

            if detector.record_failure(&signature) {
                return Err(AbortReason::RepeatedFailure {
                    function: call.name.clone(),
                    repeats: detector.repeats(),
                });
            }
        }

        Err(AbortReason::BudgetExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Turns the agent's call into a validated request, or the failure to
    /// report back
    fn prepare(
        &self,
        call: &ToolCall,
        ctx: &AgentContext<'_>,
    ) -> Result<ToolCallRequest, AgentAttemptOutcome> {
        let tool = ToolName::from_function_name(&call.name)
            .filter(|t| ctx.available.contains(t))
            .ok_or_else(|| AgentAttemptOutcome::UnknownFunction {
                error: ToolError::validation(format!(
                    "unknown function '{}'; available: {}",
                    call.name,
                    available_functions(ctx.available).join(", ")
                )),
            })?;

        let params = build_params(tool, &call.arguments, ctx)
            .map_err(|error| AgentAttemptOutcome::InvalidArguments { error })?;

        Ok(ToolCallRequest::new(
            params,
            ctx.session.session_id.clone(),
            ctx.session.correlation_id(tool),
        ))
    }
}

/// Parameters for `tool` from the agent's arguments
///
/// Explicit caller values win over the agent's proposal, which wins over the
/// session. Artifact inputs always come from the session.
pub fn build_params(
    tool: ToolName,
    arguments: &Value,
    ctx: &AgentContext<'_>,
) -> Result<ToolParams, ToolError> {
    let arguments = match arguments {
        Value::Null => json!({}),
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| ToolError::validation(format!("arguments are not valid JSON: {}", e)))?,
        other => other.clone(),
    };
    let proposed: SlotValues = serde_json::from_value(arguments).map_err(|e| {
        ToolError::validation(format!("invalid arguments for {}: {}", tool.function_name(), e))
    })?;

    let from_session = ctx
        .session
        .last_location
        .as_ref()
        .map(|loc| SlotValues::new().with_coordinates(loc.lat, loc.lon))
        .unwrap_or_default();
    let slots = ctx.explicit.or(&proposed).or(&from_session);

    let derivation = ParamDerivation::from_slots(&slots)
        .ok_or_else(|| ToolError::validation("latitude and longitude are required"))?;
    derivation.derive(tool, ctx.session, None)
}

pub fn tool_definitions(available: &BTreeSet<ToolName>) -> Vec<ToolDefinition> {
    let coordinates = json!({
        "latitude": {"type": "number", "description": "Site latitude in decimal degrees"},
        "longitude": {"type": "number", "description": "Site longitude in decimal degrees"}
    });
    let with = |extra: Value| {
        let mut properties = coordinates.clone();
        if let (Some(target), Some(source)) = (properties.as_object_mut(), extra.as_object()) {
            for (k, v) in source {
                target.insert(k.clone(), v.clone());
            }
        }
        json!({"type": "object", "properties": properties})
    };

    let mut definitions: Vec<ToolDefinition> = available
        .iter()
        .map(|tool| {
            let (description, parameters) = match tool {
                ToolName::Terrain => (
                    "Analyze terrain, elevation and exclusion zones around a site",
                    with(json!({
                        "radiusKm": {"type": "number"},
                        "setbackM": {"type": "number"}
                    })),
                ),
                ToolName::Layout => (
                    "Optimize turbine placement for a site",
                    with(json!({
                        "capacityMw": {"type": "number"},
                        "turbineCount": {"type": "integer"}
                    })),
                ),
                ToolName::Simulation => (
                    "Run a wake and energy yield simulation on the latest layout",
                    with(json!({"windSpeedMs": {"type": "number"}})),
                ),
                ToolName::Report => (
                    "Generate a report from the latest simulation",
                    with(json!({})),
                ),
            };
            ToolDefinition::new(tool.function_name(), description, parameters)
        })
        .collect();

    definitions.push(ToolDefinition::new(
        CLARIFICATION_FUNCTION,
        "Ask the user a clarifying question instead of calling a tool",
        json!({
            "type": "object",
            "properties": {"question": {"type": "string"}},
            "required": ["question"]
        }),
    ));
    definitions
}

fn available_functions(available: &BTreeSet<ToolName>) -> Vec<&'static str> {
    available
        .iter()
        .map(|t| t.function_name())
        .chain(std::iter::once(CLARIFICATION_FUNCTION))
        .collect()
}

fn context_message(ctx: &AgentContext<'_>) -> String {
    let mut lines = vec![format!("Request: {}", ctx.utterance)];
    if let Some((lat, lon)) = ctx.explicit.coordinates() {
        lines.push(format!("Caller-supplied coordinates: {}, {}", lat, lon));
    }
    if let Some(location) = &ctx.session.last_location {
        lines.push(format!(
            "Known site location: {}, {}",
            location.lat, location.lon
        ));
    }
    let completed: Vec<&str> = ctx.session.stage_results.keys().map(|s| s.as_str()).collect();
    if !completed.is_empty() {
        lines.push(format!("Completed stages: {}", completed.join(", ")));
    }
    lines.push(format!("Today is {}.", Utc::now().format("%Y-%m-%d")));
    lines.join("\n")
}

fn outcome_error(outcome: &AgentAttemptOutcome) -> Option<&ToolError> {
    match outcome {
        AgentAttemptOutcome::UnknownFunction { error }
        | AgentAttemptOutcome::InvalidArguments { error }
        | AgentAttemptOutcome::ToolFailed { error } => Some(error),
        _ => None,
    }
}

/// The single failure as `{"error": {"kind", "message"}}`
fn error_feedback(error: &ToolError) -> String {
    json!({
        "error": {
            "kind": error.kind.as_str(),
            "message": error.message,
        }
    })
    .to_string()
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
