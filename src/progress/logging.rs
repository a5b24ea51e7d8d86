//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RequestStarted { session_id } => {
                info!(session = %session_id, "Handling request");
            }
            ProgressEvent::AgentAttemptStarted { attempt } => {
                debug!(attempt, "Sending request to agent");
            }
            ProgressEvent::AgentResponseReceived {
                attempt,
                tool_calls,
                response_time,
            } => {
                debug!(
                    attempt,
                    tool_calls,
                    response_time_ms = response_time.as_millis(),
                    "Received agent response"
                );
            }
            ProgressEvent::AgentFallback { reason } => {
                warn!(reason = %reason, "Agent aborted, falling back to deterministic routing");
            }
            ProgressEvent::IntentResolved { strategy, stages } => {
                let stages: Vec<&str> = stages.iter().map(|s| s.as_str()).collect();
                info!(strategy = %strategy, stages = ?stages, "Intent resolved");
            }
            ProgressEvent::StageStarted {
                stage,
                index,
                total,
            } => {
                info!(
                    stage = %stage,
                    progress = format!("{}/{}", index + 1, total),
                    "Starting stage"
                );
            }
            ProgressEvent::AttemptFailed {
                tool,
                attempt,
                kind,
                backoff,
            } => {
                debug!(
                    tool = %tool,
                    attempt,
                    kind = %kind,
                    backoff_ms = backoff.map(|d| d.as_millis() as u64),
                    "Attempt failed"
                );
            }
            ProgressEvent::StageComplete {
                stage,
                duration,
                attempts,
                success,
            } => {
                if *success {
                    info!(
                        stage = %stage,
                        attempts,
                        duration_ms = duration.as_millis(),
                        "Stage complete"
                    );
                } else {
                    warn!(
                        stage = %stage,
                        attempts,
                        duration_ms = duration.as_millis(),
                        "Stage failed"
                    );
                }
            }
            ProgressEvent::Cancelled { before_stage } => {
                info!(stage = %before_stage, "Cancelled before stage");
            }
            ProgressEvent::Completed { stages, total_time } => {
                info!(
                    stages,
                    total_time_ms = total_time.as_millis(),
                    "Request complete"
                );
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Request failed");
            }
        }
    }
}
