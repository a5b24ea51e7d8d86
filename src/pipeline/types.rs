//! Inbound request and caller-facing response

use serde::{Deserialize, Serialize};

use super::state::ExecutionState;
use super::trace::StageTrace;
use crate::error::{ErrorKind, ToolError};
use crate::router::{RouteStrategy, SlotValues};
use crate::tools::{ArtifactRef, CorrelationId, ToolName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub session_id: String,
    pub utterance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_params: Option<SlotValues>,
}

impl InboundRequest {
    pub fn new(session_id: impl Into<String>, utterance: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            utterance: utterance.into(),
            explicit_params: None,
        }
    }

    pub fn with_explicit_params(mut self, params: SlotValues) -> Self {
        self.explicit_params = Some(params);
        self
    }
}

/// Structured reason a request did not complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineFailure {
    /// Routing refused the request before any worker ran
    Rejected { code: String, message: String },
    /// The router needs more information from the user
    Clarification { question: String },
    PipelineStageFailed {
        #[serde(rename = "stageName")]
        stage: ToolName,
        index: usize,
        cause: ToolError,
        attempts: u32,
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
    },
    Cancelled {
        #[serde(rename = "beforeStage")]
        before_stage: ToolName,
        index: usize,
    },
}

impl PipelineFailure {
    /// Message for the end user, free of retry details
    pub fn user_message(&self) -> String {
        match self {
            PipelineFailure::Rejected { message, .. } => message.clone(),
            PipelineFailure::Clarification { question } => question.clone(),
            PipelineFailure::PipelineStageFailed {
                stage,
                cause,
                correlation_id,
                ..
            } => match cause.kind {
                ErrorKind::TerminalTool => format!(
                    "The {} stage was rejected: {}.",
                    stage.display_name(),
                    cause.message.trim_end_matches('.')
                ),
                ErrorKind::TransientInfrastructure => format!(
                    "The {} service is temporarily unavailable. Please try again later \
                     (correlation id: {}).",
                    stage.display_name(),
                    correlation_id
                ),
                ErrorKind::Validation => format!(
                    "The {} request was invalid: {}.",
                    stage.display_name(),
                    cause.message.trim_end_matches('.')
                ),
            },
            PipelineFailure::Cancelled { before_stage, .. } => format!(
                "The pipeline was cancelled before the {} stage.",
                before_stage.display_name()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub session_id: String,
    pub success: bool,
    pub message: String,
    /// Artifacts of every stage that succeeded in this request, in order
    pub artifacts: Vec<ArtifactRef>,
    pub trace: Vec<StageTrace>,
    pub state: ExecutionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RouteStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PipelineFailure>,
}

impl PipelineResponse {
    pub fn completed_stages(&self) -> Vec<ToolName> {
        self.trace
            .iter()
            .filter(|t| t.succeeded())
            .map(|t| t.stage_name)
            .collect()
    }

    /// Correlation id of the failed stage, for support lookup
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match &self.failure {
            Some(PipelineFailure::PipelineStageFailed { correlation_id, .. }) => {
                Some(correlation_id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_failed(cause: ToolError) -> PipelineFailure {
        PipelineFailure::PipelineStageFailed {
            stage: ToolName::Layout,
            index: 1,
            cause,
            attempts: 3,
            correlation_id: CorrelationId::derive("s1", "i1", ToolName::Layout, 1),
        }
    }

    #[test]
    fn test_transient_message_has_correlation_id() {
        let failure = stage_failed(ToolError::transient("503 Service Unavailable"));
        let message = failure.user_message();
        assert!(message.contains("temporarily unavailable"));
        assert!(message.contains("corr-"));
        assert!(!message.contains("503"));
        assert!(!message.contains("attempt"));
    }

    #[test]
    fn test_terminal_message_is_domain_specific() {
        let failure = stage_failed(ToolError::terminal("no buildable area within setback"));
        assert_eq!(
            failure.user_message(),
            "The layout optimization stage was rejected: no buildable area within setback."
        );
    }

    #[test]
    fn test_request_wire_shape() {
        let request: InboundRequest = serde_json::from_value(serde_json::json!({
            "sessionId": "s1",
            "utterance": "Optimize layout",
            "explicitParams": {"lat": 35.0, "lon": -101.0}
        }))
        .unwrap();
        assert_eq!(
            request.explicit_params.unwrap().coordinates(),
            Some((35.0, -101.0))
        );
    }

    #[test]
    fn test_failure_wire_shape() {
        let value = serde_json::to_value(stage_failed(ToolError::transient("timeout"))).unwrap();
        assert_eq!(value["type"], "pipeline_stage_failed");
        assert_eq!(value["stageName"], "layout");
        assert_eq!(value["attempts"], 3);
    }
}
