use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::tools::ToolName;

/// Why the agent strategy was abandoned for a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// `attempts` consecutive attempts without a successful tool call
    BudgetExhausted { attempts: u32 },
    /// Wall-clock cap reached
    Timeout { secs: u64 },
    /// The same call signature kept failing
    RepeatedFailure { function: String, repeats: u32 },
    /// The backend itself failed
    Backend { message: String },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::BudgetExhausted { attempts } => {
                write!(f, "no successful tool call after {} attempts", attempts)
            }
            AbortReason::Timeout { secs } => write!(f, "timed out after {}s", secs),
            AbortReason::RepeatedFailure { function, repeats } => {
                write!(f, "{} failed {} times in a row", function, repeats)
            }
            AbortReason::Backend { message } => write!(f, "backend error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouterError {
    #[error("Could not determine an analysis from the request")]
    AmbiguousIntent { utterance: String },

    #[error("Missing required parameter '{param}' for {tool}")]
    MissingParameter { param: String, tool: ToolName },

    #[error("Invalid parameter for {tool}: {message}")]
    InvalidParameter { tool: ToolName, message: String },

    #[error("No worker is configured for {0}")]
    UnsupportedTool(ToolName),

    /// Only surfaced when the deterministic fallback failed as well; the
    /// fallback error is kept as a sibling, never folded into this message
    #[error("Agent strategy aborted: {reason}")]
    AgentLoopAborted {
        reason: AbortReason,
        fallback: Box<RouterError>,
    },
}

impl RouterError {
    pub fn missing(param: impl Into<String>, tool: ToolName) -> Self {
        RouterError::MissingParameter {
            param: param.into(),
            tool,
        }
    }

    /// The error the caller should act on
    pub fn root(&self) -> &RouterError {
        match self {
            RouterError::AgentLoopAborted { fallback, .. } => fallback.root(),
            other => other,
        }
    }

    /// Stable identifier of the root error, for traces and responses
    pub fn code(&self) -> &'static str {
        match self.root() {
            RouterError::AmbiguousIntent { .. } => "ambiguous_intent",
            RouterError::MissingParameter { .. } => "missing_parameter",
            RouterError::InvalidParameter { .. } => "invalid_parameter",
            RouterError::UnsupportedTool(_) => "unsupported_tool",
            RouterError::AgentLoopAborted { .. } => "agent_loop_aborted",
        }
    }

    /// Message shown to the end user
    pub fn user_message(&self) -> String {
        match self {
            RouterError::AmbiguousIntent { .. } => "I couldn't tell which analysis you want. \
                Ask for terrain analysis, layout optimization, a wake simulation or a report."
                .to_string(),
            RouterError::MissingParameter { param, tool } => match param.as_str() {
                "coordinates" => format!(
                    "Please provide the site coordinates (latitude, longitude) for the {}.",
                    tool.display_name()
                ),
                _ => format!(
                    "The {} needs {} first. Please run that stage before asking for this one.",
                    tool.display_name(),
                    param
                ),
            },
            RouterError::InvalidParameter { tool, message } => {
                format!("The {} request is invalid: {}.", tool.display_name(), message)
            }
            RouterError::UnsupportedTool(tool) => {
                format!("The {} service is not available right now.", tool.display_name())
            }
            RouterError::AgentLoopAborted { fallback, .. } => fallback.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_prompt() {
        let err = RouterError::missing("coordinates", ToolName::Layout);
        assert!(err.user_message().contains("latitude, longitude"));
        assert!(err.user_message().contains("layout optimization"));
    }

    #[test]
    fn test_aborted_defers_to_fallback() {
        let fallback = RouterError::missing("coordinates", ToolName::Layout);
        let err = RouterError::AgentLoopAborted {
            reason: AbortReason::BudgetExhausted { attempts: 3 },
            fallback: Box::new(fallback.clone()),
        };

        assert_eq!(err.root(), &fallback);
        assert_eq!(err.code(), "missing_parameter");
        assert_eq!(err.user_message(), fallback.user_message());
        assert!(!err.to_string().contains("Missing required parameter"));
    }
}
