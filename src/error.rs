//! Shared error taxonomy for worker outcomes
//!
//! Worker failures are carried as data ([`ToolError`]) rather than as Rust
//! error chains. Each failure has exactly one [`ErrorKind`], and only
//! [`ErrorKind::TransientInfrastructure`] is ever retried.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failed worker call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing parameters. Never retried.
    Validation,
    /// Timeout, throttling or transient 5xx. Retried per policy.
    TransientInfrastructure,
    /// The worker explicitly rejected the semantic request. Never retried.
    TerminalTool,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientInfrastructure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::TransientInfrastructure => "transient_infrastructure_error",
            ErrorKind::TerminalTool => "terminal_tool_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single, flat worker error
///
/// `message` is the worker's own text for this one failure. It is never built
/// by concatenating the message of an earlier attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientInfrastructure, message)
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TerminalTool, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}
