//! Agent backend errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by an [`LLMClient`](super::LLMClient)
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum BackendError {
    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Request timed out after {seconds} seconds")]
    TimeoutError { seconds: u64 },

    #[error("Rate limit exceeded")]
    RateLimitError { retry_after: Option<u64> },

    #[error("Invalid response from agent: {message}")]
    InvalidResponse { message: String },

    /// Missing credentials or an unknown provider
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Error: {message}")]
    Other { message: String },
}
