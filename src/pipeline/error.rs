use thiserror::Error;

use crate::session::SessionError;

/// Infrastructure failures that prevent a request from being handled at all
///
/// Routing rejections and stage failures are not errors at this level; they
/// are reported inside the [`PipelineResponse`](super::PipelineResponse).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Session store error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CoordinatorError {
    pub fn user_message(&self) -> String {
        match self {
            CoordinatorError::Session(e) if e.is_absent() => {
                "That session does not exist or has expired. Start a new request to continue."
                    .to_string()
            }
            CoordinatorError::Session(SessionError::InvalidId(_)) => {
                "A session id is required.".to_string()
            }
            CoordinatorError::Session(_) => {
                "Session storage is unavailable right now. Please try again later.".to_string()
            }
            CoordinatorError::InvalidRequest(message) => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_reads_like_not_found() {
        let expired = CoordinatorError::from(SessionError::Expired("s1".into()));
        let missing = CoordinatorError::from(SessionError::NotFound("s1".into()));
        assert_eq!(expired.user_message(), missing.user_message());
    }
}
