//! Worker contract
//!
//! One worker per analysis stage, each a synchronous request/response unit.
//! A worker either answers with a [`WorkerResponse`] (which may itself report
//! a semantic failure) or fails in transport with a [`ToolError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ToolError};

use super::types::{ArtifactRef, CorrelationId, ToolName, ToolParams};

/// Body sent to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    #[serde(flatten)]
    pub params: ToolParams,
    pub correlation_id: CorrelationId,
    /// 1-based; repeated attempts share `correlation_id`
    pub attempt: u32,
}

/// Body returned by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub success: bool,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl WorkerResponse {
    pub fn ok(artifacts: Vec<ArtifactRef>) -> Self {
        Self {
            success: true,
            artifacts,
            error: None,
        }
    }

    pub fn failed(error: ToolError) -> Self {
        Self {
            success: false,
            artifacts: Vec::new(),
            error: Some(error),
        }
    }

    /// Normalizes the response into artifacts or a single flat error
    ///
    /// A failure without an error body is treated as a terminal rejection.
    pub fn into_outcome(self) -> Result<Vec<ArtifactRef>, ToolError> {
        if self.success {
            return Ok(self.artifacts);
        }
        Err(self.error.unwrap_or_else(|| {
            ToolError::new(ErrorKind::TerminalTool, "worker reported failure without detail")
        }))
    }
}

#[async_trait]
pub trait Worker: Send + Sync {
    fn tool(&self) -> ToolName;

    fn endpoint(&self) -> String;

    async fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::TerrainParams;
    use serde_json::json;

    #[test]
    fn test_failure_without_error_is_terminal() {
        let response = WorkerResponse {
            success: false,
            artifacts: Vec::new(),
            error: None,
        };
        let err = response.into_outcome().unwrap_err();
        assert_eq!(err.kind, ErrorKind::TerminalTool);
    }

    #[test]
    fn test_response_parses_contract() {
        let body = json!({
            "success": false,
            "error": {"kind": "transient_infrastructure", "message": "throttled"}
        });
        let response: WorkerResponse = serde_json::from_value(body).unwrap();
        let err = response.into_outcome().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.message, "throttled");
    }

    #[test]
    fn test_request_body_shape() {
        let request = WorkerRequest {
            params: ToolParams::Terrain(TerrainParams {
                latitude: 1.0,
                longitude: 2.0,
                radius_km: Some(5.0),
                setback_m: None,
            }),
            correlation_id: CorrelationId::derive("s", "i1", ToolName::Terrain, 1),
            attempt: 2,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["toolName"], "terrain");
        assert_eq!(value["params"]["radiusKm"], 5.0);
        assert_eq!(value["attempt"], 2);
        assert!(value["correlationId"].as_str().unwrap().starts_with("corr-"));
    }
}
