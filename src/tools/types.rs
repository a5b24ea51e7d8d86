//! Tool call types
//!
//! The set of tools is closed: every [`ToolName`] has exactly one parameter
//! shape in [`ToolParams`], and parameters are validated before any worker is
//! contacted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::ToolError;

/// Analysis stage served by one independently deployed worker
///
/// Declaration order is the canonical pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    Terrain,
    Layout,
    Simulation,
    Report,
}

impl ToolName {
    /// All tools in pipeline order
    pub const ALL: [ToolName; 4] = [
        ToolName::Terrain,
        ToolName::Layout,
        ToolName::Simulation,
        ToolName::Report,
    ];

    /// Stage name used as the key in `Session::stage_results`
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Terrain => "terrain",
            ToolName::Layout => "layout",
            ToolName::Simulation => "simulation",
            ToolName::Report => "report",
        }
    }

    /// Function name exposed to the agent
    pub fn function_name(&self) -> &'static str {
        match self {
            ToolName::Terrain => "analyze_terrain",
            ToolName::Layout => "optimize_layout",
            ToolName::Simulation => "run_simulation",
            ToolName::Report => "generate_report",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ToolName::Terrain => "terrain analysis",
            ToolName::Layout => "layout optimization",
            ToolName::Simulation => "wake simulation",
            ToolName::Report => "report generation",
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.function_name() == name)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lower || t.function_name() == lower)
            .ok_or_else(|| format!("Unknown tool: {}", s))
    }
}

/// Opaque handle into the blob store
///
/// The orchestrator never interprets the contents behind `location_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRef {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub location_ref: String,
}

impl ArtifactRef {
    pub fn new(artifact_type: impl Into<String>, location_ref: impl Into<String>) -> Self {
        Self {
            artifact_type: artifact_type.into(),
            location_ref: location_ref.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainParams {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setback_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutParams {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_mw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turbine_count: Option<u32>,
    /// Terrain output this layout is constrained by, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terrain: Option<ArtifactRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParams {
    pub latitude: f64,
    pub longitude: f64,
    pub layout: ArtifactRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportParams {
    pub latitude: f64,
    pub longitude: f64,
    pub simulation: ArtifactRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<ArtifactRef>,
}

/// Parameters for one tool, tagged by tool name
///
/// Serializes as `{"toolName": "...", "params": {...}}`, which is the worker
/// request contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "toolName", content = "params", rename_all = "snake_case")]
pub enum ToolParams {
    Terrain(TerrainParams),
    Layout(LayoutParams),
    Simulation(SimulationParams),
    Report(ReportParams),
}

impl ToolParams {
    /// Hex sha256 of the canonical JSON body
    pub fn fingerprint(&self) -> String {
        let body = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&body))
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolParams::Terrain(_) => ToolName::Terrain,
            ToolParams::Layout(_) => ToolName::Layout,
            ToolParams::Simulation(_) => ToolName::Simulation,
            ToolParams::Report(_) => ToolName::Report,
        }
    }

    /// Site coordinates as `(latitude, longitude)`
    pub fn coordinates(&self) -> (f64, f64) {
        match self {
            ToolParams::Terrain(p) => (p.latitude, p.longitude),
            ToolParams::Layout(p) => (p.latitude, p.longitude),
            ToolParams::Simulation(p) => (p.latitude, p.longitude),
            ToolParams::Report(p) => (p.latitude, p.longitude),
        }
    }

    /// Rejects parameters that must never reach a worker
    pub fn validate(&self) -> Result<(), ToolError> {
        let (lat, lon) = self.coordinates();
        validate_coordinates(lat, lon)?;

        match self {
            ToolParams::Terrain(p) => {
                positive("radiusKm", p.radius_km)?;
                positive("setbackM", p.setback_m)?;
            }
            ToolParams::Layout(p) => {
                positive("capacityMw", p.capacity_mw)?;
                if p.turbine_count == Some(0) {
                    return Err(ToolError::validation("turbineCount must be at least 1"));
                }
            }
            ToolParams::Simulation(p) => {
                positive("windSpeedMs", p.wind_speed_ms)?;
                non_empty("layout", &p.layout)?;
            }
            ToolParams::Report(p) => {
                non_empty("simulation", &p.simulation)?;
            }
        }
        Ok(())
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), ToolError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(ToolError::validation(format!(
            "latitude {} is outside [-90, 90]",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(ToolError::validation(format!(
            "longitude {} is outside [-180, 180]",
            longitude
        )));
    }
    Ok(())
}

fn positive(field: &str, value: Option<f64>) -> Result<(), ToolError> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(ToolError::validation(format!(
            "{} must be a positive number, got {}",
            field, v
        ))),
        _ => Ok(()),
    }
}

fn non_empty(field: &str, artifact: &ArtifactRef) -> Result<(), ToolError> {
    if artifact.location_ref.trim().is_empty() {
        return Err(ToolError::validation(format!(
            "{} artifact reference is empty",
            field
        )));
    }
    Ok(())
}

/// Deterministic id shared by every attempt of one logical call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Derives the id from the session, its incarnation, the stage and the
    /// request sequence number
    pub fn derive(session_id: &str, incarnation: &str, stage: ToolName, request_seq: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        hasher.update(b":");
        hasher.update(incarnation.as_bytes());
        hasher.update(b":");
        hasher.update(stage.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(request_seq.to_string().as_bytes());
        let digest = hasher.finalize();
        Self(format!("corr-{}", hex::encode(&digest[..16])))
    }

    /// Wraps an id issued elsewhere
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical call to one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    #[serde(flatten)]
    pub params: ToolParams,
    pub session_id: String,
    pub correlation_id: CorrelationId,
}

impl ToolCallRequest {
    pub fn new(
        params: ToolParams,
        session_id: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            params,
            session_id: session_id.into(),
            correlation_id,
        }
    }

    pub fn tool_name(&self) -> ToolName {
        self.params.tool()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { error: ToolError },
}

/// Structured record of one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
    /// Delay scheduled before the next attempt, if one follows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
}

impl AttemptRecord {
    pub fn error(&self) -> Option<&ToolError> {
        match &self.outcome {
            AttemptOutcome::Failed { error } => Some(error),
            AttemptOutcome::Succeeded => None,
        }
    }
}

/// Terminal result of one logical call, after all retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub tool: ToolName,
    pub correlation_id: CorrelationId,
    pub success: bool,
    pub artifacts: Vec<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    pub attempts: Vec<AttemptRecord>,
    /// True when served from the result cache without contacting the worker
    #[serde(default)]
    pub cached: bool,
}

impl ToolCallResult {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Result for a request rejected before any worker call
    pub fn rejected(request: &ToolCallRequest, error: ToolError) -> Self {
        Self {
            tool: request.tool_name(),
            correlation_id: request.correlation_id.clone(),
            success: false,
            artifacts: Vec::new(),
            error: Some(error),
            attempts: Vec::new(),
            cached: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn terrain(lat: f64, lon: f64) -> ToolParams {
        ToolParams::Terrain(TerrainParams {
            latitude: lat,
            longitude: lon,
            radius_km: None,
            setback_m: None,
        })
    }

    #[test]
    fn test_tool_name_order_is_pipeline_order() {
        let mut names = vec![
            ToolName::Report,
            ToolName::Terrain,
            ToolName::Simulation,
            ToolName::Layout,
        ];
        names.sort();
        assert_eq!(names, ToolName::ALL.to_vec());
    }

    #[test]
    fn test_tool_name_parsing() {
        assert_eq!("layout".parse::<ToolName>().unwrap(), ToolName::Layout);
        assert_eq!("run_simulation".parse::<ToolName>().unwrap(), ToolName::Simulation);
        assert_eq!("REPORT".parse::<ToolName>().unwrap(), ToolName::Report);
        assert!("wake".parse::<ToolName>().is_err());
        assert_eq!(ToolName::from_function_name("analyze_terrain"), Some(ToolName::Terrain));
        assert_eq!(ToolName::from_function_name("terrain"), None);
    }

    #[test]
    fn test_params_wire_shape() {
        let value = serde_json::to_value(terrain(35.067482, -101.395466)).unwrap();
        assert_eq!(
            value,
            json!({
                "toolName": "terrain",
                "params": {"latitude": 35.067482, "longitude": -101.395466}
            })
        );
    }

    #[test]
    fn test_params_reject_wrong_shape() {
        let bad = json!({"toolName": "simulation", "params": {"latitude": 1.0, "longitude": 2.0}});
        assert!(serde_json::from_value::<ToolParams>(bad).is_err());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(terrain(35.0, -101.0).validate().is_ok());
        assert!(terrain(91.0, 0.0).validate().is_err());
        assert!(terrain(0.0, -181.0).validate().is_err());
        assert!(terrain(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_validate_optional_numbers() {
        let params = ToolParams::Layout(LayoutParams {
            latitude: 10.0,
            longitude: 10.0,
            capacity_mw: Some(-5.0),
            turbine_count: None,
            terrain: None,
        });
        let err = params.validate().unwrap_err();
        assert!(err.message.contains("capacityMw"));

        let params = ToolParams::Layout(LayoutParams {
            latitude: 10.0,
            longitude: 10.0,
            capacity_mw: None,
            turbine_count: Some(0),
            terrain: None,
        });
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_validate_empty_artifact() {
        let params = ToolParams::Simulation(SimulationParams {
            latitude: 10.0,
            longitude: 10.0,
            layout: ArtifactRef::new("layout", "  "),
            wind_speed_ms: None,
        });
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_correlation_id_is_deterministic() {
        let a = CorrelationId::derive("s1", "i1", ToolName::Layout, 4);
        let b = CorrelationId::derive("s1", "i1", ToolName::Layout, 4);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("corr-"));
        assert_eq!(a.as_str().len(), "corr-".len() + 32);

        assert_ne!(a, CorrelationId::derive("s1", "i1", ToolName::Terrain, 4));
        assert_ne!(a, CorrelationId::derive("s1", "i1", ToolName::Layout, 5));
        assert_ne!(a, CorrelationId::derive("s2", "i1", ToolName::Layout, 4));
        assert_ne!(a, CorrelationId::derive("s1", "i2", ToolName::Layout, 4));
    }

    #[test]
    fn test_fingerprint_follows_params() {
        assert_eq!(terrain(1.0, 2.0).fingerprint(), terrain(1.0, 2.0).fingerprint());
        assert_ne!(terrain(1.0, 2.0).fingerprint(), terrain(1.0, 2.5).fingerprint());
        assert_eq!(terrain(1.0, 2.0).fingerprint().len(), 64);
    }

    #[test]
    fn test_request_serialization_flattens_params() {
        let request = ToolCallRequest::new(terrain(1.0, 2.0), "s1", CorrelationId::new("corr-1"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["toolName"], "terrain");
        assert_eq!(value["params"]["latitude"], 1.0);
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["correlationId"], request.correlation_id.as_str());
    }
}
