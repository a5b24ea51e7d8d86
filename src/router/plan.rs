//! Call plans and parameter derivation

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::session::{Location, Session};
use crate::tools::{
    ArtifactRef, LayoutParams, ReportParams, SimulationParams, TerrainParams, ToolCallResult,
    ToolName, ToolParams,
};

/// Slot values supplied alongside an utterance
///
/// Used for caller-provided `explicitParams`, for values extracted from the
/// utterance, and for arguments proposed by the agent. Every field is
/// optional; precedence between sources is applied by [`SlotValues::or`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotValues {
    #[serde(default, alias = "lat", skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lon", alias = "lng", skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setback_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_mw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turbine_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed_ms: Option<f64>,
}

impl SlotValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = Some(radius_km);
        self
    }

    pub fn with_capacity_mw(mut self, capacity_mw: f64) -> Self {
        self.capacity_mw = Some(capacity_mw);
        self
    }

    /// Coordinates, only when both halves are present
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Field-wise merge where `self` wins and `fallback` fills the gaps
    ///
    /// Coordinates are taken as a pair so a latitude from one source is never
    /// combined with a longitude from another.
    pub fn or(&self, fallback: &SlotValues) -> SlotValues {
        let (latitude, longitude) = match self.coordinates().or(fallback.coordinates()) {
            Some((lat, lon)) => (Some(lat), Some(lon)),
            None => (None, None),
        };
        SlotValues {
            latitude,
            longitude,
            radius_km: self.radius_km.or(fallback.radius_km),
            setback_m: self.setback_m.or(fallback.setback_m),
            capacity_mw: self.capacity_mw.or(fallback.capacity_mw),
            turbine_count: self.turbine_count.or(fallback.turbine_count),
            wind_speed_ms: self.wind_speed_ms.or(fallback.wind_speed_ms),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SlotValues::default()
    }
}

/// How one stage's parameters are built at execution time
///
/// Coordinates and tuning slots are fixed when the plan is made. Artifact
/// inputs are looked up when the stage is about to run: first in the
/// immediately preceding stage's output, then in the merged session. Stored
/// results produced for another site are never used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDerivation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setback_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_mw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turbine_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed_ms: Option<f64>,
}

impl ParamDerivation {
    /// Builds a derivation from resolved slots; `None` without coordinates
    pub fn from_slots(slots: &SlotValues) -> Option<Self> {
        let (latitude, longitude) = slots.coordinates()?;
        Some(Self {
            latitude,
            longitude,
            radius_km: slots.radius_km,
            setback_m: slots.setback_m,
            capacity_mw: slots.capacity_mw,
            turbine_count: slots.turbine_count,
            wind_speed_ms: slots.wind_speed_ms,
        })
    }

    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude)
    }

    /// Concrete parameters for `stage`
    pub fn derive(
        &self,
        stage: ToolName,
        session: &Session,
        previous: Option<&ToolCallResult>,
    ) -> Result<ToolParams, ToolError> {
        let params = match stage {
            ToolName::Terrain => ToolParams::Terrain(TerrainParams {
                latitude: self.latitude,
                longitude: self.longitude,
                radius_km: self.radius_km,
                setback_m: self.setback_m,
            }),
            ToolName::Layout => ToolParams::Layout(LayoutParams {
                latitude: self.latitude,
                longitude: self.longitude,
                capacity_mw: self.capacity_mw,
                turbine_count: self.turbine_count,
                terrain: self.input_artifact(ToolName::Terrain, session, previous),
            }),
            ToolName::Simulation => ToolParams::Simulation(SimulationParams {
                latitude: self.latitude,
                longitude: self.longitude,
                layout: self.required_artifact(ToolName::Layout, stage, session, previous)?,
                wind_speed_ms: self.wind_speed_ms,
            }),
            ToolName::Report => ToolParams::Report(ReportParams {
                latitude: self.latitude,
                longitude: self.longitude,
                simulation: self.required_artifact(ToolName::Simulation, stage, session, previous)?,
                layout: self.input_artifact(ToolName::Layout, session, previous),
            }),
        };
        params.validate()?;
        Ok(params)
    }

    fn input_artifact(
        &self,
        source: ToolName,
        session: &Session,
        previous: Option<&ToolCallResult>,
    ) -> Option<ArtifactRef> {
        previous
            .filter(|p| p.success && p.tool == source)
            .and_then(|p| p.artifacts.last().cloned())
            .or_else(|| session.artifact_at(source, &self.location()).cloned())
    }

    fn required_artifact(
        &self,
        source: ToolName,
        stage: ToolName,
        session: &Session,
        previous: Option<&ToolCallResult>,
    ) -> Result<ArtifactRef, ToolError> {
        self.input_artifact(source, session, previous).ok_or_else(|| {
            ToolError::validation(format!(
                "{} needs a {} result for this site, none is available",
                stage.display_name(),
                source.display_name()
            ))
        })
    }
}

/// Stage whose output `stage` cannot run without
pub fn prerequisite(stage: ToolName) -> Option<ToolName> {
    match stage {
        ToolName::Terrain | ToolName::Layout => None,
        ToolName::Simulation => Some(ToolName::Layout),
        ToolName::Report => Some(ToolName::Simulation),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStage {
    pub stage: ToolName,
    pub derivation: ParamDerivation,
}

/// Ordered stages for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelinePlan {
    pub stages: Vec<PlannedStage>,
}

impl PipelinePlan {
    /// Plan over `stages` in canonical pipeline order, deduplicated
    pub fn new(mut stages: Vec<ToolName>, derivation: ParamDerivation) -> Self {
        stages.sort();
        stages.dedup();
        Self {
            stages: stages
                .into_iter()
                .map(|stage| PlannedStage {
                    stage,
                    derivation: derivation.clone(),
                })
                .collect(),
        }
    }

    pub fn single(stage: ToolName, derivation: ParamDerivation) -> Self {
        Self::new(vec![stage], derivation)
    }

    pub fn tools(&self) -> Vec<ToolName> {
        self.stages.iter().map(|s| s.stage).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.stages.len() == 1
    }

    /// First stage whose required input is neither produced earlier in the
    /// plan nor stored in `session` for the stage's site, paired with that
    /// input
    pub fn missing_prerequisite(&self, session: Option<&Session>) -> Option<(ToolName, ToolName)> {
        self.stages.iter().enumerate().find_map(|(i, planned)| {
            let needed = prerequisite(planned.stage)?;
            let produced_earlier = self.stages[..i].iter().any(|s| s.stage == needed);
            let site = planned.derivation.location();
            let stored = session
                .and_then(|s| s.artifact_at(needed, &site))
                .is_some();
            (!produced_earlier && !stored).then_some((planned.stage, needed))
        })
    }
}
