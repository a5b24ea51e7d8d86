//! Rule-based intent resolution
//!
//! Keyword and regex slot extraction over the utterance, completed from the
//! session. Resolution is a pure function of its inputs: no clock, no I/O and
//! no randomness are involved, so the same utterance and session always give
//! the same plan.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;

use super::error::RouterError;
use super::plan::{ParamDerivation, PipelinePlan, SlotValues};
use crate::session::Session;
use crate::tools::types::validate_coordinates;
use crate::tools::ToolName;

struct Patterns {
    coordinate_pair: Regex,
    named_latitude: Regex,
    named_longitude: Regex,
    radius_km: Regex,
    setback_m: Regex,
    capacity_mw: Regex,
    turbine_count: Regex,
    wind_speed_ms: Regex,
    full_pipeline: Regex,
    stage_keywords: [(ToolName, Regex); 4],
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("valid regex");
        Patterns {
            coordinate_pair: re(
                concat!(
                    r"(?i)(?:^|[^\w.\-])(-?)(\d{1,2}(?:\.\d+)?)\s*°?\s*([ns])?",
                    r"\s*,\s*(-?)(\d{1,3}(?:\.\d+)?)\s*°?\s*([ew])?\b",
                ),
            ),
            named_latitude: re(r"(?i)\blat(?:itude)?\s*[=:]?\s*(-?\d{1,2}(?:\.\d+)?)"),
            named_longitude: re(r"(?i)\b(?:lon(?:gitude)?|lng)\s*[=:]?\s*(-?\d{1,3}(?:\.\d+)?)"),
            radius_km: re(r"(?i)(\d+(?:\.\d+)?)\s*(?:km|kilomet(?:er|re)s?)\b"),
            setback_m: re(
                concat!(
                    r"(?i)setback\s*(?:of\s*)?(\d+(?:\.\d+)?)",
                    r"|(\d+(?:\.\d+)?)\s*(?:m|meters?|metres?)\s+setback",
                ),
            ),
            capacity_mw: re(r"(?i)(\d+(?:\.\d+)?)\s*mw\b"),
            turbine_count: re(r"(?i)\b(\d+)\s+turbines?\b"),
            wind_speed_ms: re(r"(?i)(\d+(?:\.\d+)?)\s*(?:m/s|mps|meters per second)"),
            full_pipeline: re(
                concat!(
                    r"(?i)\b(?:full|complete|end[- ]to[- ]end|entire|whole)\b.{0,24}?",
                    r"\b(?:analysis|pipeline|workflow|assessment|study|evaluation)\b",
                ),
            ),
            stage_keywords: [
                (
                    ToolName::Terrain,
                    re(r"(?i)\b(?:terrain|topograph\w*|elevation|slopes?|site analysis)\b"),
                ),
                (
                    ToolName::Layout,
                    re(concat!(
                        r"(?i)\b(?:layouts?|turbine placement|place turbines",
                        r"|optimi[sz]\w*|siting)\b",
                    )),
                ),
                (
                    ToolName::Simulation,
                    re(r"(?i)\b(?:simulat\w*|wake|energy yield|aep|annual energy)\b"),
                ),
                (
                    ToolName::Report,
                    re(r"(?i)\b(?:reports?|summary|summari[sz]e)\b"),
                ),
            ],
        }
    })
}

fn number<T: std::str::FromStr>(text: Option<regex::Match<'_>>) -> Option<T> {
    text.and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeterministicStrategy;

impl DeterministicStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Stages named by the utterance, in pipeline order
    pub fn detect_stages(&self, utterance: &str) -> Vec<ToolName> {
        let patterns = patterns();
        if patterns.full_pipeline.is_match(utterance) {
            return ToolName::ALL.to_vec();
        }
        patterns
            .stage_keywords
            .iter()
            .filter(|(_, re)| re.is_match(utterance))
            .map(|(tool, _)| *tool)
            .collect()
    }

    pub fn is_multi_stage(&self, utterance: &str) -> bool {
        self.detect_stages(utterance).len() > 1
    }

    /// Slot values found in the utterance text
    pub fn extract_slots(&self, utterance: &str) -> SlotValues {
        let patterns = patterns();
        let (latitude, longitude) = match extract_coordinates(utterance) {
            Some((lat, lon)) => (Some(lat), Some(lon)),
            None => (None, None),
        };

        let setback_m = patterns
            .setback_m
            .captures(utterance)
            .and_then(|caps| number(caps.get(1).or(caps.get(2))));

        SlotValues {
            latitude,
            longitude,
            radius_km: patterns
                .radius_km
                .captures(utterance)
                .and_then(|c| number(c.get(1))),
            setback_m,
            capacity_mw: patterns
                .capacity_mw
                .captures(utterance)
                .and_then(|c| number(c.get(1))),
            turbine_count: patterns
                .turbine_count
                .captures(utterance)
                .and_then(|c| number(c.get(1))),
            wind_speed_ms: patterns
                .wind_speed_ms
                .captures(utterance)
                .and_then(|c| number(c.get(1))),
        }
    }

    /// Slots with precedence explicit > utterance > session
    pub fn resolve_slots(
        &self,
        utterance: &str,
        session: Option<&Session>,
        explicit: &SlotValues,
    ) -> SlotValues {
        let from_session = session
            .and_then(|s| s.last_location.as_ref())
            .map(|loc| SlotValues::new().with_coordinates(loc.lat, loc.lon))
            .unwrap_or_default();

        explicit
            .or(&self.extract_slots(utterance))
            .or(&from_session)
    }

    /// Resolves the request into a plan, failing closed on missing inputs
    pub fn plan(
        &self,
        utterance: &str,
        session: Option<&Session>,
        explicit: &SlotValues,
        available: &BTreeSet<ToolName>,
    ) -> Result<PipelinePlan, RouterError> {
        let stages = self.detect_stages(utterance);
        let Some(&first) = stages.first() else {
            return Err(RouterError::AmbiguousIntent {
                utterance: utterance.to_string(),
            });
        };

        if let Some(&tool) = stages.iter().find(|t| !available.contains(t)) {
            return Err(RouterError::UnsupportedTool(tool));
        }

        let slots = self.resolve_slots(utterance, session, explicit);
        let derivation = ParamDerivation::from_slots(&slots)
            .ok_or_else(|| RouterError::missing("coordinates", first))?;
        validate_coordinates(derivation.latitude, derivation.longitude).map_err(|e| {
            RouterError::InvalidParameter {
                tool: first,
                message: e.message,
            }
        })?;

        let plan = PipelinePlan::new(stages, derivation);
        if let Some((stage, needed)) = plan.missing_prerequisite(session) {
            return Err(RouterError::missing(
                format!("a {} result", needed.display_name()),
                stage,
            ));
        }

        debug!(stages = ?plan.tools(), "Deterministic plan");
        Ok(plan)
    }
}

/// First in-range coordinate pair, trying `lat, lon` before named fields
fn extract_coordinates(utterance: &str) -> Option<(f64, f64)> {
    let patterns = patterns();

    let pair = patterns.coordinate_pair.captures_iter(utterance).find_map(|caps| {
        let mut lat: f64 = number(caps.get(2))?;
        let mut lon: f64 = number(caps.get(5))?;
        if !caps.get(1).map_or("", |m| m.as_str()).is_empty() {
            lat = -lat;
        }
        if !caps.get(4).map_or("", |m| m.as_str()).is_empty() {
            lon = -lon;
        }
        if caps.get(3).is_some_and(|m| m.as_str().eq_ignore_ascii_case("s")) {
            lat = -lat.abs();
        }
        if caps.get(6).is_some_and(|m| m.as_str().eq_ignore_ascii_case("w")) {
            lon = -lon.abs();
        }
        validate_coordinates(lat, lon).ok().map(|_| (lat, lon))
    });
    if pair.is_some() {
        return pair;
    }

    let lat: f64 = patterns
        .named_latitude
        .captures(utterance)
        .and_then(|c| number(c.get(1)))?;
    let lon: f64 = patterns
        .named_longitude
        .captures(utterance)
        .and_then(|c| number(c.get(1)))?;
    Some((lat, lon))
}
