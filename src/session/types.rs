use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tools::{ArtifactRef, CorrelationId, ToolName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_address: Option<String>,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            resolved_address: None,
        }
    }

    /// Same coordinates, regardless of the resolved address
    pub fn same_site(&self, other: &Location) -> bool {
        self.lat == other.lat && self.lon == other.lon
    }
}

/// Durable per-conversation pipeline state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<Location>,
    #[serde(default)]
    pub stage_results: BTreeMap<ToolName, Vec<ArtifactRef>>,
    /// Site each stored stage result was produced for
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stage_sites: BTreeMap<ToolName, Location>,
    /// Start of this incarnation; a session recreated after expiry gets a new one
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Inactivity window in seconds
    pub ttl_secs: u64,
    #[serde(default)]
    pub cancelled: bool,
    /// Bumped once per inbound request; seeds correlation ids
    #[serde(default)]
    pub request_seq: u64,
}

impl Session {
    pub fn new(session_id: impl Into<String>, ttl_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            last_location: None,
            stage_results: BTreeMap::new(),
            stage_sites: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            ttl_secs,
            cancelled: false,
            request_seq: 0,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        self.updated_at
            .checked_add_signed(Duration::seconds(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Most recent artifact recorded for `stage`
    pub fn latest_artifact(&self, stage: ToolName) -> Option<&ArtifactRef> {
        self.stage_results.get(&stage).and_then(|a| a.last())
    }

    /// Most recent artifact for `stage`, only if it was produced for `site`
    ///
    /// Results without a recorded site are never reused.
    pub fn artifact_at(&self, stage: ToolName, site: &Location) -> Option<&ArtifactRef> {
        self.stage_sites
            .get(&stage)
            .filter(|recorded| recorded.same_site(site))
            .and(self.latest_artifact(stage))
    }

    pub fn incarnation(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Correlation id for `stage` in the current request of this incarnation
    pub fn correlation_id(&self, stage: ToolName) -> CorrelationId {
        CorrelationId::derive(
            &self.session_id,
            &self.incarnation(),
            stage,
            self.request_seq,
        )
    }

    /// Applies `patch`: present fields overwrite, absent fields are retained
    pub fn apply(&mut self, patch: &SessionPatch, now: DateTime<Utc>) {
        if let Some(location) = &patch.last_location {
            self.last_location = Some(location.clone());
        }
        for (stage, artifacts) in &patch.stage_results {
            self.stage_results.insert(*stage, artifacts.clone());
            match patch.stage_sites.get(stage) {
                Some(site) => self.stage_sites.insert(*stage, site.clone()),
                None => self.stage_sites.remove(stage),
            };
        }
        for (stage, site) in &patch.stage_sites {
            if !patch.stage_results.contains_key(stage) {
                self.stage_sites.insert(*stage, site.clone());
            }
        }
        if let Some(ttl_secs) = patch.ttl_secs {
            self.ttl_secs = ttl_secs;
        }
        if let Some(cancelled) = patch.cancelled {
            self.cancelled = cancelled;
        }
        if let Some(request_seq) = patch.request_seq {
            self.request_seq = request_seq;
        }
        self.updated_at = now;
    }
}

/// Partial update for [`Session`]
///
/// `stage_results` merges per stage: listed stages are replaced, unlisted
/// stages are kept. A replaced stage takes its site from `stage_sites` and
/// loses any previously recorded site when none is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<Location>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stage_results: BTreeMap<ToolName, Vec<ArtifactRef>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stage_sites: BTreeMap<ToolName, Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_seq: Option<u64>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.last_location = Some(location);
        self
    }

    pub fn with_stage_result(mut self, stage: ToolName, artifacts: Vec<ArtifactRef>) -> Self {
        self.stage_results.insert(stage, artifacts);
        self
    }

    /// Stage result together with the site it was produced for
    pub fn with_stage_result_at(
        mut self,
        stage: ToolName,
        artifacts: Vec<ArtifactRef>,
        site: Location,
    ) -> Self {
        self.stage_results.insert(stage, artifacts);
        self.stage_sites.insert(stage, site);
        self
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = Some(cancelled);
        self
    }

    pub fn with_request_seq(mut self, request_seq: u64) -> Self {
        self.request_seq = Some(request_seq);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_expiry_boundary() {
        let session = Session::new("s1", 60, t0());
        assert!(!session.is_expired(t0() + Duration::seconds(59)));
        assert!(session.is_expired(t0() + Duration::seconds(60)));
    }

    #[test]
    fn test_apply_retains_absent_fields() {
        let mut session = Session::new("s1", 60, t0());
        session.apply(
            &SessionPatch::new()
                .with_location(Location::new(35.0, -101.0))
                .with_stage_result(
                    ToolName::Terrain,
                    vec![ArtifactRef::new("terrain", "blob://t/1")],
                ),
            t0(),
        );

        let later = t0() + Duration::seconds(5);
        session.apply(
            &SessionPatch::new().with_stage_result(
                ToolName::Layout,
                vec![ArtifactRef::new("layout", "blob://l/1")],
            ),
            later,
        );

        assert_eq!(session.last_location, Some(Location::new(35.0, -101.0)));
        assert_eq!(session.stage_results.len(), 2);
        assert_eq!(
            session.latest_artifact(ToolName::Terrain).unwrap().location_ref,
            "blob://t/1"
        );
        assert_eq!(session.updated_at, later);
    }

    #[test]
    fn test_apply_overwrites_present_stage() {
        let mut session = Session::new("s1", 60, t0());
        session.apply(
            &SessionPatch::new()
                .with_stage_result(ToolName::Terrain, vec![ArtifactRef::new("terrain", "old")]),
            t0(),
        );
        session.apply(
            &SessionPatch::new()
                .with_stage_result(ToolName::Terrain, vec![ArtifactRef::new("terrain", "new")]),
            t0(),
        );
        assert_eq!(session.stage_results[&ToolName::Terrain].len(), 1);
        assert_eq!(session.latest_artifact(ToolName::Terrain).unwrap().location_ref, "new");
    }

    #[test]
    fn test_session_serde_keys() {
        let mut session = Session::new("s1", 60, t0());
        session
            .stage_results
            .insert(ToolName::Terrain, vec![ArtifactRef::new("terrain", "blob://t")]);
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["stageResults"]["terrain"][0]["locationRef"], "blob://t");

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_artifact_at_matches_site_only() {
        let site_a = Location::new(35.0, -101.0);
        let site_b = Location::new(48.0, 11.0);
        let mut session = Session::new("s1", 60, t0());
        session.apply(
            &SessionPatch::new().with_stage_result_at(
                ToolName::Layout,
                vec![ArtifactRef::new("layout", "blob://l/a")],
                site_a.clone(),
            ),
            t0(),
        );

        assert_eq!(
            session.artifact_at(ToolName::Layout, &site_a).map(|a| a.location_ref.as_str()),
            Some("blob://l/a")
        );
        assert!(session.artifact_at(ToolName::Layout, &site_b).is_none());
        assert!(session.artifact_at(ToolName::Terrain, &site_a).is_none());
    }

    #[test]
    fn test_replaced_stage_without_site_is_not_reused() {
        let site = Location::new(35.0, -101.0);
        let mut session = Session::new("s1", 60, t0());
        session.apply(
            &SessionPatch::new().with_stage_result_at(
                ToolName::Terrain,
                vec![ArtifactRef::new("terrain", "old")],
                site.clone(),
            ),
            t0(),
        );
        session.apply(
            &SessionPatch::new()
                .with_stage_result(ToolName::Terrain, vec![ArtifactRef::new("terrain", "new")]),
            t0(),
        );

        assert!(session.stage_sites.is_empty());
        assert!(session.artifact_at(ToolName::Terrain, &site).is_none());
        assert_eq!(session.latest_artifact(ToolName::Terrain).unwrap().location_ref, "new");
    }

    #[test]
    fn test_correlation_id_changes_with_incarnation() {
        let first = Session::new("s1", 60, t0());
        let recreated = Session::new("s1", 60, t0() + Duration::seconds(120));

        assert_eq!(first.request_seq, recreated.request_seq);
        assert_eq!(
            first.correlation_id(ToolName::Terrain),
            first.clone().correlation_id(ToolName::Terrain)
        );
        assert_ne!(
            first.correlation_id(ToolName::Terrain),
            recreated.correlation_id(ToolName::Terrain)
        );
    }
}
