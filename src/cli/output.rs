//! Output formatting for command results
//!
//! JSON and YAML serialize the library types as they are. The human format
//! is a summary meant for a terminal.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::config::WindplanConfig;
use crate::pipeline::{PipelineFailure, PipelineResponse, StageOrigin, StageOutcome};
use crate::session::Session;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    /// Terminal summary
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_response(&self, response: &PipelineResponse) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(response)
                .context("Failed to serialize pipeline response to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(response)
                .context("Failed to serialize pipeline response to YAML"),
            OutputFormat::Human => Ok(self.format_response_human(response)),
        }
    }

    pub fn format_session(&self, session: &Session) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(session).context("Failed to serialize session to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(session).context("Failed to serialize session to YAML")
            }
            OutputFormat::Human => Ok(self.format_session_human(session)),
        }
    }

    pub fn format_config(&self, config: &WindplanConfig) -> Result<String> {
        let config_map: BTreeMap<String, String> = config.to_display_map().into_iter().collect();
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&config_map)
                .context("Failed to serialize config to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(&config_map).context("Failed to serialize config to YAML")
            }
            OutputFormat::Human => Ok(format!("{}\n{}", RULE, config)),
        }
    }

    fn format_response_human(&self, response: &PipelineResponse) -> String {
        let mut output = String::new();

        let symbol = if response.success { "\u{2713}" } else { "\u{2717}" };
        output.push_str(&format!("{} {}\n", symbol, response.message));
        output.push_str(RULE);
        output.push_str("\n\n");

        output.push_str(&format!("Session:   {}\n", response.session_id));
        output.push_str(&format!("State:     {}\n", response.state));
        if let Some(strategy) = response.strategy {
            output.push_str(&format!("Routed by: {}\n", strategy));
        }

        if !response.trace.is_empty() {
            output.push_str("\nStages:\n");
            let count = response.trace.len();
            for (i, stage) in response.trace.iter().enumerate() {
                let connector = if i + 1 == count { "\u{2514}" } else { "\u{251C}" };
                let mark = if stage.succeeded() { "\u{2713}" } else { "\u{2717}" };
                let attempts = stage.attempts.len();
                let mut notes = vec![format!(
                    "{} attempt{}",
                    attempts,
                    if attempts == 1 { "" } else { "s" }
                )];
                if stage.cached {
                    notes.push("cached".to_string());
                }
                if stage.origin == StageOrigin::Agent {
                    notes.push("agent".to_string());
                }
                output.push_str(&format!(
                    "{}\u{2500} {} {:<20} {:>6}ms  ({})\n",
                    connector,
                    mark,
                    stage.stage_name.display_name(),
                    stage.duration_ms,
                    notes.join(", ")
                ));
                if let StageOutcome::Failed { error } = &stage.outcome {
                    output.push_str(&format!("     {}\n", error));
                }
            }
        }

        if !response.artifacts.is_empty() {
            output.push_str("\nArtifacts:\n");
            for artifact in &response.artifacts {
                output.push_str(&format!(
                    "  - {}: {}\n",
                    artifact.artifact_type, artifact.location_ref
                ));
            }
        }

        if let Some(PipelineFailure::PipelineStageFailed { correlation_id, .. }) =
            &response.failure
        {
            output.push_str(&format!("\nCorrelation id: {}\n", correlation_id));
        }

        output
    }

    fn format_session_human(&self, session: &Session) -> String {
        let mut output = String::new();

        output.push_str(&format!("Session {}\n", session.session_id));
        output.push_str(RULE);
        output.push_str("\n\n");

        output.push_str(&format!("Updated:   {}\n", session.updated_at.to_rfc3339()));
        output.push_str(&format!("Expires:   {}\n", session.expires_at().to_rfc3339()));
        match &session.last_location {
            Some(location) => {
                output.push_str(&format!(
                    "Location:  {:.4}, {:.4}\n",
                    location.lat, location.lon
                ));
                if let Some(address) = &location.resolved_address {
                    output.push_str(&format!("           {}\n", address));
                }
            }
            None => output.push_str("Location:  (none)\n"),
        }
        output.push_str(&format!("Requests:  {}\n", session.request_seq));
        output.push_str(&format!(
            "Cancelled: {}\n",
            if session.cancelled { "yes" } else { "no" }
        ));

        output.push_str("\nStage Results:\n");
        if session.stage_results.is_empty() {
            output.push_str("  (none)\n");
        }
        for (stage, artifacts) in &session.stage_results {
            match session.stage_sites.get(stage) {
                Some(site) => output.push_str(&format!(
                    "  {} (at {:.4}, {:.4}):\n",
                    stage.display_name(),
                    site.lat,
                    site.lon
                )),
                None => output.push_str(&format!("  {}:\n", stage.display_name())),
            }
            for artifact in artifacts {
                output.push_str(&format!(
                    "    - {}: {}\n",
                    artifact.artifact_type, artifact.location_ref
                ));
            }
        }

        output
    }
}
