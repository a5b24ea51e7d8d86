//! Execution traces
//!
//! One [`ExecutionRecord`] per inbound request, written to a [`TraceSink`]
//! after the request finishes. Retry counts and backoff delays live here, not
//! in the user-facing message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::state::ExecutionState;
use crate::error::ToolError;
use crate::router::{AbortReason, AgentAttempt, RouteStrategy};
use crate::tools::{AttemptRecord, CorrelationId, ToolCallResult, ToolName};

/// Who issued the stage call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOrigin {
    Plan,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Failed { error: ToolError },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTrace {
    pub stage_name: ToolName,
    pub duration_ms: u64,
    pub outcome: StageOutcome,
    pub origin: StageOrigin,
    pub correlation_id: CorrelationId,
    pub attempts: Vec<AttemptRecord>,
    #[serde(default)]
    pub cached: bool,
}

impl StageTrace {
    pub fn from_result(result: &ToolCallResult, origin: StageOrigin, duration_ms: u64) -> Self {
        let outcome = if result.success {
            StageOutcome::Succeeded
        } else {
            StageOutcome::Failed {
                error: result
                    .error
                    .clone()
                    .unwrap_or_else(|| ToolError::terminal("stage failed without detail")),
            }
        };
        Self {
            stage_name: result.tool,
            duration_ms,
            outcome,
            origin,
            correlation_id: result.correlation_id.clone(),
            attempts: result.attempts.clone(),
            cached: result.cached,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == StageOutcome::Succeeded
    }
}

/// Everything recorded about one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub session_id: String,
    pub request_seq: u64,
    pub utterance: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub state: ExecutionState,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RouteStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_abort: Option<AbortReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_attempts: Vec<AgentAttempt>,
    pub stages: Vec<StageTrace>,
}

pub trait TraceSink: Send + Sync {
    fn record(&self, record: &ExecutionRecord);
}

/// Discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTraceSink;

impl TraceSink for NoOpTraceSink {
    fn record(&self, _record: &ExecutionRecord) {}
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<ExecutionRecord> {
        self.records.lock().ok().and_then(|r| r.last().cloned())
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, record: &ExecutionRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Appends one JSON line per execution for offline replay
///
/// Write failures are logged and otherwise ignored; a request never fails
/// because its trace could not be stored.
pub struct JsonlTraceSink {
    path: PathBuf,
    writer: Option<Arc<Mutex<BufWriter<File>>>>,
}

impl JsonlTraceSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let writer = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(Arc::new(Mutex::new(BufWriter::new(file)))),
            Err(e) => {
                warn!("Failed to open trace file {:?}: {}", path, e);
                None
            }
        };
        Self { path, writer }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, record: &ExecutionRecord) {
        let Some(writer) = &self.writer else {
            return;
        };

        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                warn!(
                    "Failed to serialize trace for session {}: {}",
                    record.session_id, e
                );
                return;
            }
        };

        if let Ok(mut writer) = writer.lock() {
            if let Err(e) = writeln!(writer, "{}", json) {
                warn!("Failed to write trace entry: {}", e);
            }
            if let Err(e) = writer.flush() {
                warn!("Failed to flush trace file: {}", e);
            }
        }

        debug!(
            session = %record.session_id,
            stages = record.stages.len(),
            "Trace recorded"
        );
    }
}
