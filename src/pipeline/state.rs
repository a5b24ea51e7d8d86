//! Per-execution state machine
//!
//! `Planning -> StageRunning(0) -> ... -> StageRunning(n-1) -> Completed`,
//! leaving early through `Failed(i)`, `Cancelled(i)` or, before any stage,
//! `Rejected`. Stage indices are zero-based.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum ExecutionState {
    Planning,
    StageRunning(usize),
    Completed,
    /// Stage `i` failed; nothing after it ran
    Failed(usize),
    /// Planning failed or asked for clarification; no worker was invoked
    Rejected,
    /// Cancellation observed before stage `i` started
    Cancelled(usize),
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionState::Planning | ExecutionState::StageRunning(_))
    }

    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        match (*self, next) {
            (Planning, StageRunning(0)) => true,
            (Planning, Rejected) | (Planning, Completed) => true,
            (Planning, Cancelled(0)) => true,
            (StageRunning(i), StageRunning(j)) => j == i + 1,
            (StageRunning(i), Failed(j)) => i == j,
            (StageRunning(i), Cancelled(j)) => j == i + 1,
            (StageRunning(_), Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Planning => write!(f, "planning"),
            ExecutionState::StageRunning(i) => write!(f, "stage_running({})", i),
            ExecutionState::Completed => write!(f, "completed"),
            ExecutionState::Failed(i) => write!(f, "failed({})", i),
            ExecutionState::Rejected => write!(f, "rejected"),
            ExecutionState::Cancelled(i) => write!(f, "cancelled({})", i),
        }
    }
}
