//! Progress handler trait and events

use std::time::Duration;

use crate::error::ErrorKind;
use crate::tools::ToolName;

/// Events emitted while a request moves through routing and the pipeline
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Request accepted for a session
    RequestStarted { session_id: String },

    /// Agent request started
    AgentAttemptStarted { attempt: u32 },

    /// Agent response received
    AgentResponseReceived {
        attempt: u32,
        tool_calls: usize,
        response_time: Duration,
    },

    /// Agent strategy gave up and the deterministic strategy takes over
    AgentFallback { reason: String },

    /// Intent resolved into a plan
    IntentResolved {
        strategy: String,
        stages: Vec<ToolName>,
    },

    /// Stage started
    StageStarted {
        stage: ToolName,
        index: usize,
        total: usize,
    },

    /// A single worker attempt failed
    AttemptFailed {
        tool: ToolName,
        attempt: u32,
        kind: ErrorKind,
        backoff: Option<Duration>,
    },

    /// Stage finished, successfully or not
    StageComplete {
        stage: ToolName,
        duration: Duration,
        attempts: u32,
        success: bool,
    },

    /// Cancellation observed before `stage` started
    Cancelled { before_stage: ToolName },

    /// Every planned stage completed
    Completed { stages: usize, total_time: Duration },

    /// Request failed
    Failed { error: String },
}

/// Trait for handling progress events
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        let handler = NoOpHandler;
        handler.on_progress(&ProgressEvent::RequestStarted {
            session_id: "s1".to_string(),
        });
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::RequestStarted {
            session_id: "s1".to_string(),
        });
        handler.on_progress(&ProgressEvent::StageStarted {
            stage: ToolName::Terrain,
            index: 0,
            total: 1,
        });
        handler.on_progress(&ProgressEvent::Completed {
            stages: 1,
            total_time: Duration::from_secs(5),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::AgentAttemptStarted { attempt: 1 };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("AgentAttemptStarted"));
        assert!(debug_str.contains("attempt: 1"));
    }
}
