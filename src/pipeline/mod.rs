pub mod config;
pub mod coordinator;
pub mod error;
pub mod state;
pub mod trace;
pub mod types;

pub use config::CoordinatorConfig;
pub use coordinator::{request_cancel, PipelineCoordinator};
pub use error::CoordinatorError;
pub use state::ExecutionState;
pub use trace::{
    ExecutionRecord, JsonlTraceSink, MemoryTraceSink, NoOpTraceSink, StageOrigin, StageOutcome,
    StageTrace, TraceSink,
};
pub use types::{InboundRequest, PipelineFailure, PipelineResponse};
