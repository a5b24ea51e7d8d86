pub mod cache;
pub mod client;
pub mod http;
pub mod mock;
pub mod registry;
pub mod retry;
pub mod types;
pub mod worker;

pub use cache::ResultCache;
pub use client::{ToolExecutor, ToolInvocationClient};
pub use http::HttpWorker;
pub use mock::{MockOutcome, MockWorker};
pub use registry::WorkerRegistry;
pub use retry::{RetryPolicy, RetryState};
pub use types::{
    ArtifactRef, AttemptOutcome, AttemptRecord, CorrelationId, LayoutParams, ReportParams,
    SimulationParams, TerrainParams, ToolCallRequest, ToolCallResult, ToolName, ToolParams,
};
pub use worker::{Worker, WorkerRequest, WorkerResponse};
