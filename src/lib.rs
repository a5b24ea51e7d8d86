//! windplan - workflow orchestrator for wind-farm siting analysis
//!
//! A natural-language request ("Analyze terrain at 35.0, -101.0 and optimize
//! the layout") is routed to an ordered plan of stages, each served by an
//! independent worker. Stages run one after another, every successful stage
//! is merged into a per-session context, and follow-up requests reuse that
//! context.
//!
//! # Core Concepts
//!
//! - **Router**: a deterministic keyword strategy, optionally preceded by an
//!   LLM agent strategy with a bounded attempt budget. When the agent aborts
//!   the deterministic strategy runs exactly once.
//! - **Invocation client**: calls a worker with bounded retries on transient
//!   failures and records every attempt under a shared correlation id.
//! - **Session store**: merge-upsert of per-session context with a TTL.
//! - **Coordinator**: runs a plan as a state machine and returns partial
//!   artifacts when a stage fails.
//!
//! # Example Usage
//!
//! ```ignore
//! use windplan::{InboundRequest, WindplanConfig};
//! use windplan::progress::LoggingHandler;
//! use std::sync::Arc;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = WindplanConfig::default();
//!     config.validate()?;
//!     let coordinator = config.build_coordinator(Arc::new(LoggingHandler))?;
//!
//!     let response = coordinator
//!         .handle(InboundRequest::new("s1", "Analyze terrain at 35.0, -101.0"))
//!         .await?;
//!     println!("{}", response.message);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod router;
pub mod session;
pub mod tools;
pub mod util;

pub use config::{ConfigError, WindplanConfig};
pub use error::{ErrorKind, ToolError};
pub use llm::{BackendError, GenAIClient, LLMClient};
pub use pipeline::{
    CoordinatorError, ExecutionState, InboundRequest, PipelineCoordinator, PipelineFailure,
    PipelineResponse,
};
pub use router::{IntentRouter, PipelinePlan, RouteStrategy, RouterError, SlotValues};
pub use session::{FileSessionStore, InMemorySessionStore, Session, SessionError, SessionStore};
pub use tools::{ArtifactRef, CorrelationId, ToolCallResult, ToolInvocationClient, ToolName};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
