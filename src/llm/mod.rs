//! Agent backend abstraction
//!
//! A trait-based seam for chat completion with tool calling, so the agent
//! routing strategy can run against a real provider or a scripted mock.

mod client;
mod error;
mod genai;
mod mock;
mod types;

pub use client::LLMClient;
pub use error::BackendError;
pub use self::genai::GenAIClient;
pub use mock::{MockLLMClient, MockResponse};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole, ToolCall, ToolDefinition};
