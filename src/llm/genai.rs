//! GenAI-based agent backend
//!
//! Uses the `genai` crate so that any of its providers (Ollama, OpenAI,
//! Anthropic, Gemini, xAI, Groq) can drive the agent strategy. Credentials and
//! endpoints come from the provider's standard environment variables.

use super::client::LLMClient;
use super::error::BackendError;
use super::types::{ChatMessage, LLMRequest, LLMResponse, MessageRole, ToolCall, ToolDefinition};
use async_trait::async_trait;
use genai::adapter::AdapterKind;
use genai::chat::{
    ChatMessage as GenAIChatMessage, ChatOptions, ChatRequest as GenAIChatRequest, MessageContent,
    Tool as GenAITool, ToolResponse,
};
use genai::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error};

pub struct GenAIClient {
    client: Client,
    model: String,
    provider: AdapterKind,
    timeout: Duration,
}

impl GenAIClient {
    pub fn new(provider: AdapterKind, model: impl Into<String>, timeout: Duration) -> Self {
        let model = model.into();
        debug!(
            "Creating GenAI client: provider={}, model={}",
            provider.as_str(),
            model
        );

        Self {
            client: Client::default(),
            model,
            provider,
            timeout,
        }
    }

    /// Parses a provider name as accepted in configuration
    pub fn parse_provider(name: &str) -> Result<AdapterKind, BackendError> {
        match name.trim().to_lowercase().as_str() {
            "ollama" => Ok(AdapterKind::Ollama),
            "openai" => Ok(AdapterKind::OpenAI),
            "claude" | "anthropic" => Ok(AdapterKind::Anthropic),
            "gemini" => Ok(AdapterKind::Gemini),
            "grok" | "xai" => Ok(AdapterKind::Xai),
            "groq" => Ok(AdapterKind::Groq),
            other => Err(BackendError::ConfigurationError {
                message: format!(
                    "unknown provider '{}'. \
                     Valid options: ollama, openai, claude, gemini, grok, groq",
                    other
                ),
            }),
        }
    }

    fn convert_message(msg: &ChatMessage) -> Result<GenAIChatMessage, BackendError> {
        let converted = match msg.role {
            MessageRole::System => GenAIChatMessage::system(&msg.content),
            MessageRole::User => GenAIChatMessage::user(&msg.content),
            MessageRole::Assistant => match &msg.tool_calls {
                Some(tool_calls) if !tool_calls.is_empty() => {
                    let calls = tool_calls
                        .iter()
                        .map(Self::convert_tool_call)
                        .collect::<Result<Vec<_>, _>>()?;
                    GenAIChatMessage::assistant(MessageContent::from_tool_calls(calls))
                }
                _ => GenAIChatMessage::assistant(&msg.content),
            },
            MessageRole::Tool => ToolResponse::new(
                msg.tool_call_id.clone().unwrap_or_default(),
                msg.content.clone(),
            )
            .into(),
        };
        Ok(converted)
    }

    fn convert_tool_call(call: &ToolCall) -> Result<genai::chat::ToolCall, BackendError> {
        serde_json::from_value(serde_json::json!({
            "call_id": call.call_id,
            "fn_name": call.name,
            "fn_arguments": call.arguments,
        }))
        .map_err(|e| BackendError::InvalidResponse {
            message: format!("cannot replay tool call {}: {}", call.call_id, e),
        })
    }

    fn convert_tool(tool: &ToolDefinition) -> GenAITool {
        GenAITool::new(&tool.name)
            .with_description(&tool.description)
            .with_schema(tool.parameters.clone())
    }
}

#[async_trait]
impl LLMClient for GenAIClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let start = Instant::now();

        let messages = request
            .messages
            .iter()
            .map(Self::convert_message)
            .collect::<Result<Vec<_>, _>>()?;
        let tools: Vec<GenAITool> = request.tools.iter().map(Self::convert_tool).collect();

        let genai_request = GenAIChatRequest::new(messages).with_tools(tools);

        let mut options = ChatOptions::default();
        if let Some(temp) = request.temperature {
            options = options.with_temperature(temp as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }

        let response = match tokio::time::timeout(
            self.timeout,
            self.client
                .exec_chat(&self.model, genai_request, Some(&options)),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!("{} API error: {}", self.provider.as_str(), e);
                return Err(BackendError::ApiError {
                    message: format!("{} request failed: {}", self.provider.as_str(), e),
                    status_code: None,
                });
            }
            Err(_) => {
                error!(
                    "{} request timed out after {}s",
                    self.provider.as_str(),
                    self.timeout.as_secs()
                );
                return Err(BackendError::TimeoutError {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let content = response.first_text().unwrap_or_default().to_string();
        let tool_calls: Vec<ToolCall> = response
            .tool_calls()
            .into_iter()
            .map(|tc| {
                ToolCall::new(tc.call_id.clone(), tc.fn_name.clone(), tc.fn_arguments.clone())
            })
            .collect();

        Ok(LLMResponse::with_tool_calls(
            content,
            tool_calls,
            start.elapsed(),
        ))
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }

    fn model_info(&self) -> Option<String> {
        Some(self.model.clone())
    }
}

impl std::fmt::Debug for GenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAIClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genai_client_creation() {
        let client =
            GenAIClient::new(AdapterKind::Ollama, "qwen2.5-coder:7b", Duration::from_secs(30));

        assert_eq!(client.name(), "Ollama");
        assert_eq!(client.model_info(), Some("qwen2.5-coder:7b".to_string()));
    }

    #[test]
    fn test_parse_provider() {
        assert_eq!(GenAIClient::parse_provider("ollama").unwrap(), AdapterKind::Ollama);
        assert_eq!(GenAIClient::parse_provider("Claude").unwrap(), AdapterKind::Anthropic);
        assert_eq!(GenAIClient::parse_provider("grok").unwrap(), AdapterKind::Xai);
        assert!(GenAIClient::parse_provider("watson").is_err());
    }

    #[test]
    fn test_tool_call_conversion() {
        let call = ToolCall::new("c1", "analyze_terrain", serde_json::json!({"latitude": 1.0}));
        let converted = GenAIClient::convert_tool_call(&call).unwrap();
        assert_eq!(converted.call_id, "c1");
        assert_eq!(converted.fn_name, "analyze_terrain");
    }
}
