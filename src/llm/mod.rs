//! LLM driver trait, chat-completions driver and the tool-calling agent.
//!
//! # Overview
//!
//! The [`LlmDriver`] trait defines the streaming interface to a model API.
//! [`Agent`] builds on a driver to run the tool loop: it offers the MCP
//! tools to the model, executes the calls the model makes, and feeds the
//! results back until a final answer arrives.
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_multiserver_chat::llm::{Agent, LlmSettings};
//!
//! let agent = Agent::new(settings, tools);
//! let response = agent.invoke("What time is it in Tokyo?").await?;
//! ```

pub mod agent;
pub mod chat_completions;
pub mod provider;
pub mod retry;

pub use agent::{Agent, ChatAgent};
pub use chat_completions::ChatCompletionsDriver;
pub use provider::Provider;
pub use retry::{ApiError, RetryConfig};

use crate::normalized::NormalizedEvent;
use futures::Stream;

/// LLM connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API.
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gemini-2.0-flash`).
    pub model: String,
    /// Sampling temperature; 0 for deterministic output.
    pub temperature: f32,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
    /// Retry policy for transient API failures.
    pub retry: RetryConfig,
    /// Upper bound on model round-trips per query.
    pub max_tool_iterations: usize,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("provider", &self.provider)
            .field("retry", &self.retry)
            .field("max_tool_iterations", &self.max_tool_iterations)
            .finish()
    }
}

/// A tool call made by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// Type of tool (always "function" for now).
    #[serde(rename = "type")]
    pub call_type: String,
    /// Function details.
    pub function: ToolCallFunction,
}

/// Function details in a tool call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ToolCallFunction {
    /// Function name.
    pub name: String,
    /// Arguments as JSON string.
    pub arguments: String,
}

/// Request to an LLM driver.
#[derive(Debug)]
pub struct LlmRequest {
    /// Conversation messages.
    pub messages: Vec<serde_json::Value>,
    /// Available tools in `OpenAI` function schema format.
    pub tools: Vec<serde_json::Value>,
}

/// Boxed stream of driver events.
pub type EventStream =
    std::pin::Pin<Box<dyn Stream<Item = anyhow::Result<NormalizedEvent>> + Send>>;

/// Trait for LLM streaming drivers.
///
/// Implementations of this trait provide streaming access to LLM responses,
/// emitting [`NormalizedEvent`]s as the model generates output.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Stream a response from the LLM.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the
    /// connection is interrupted.
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream>;
}
