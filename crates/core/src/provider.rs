//! Provider trait: the abstraction over the completion gateway.
//!
//! A Provider knows how to send a conversation to a language model and get
//! a response back as a stream of chunks. [`Provider::send`] drains that
//! stream into a single [`Completion`], reporting the text as it grows.

use crate::error::ProviderError;
use crate::message::{ChatMessage, MessageToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Everything the gateway needs for one completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o", "anthropic/claude-sonnet-4")
    pub model: String,

    /// Instructions sent ahead of the history
    pub system_message: String,

    /// The conversation messages
    pub messages: Vec<ChatMessage>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Calling application, forwarded to the gateway for accounting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Fully accumulated tool calls (only on the final chunk)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A drained stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<MessageToolCall>,
    pub usage: Option<Usage>,
}

/// The core Provider trait.
///
/// The agent loop calls [`Provider::send`] without knowing which backend is
/// in use. Implementations only provide [`Provider::stream`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gateway").
    fn name(&self) -> &str;

    /// Send a request and get a stream of response chunks.
    ///
    /// The stream ends with a chunk whose `done` flag is set. A channel that
    /// closes without one means the response was cut short.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    >;

    /// Send a request and collect the full completion.
    ///
    /// `on_partial` receives the whole text accumulated so far every time it
    /// grows, so each call supersedes the previous one.
    async fn send(
        &self,
        request: CompletionRequest,
        on_partial: &mut (dyn for<'p> FnMut(&'p str) + Send),
    ) -> std::result::Result<Completion, ProviderError> {
        let mut rx = self.stream(request).await?;
        let mut completion = Completion::default();

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = chunk.content.filter(|c| !c.is_empty()) {
                completion.text.push_str(&delta);
                on_partial(&completion.text);
            }
            completion.tool_calls.extend(chunk.tool_calls);
            if chunk.usage.is_some() {
                completion.usage = chunk.usage;
            }
            if chunk.done {
                trace!(
                    provider = self.name(),
                    chars = completion.text.len(),
                    tool_calls = completion.tool_calls.len(),
                    "Stream complete"
                );
                return Ok(completion);
            }
        }

        Err(ProviderError::StreamInterrupted(
            "stream closed before the final chunk".into(),
        ))
    }
}
