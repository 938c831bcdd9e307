//! Chat message domain types.
//!
//! A conversation alternates user input, assistant replies (optionally
//! requesting tool calls), and tool results answering those calls.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    User { content: String },
    Assistant(AssistantMessage),
    Tool { tool_call_id: String, content: String },
}

/// The assistant side of a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Usage accumulated across the turn, set on the final reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TurnUsage>,

    #[serde(default, skip_serializing_if = "TurnStatus::is_complete")]
    pub status: TurnStatus,
}

/// How the turn that produced an assistant message ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    #[default]
    Complete,
    /// Cancelled by the user; content is whatever had streamed so far.
    Aborted,
    /// Ended by an unrecoverable error.
    Failed,
}

impl TurnStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, TurnStatus::Complete)
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

/// Token usage and cost for one user turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

impl TurnUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl ChatMessage {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: content.into(),
        }
    }

    /// Create a plain assistant reply.
    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant(AssistantMessage {
            content: content.into(),
            ..Default::default()
        })
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<MessageToolCall>) -> Self {
        ChatMessage::Assistant(AssistantMessage {
            content: content.into(),
            tool_calls,
            ..Default::default()
        })
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            ChatMessage::User { .. } => Role::User,
            ChatMessage::Assistant(_) => Role::Assistant,
            ChatMessage::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ChatMessage::User { content } | ChatMessage::Tool { content, .. } => content,
            ChatMessage::Assistant(assistant) => &assistant.content,
        }
    }

    /// Tool calls requested by this message (empty unless assistant).
    pub fn tool_calls(&self) -> &[MessageToolCall] {
        match self {
            ChatMessage::Assistant(assistant) => &assistant.tool_calls,
            _ => &[],
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            ChatMessage::Assistant(assistant) => Some(assistant),
            _ => None,
        }
    }
}
