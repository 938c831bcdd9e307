//! Agent-level progress events.
//!
//! `AgentEvent` is what a front end listens to while a turn runs. Partial
//! text, backoff notices and tool activity arrive here as they happen; the
//! conversation state only changes at message boundaries.

use dandiclaw_core::message::TurnStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The response text so far. Each event supersedes the previous one.
    Partial { content: String },

    /// Something the user should know while waiting, such as a backoff.
    Notice { message: String },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The invocation ended.
    Done {
        status: TurnStatus,
        turns: usize,
        prompt_tokens: u64,
        completion_tokens: u64,
        cost_usd: f64,
    },

    /// The invocation failed.
    Error { message: String },
}

impl AgentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Partial { .. } => "partial",
            Self::Notice { .. } => "notice",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = AgentEvent::Partial {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"partial""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn done_carries_status() {
        let event = AgentEvent::Done {
            status: TurnStatus::Aborted,
            turns: 2,
            prompt_tokens: 10,
            completion_tokens: 5,
            cost_usd: 0.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["status"], "aborted");
        assert_eq!(event.event_type(), "done");
    }
}
