//! Conversation state and the actions that mutate it.
//!
//! The state is only changed through [`ConversationAction`]s, so every
//! mutation (including the ones the agent loop performs) goes through one
//! reducer.

use crate::message::{ChatMessage, MessageToolCall, TurnUsage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Cumulative usage across the whole conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

impl UsageTotals {
    pub fn add(&mut self, usage: &TurnUsage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.cost_usd += usage.cost_usd;
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationAction {
    Append(ChatMessage),
    SetModel(String),
    IncrementUsage(TurnUsage),
    /// Drop every message and reset usage. The model selection survives.
    Clear,
    /// Keep messages `0..=index` and drop the rest.
    RevertToIndex(usize),
    /// Collapse the history into a single summary message.
    ReplaceWithSummary(String),
}

/// The ordered message log plus usage and the selected model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    usage: UsageTotals,
    model: String,
}

impl ConversationState {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            usage: UsageTotals::default(),
            model: model.into(),
        }
    }

    /// Apply one action in place.
    pub fn apply(&mut self, action: ConversationAction) {
        match action {
            ConversationAction::Append(message) => self.messages.push(message),
            ConversationAction::SetModel(model) => self.model = model,
            ConversationAction::IncrementUsage(usage) => self.usage.add(&usage),
            ConversationAction::Clear => {
                self.messages.clear();
                self.usage = UsageTotals::default();
            }
            ConversationAction::RevertToIndex(index) => {
                if index < self.messages.len() {
                    debug!(index, dropped = self.messages.len() - index - 1, "Reverting conversation");
                    self.messages.truncate(index + 1);
                }
            }
            ConversationAction::ReplaceWithSummary(summary) => {
                self.messages = vec![ChatMessage::user(summary)];
            }
        }
    }

    /// Reducer form of [`ConversationState::apply`].
    pub fn reduce(mut self, action: ConversationAction) -> Self {
        self.apply(action);
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn usage(&self) -> &UsageTotals {
        &self.usage
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tool calls that have no result message yet.
    ///
    /// The history must contain none of these before it is replayed to the
    /// completion endpoint.
    pub fn unanswered_tool_calls(&self) -> Vec<MessageToolCall> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .filter_map(|m| match m {
                ChatMessage::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();

        self.messages
            .iter()
            .flat_map(|m| m.tool_calls())
            .filter(|call| !answered.contains(call.id.as_str()))
            .cloned()
            .collect()
    }
}
