//! # DandiClaw Core
//!
//! Domain types, traits, and error definitions for the DandiClaw metadata
//! agent. This crate defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! The completion backend and the tools are defined as traits here.
//! Implementations live in their respective crates, which keeps the agent
//! loop testable with scripted providers and in-memory documents.

pub mod conversation;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use conversation::{ConversationAction, ConversationState, UsageTotals};
pub use error::{AgentError, ProviderError, ToolError};
pub use message::{AssistantMessage, ChatMessage, MessageToolCall, Role, TurnStatus, TurnUsage};
pub use provider::{Completion, CompletionRequest, Provider, StreamChunk, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolContext, ToolOutput, ToolRegistry, parse_arguments};
