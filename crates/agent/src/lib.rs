//! The agent loop for DandiClaw.
//!
//! One invocation follows a **send → act → observe** cycle:
//!
//! 1. **Build the request**: system prompt (with the current document),
//!    full history and tool declarations
//! 2. **Send** it through the provider, backing off on rate limits
//! 3. **If tool calls**: run them in order, append results, loop back to 2
//! 4. **If text only**: append it as the final answer with usage and cost
//!
//! The loop stops at the turn cap, on a non-retryable error, or when the
//! cancellation token fires.

pub mod event;
pub mod loop_runner;
pub mod prompt;
pub mod retry;

#[cfg(test)]
mod test_helpers;

pub use event::AgentEvent;
pub use loop_runner::{AgentLoop, CANCELLED_TOOL_RESULT, TurnOutcome, close_dangling_tool_calls};
pub use prompt::build_system_prompt;
pub use retry::RetryPolicy;
