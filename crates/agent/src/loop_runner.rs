//! The agent turn loop.
//!
//! One call to [`AgentLoop::run`] answers the latest user message. It sends
//! the conversation to the provider, runs any requested tools in order, and
//! repeats until a completion asks for no tools. A single cancellation token
//! covers the whole invocation.

use crate::event::AgentEvent;
use crate::prompt::build_system_prompt;
use crate::retry::RetryPolicy;
use dandiclaw_config::AgentSettings;
use dandiclaw_core::conversation::{ConversationAction, ConversationState};
use dandiclaw_core::error::AgentError;
use dandiclaw_core::message::{AssistantMessage, ChatMessage, MessageToolCall, TurnStatus, TurnUsage};
use dandiclaw_core::provider::{Completion, CompletionRequest, Provider, Usage};
use dandiclaw_core::tool::{ToolCall, ToolContext, ToolRegistry};
use dandiclaw_telemetry::PricingTable;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result text recorded for a tool call that never ran to completion.
pub const CANCELLED_TOOL_RESULT: &str = "Tool call cancelled";

/// How an invocation ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Aborted,
}

enum Interrupted {
    Cancelled { partial: String },
    Failed { error: AgentError, partial: String },
}

/// The core agent loop that orchestrates completions and tool execution.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    pricing: Arc<PricingTable>,
    retry: RetryPolicy,
    /// Completions per invocation before giving up
    max_turns: usize,
    app: Option<String>,
    temperature: Option<f32>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, pricing: Arc<PricingTable>) -> Self {
        Self {
            provider,
            tools,
            pricing,
            retry: RetryPolicy::default(),
            max_turns: 25,
            app: None,
            temperature: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    /// Application name forwarded to the gateway.
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Apply the `[agent]` config section.
    pub fn with_settings(self, settings: &AgentSettings) -> Self {
        self.with_retry_policy(RetryPolicy::from_settings(settings))
            .with_max_turns(settings.max_turns)
            .with_temperature(settings.temperature)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Answer the conversation's latest message.
    ///
    /// Every message produced along the way is appended to `state` as soon as
    /// it exists, so an aborted or failed run leaves its progress behind.
    /// Failures are also recorded as a failed assistant message before the
    /// error is returned.
    pub async fn run(
        &self,
        state: &mut ConversationState,
        ctx: &mut dyn ToolContext,
        events: &UnboundedSender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        close_dangling_tool_calls(state);

        let model = state.model().to_string();
        info!(model = %model, messages = state.len(), "Running agent");

        let mut spent = Usage::default();
        let mut turns = 0;

        while turns < self.max_turns {
            turns += 1;
            debug!(turn = turns, "Agent turn");

            let request = self.build_request(state, ctx.document());
            let completion = match self.complete(request, events, cancel).await {
                Ok(completion) => completion,
                Err(Interrupted::Cancelled { partial }) => {
                    if !partial.is_empty() {
                        state.apply(ConversationAction::Append(assistant_message(
                            partial,
                            None,
                            TurnStatus::Aborted,
                        )));
                    }
                    info!(turn = turns, "Turn cancelled during completion");
                    self.end(state, events, &model, spent, turns, TurnStatus::Aborted);
                    return Ok(TurnOutcome::Aborted);
                }
                Err(Interrupted::Failed { error, partial }) => {
                    return Err(self.fail(state, events, &model, spent, partial, error));
                }
            };

            if let Some(usage) = completion.usage {
                spent.prompt_tokens += usage.prompt_tokens;
                spent.completion_tokens += usage.completion_tokens;
            }

            // No tool calls: this is the final answer
            if completion.tool_calls.is_empty() {
                let usage = self.turn_usage(&model, spent);
                state.apply(ConversationAction::Append(assistant_message(
                    completion.text,
                    Some(usage),
                    TurnStatus::Complete,
                )));
                self.end(state, events, &model, spent, turns, TurnStatus::Complete);
                return Ok(TurnOutcome::Completed);
            }

            debug!(tool_count = completion.tool_calls.len(), "Executing tool calls");
            let calls = completion.tool_calls;
            state.apply(ConversationAction::Append(ChatMessage::assistant_with_tools(
                completion.text,
                calls.clone(),
            )));

            let mut follow_ups = Vec::new();
            for call in &calls {
                let Some((content, new_messages)) = self.execute_tool(call, ctx, events, cancel).await else {
                    close_dangling_tool_calls(state);
                    info!(tool = %call.name, "Turn cancelled during tool execution");
                    self.end(state, events, &model, spent, turns, TurnStatus::Aborted);
                    return Ok(TurnOutcome::Aborted);
                };
                state.apply(ConversationAction::Append(ChatMessage::tool_result(&call.id, content)));
                follow_ups.extend(new_messages);
            }
            // Tool results must directly follow the call message
            for message in follow_ups {
                state.apply(ConversationAction::Append(message));
            }
        }

        warn!(max_turns = self.max_turns, "Turn limit reached without a final answer");
        let error = AgentError::MaxTurnsExceeded {
            max_turns: self.max_turns,
        };
        Err(self.fail(state, events, &model, spent, String::new(), error))
    }

    fn build_request(&self, state: &ConversationState, document: &Value) -> CompletionRequest {
        CompletionRequest {
            model: state.model().to_string(),
            system_message: build_system_prompt(&self.tools, document),
            messages: state.messages().to_vec(),
            tools: self.tools.definitions(),
            app: self.app.clone(),
            temperature: self.temperature,
        }
    }

    /// One completion with backoff on transient failures.
    async fn complete(
        &self,
        request: CompletionRequest,
        events: &UnboundedSender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<Completion, Interrupted> {
        let mut attempt = 0;
        loop {
            let mut partial = String::new();
            let mut on_partial = |text: &str| {
                partial.clear();
                partial.push_str(text);
                let _ = events.send(AgentEvent::Partial {
                    content: text.to_string(),
                });
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.provider.send(request.clone(), &mut on_partial) => Some(result),
            };

            let error = match result {
                None => return Err(Interrupted::Cancelled { partial }),
                Some(Ok(completion)) => return Ok(completion),
                Some(Err(error)) => error,
            };

            if !error.is_retryable() {
                return Err(Interrupted::Failed {
                    error: AgentError::Provider(error),
                    partial,
                });
            }
            if !self.retry.should_retry(attempt) {
                return Err(Interrupted::Failed {
                    error: AgentError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: error,
                    },
                    partial,
                });
            }

            let delay = self.retry.delay(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Completion failed, backing off"
            );
            let reason = if error.is_rate_limit() {
                "Rate limited"
            } else {
                "Gateway unavailable"
            };
            let _ = events.send(AgentEvent::Notice {
                message: format!(
                    "{reason}; retrying in {:.1}s (attempt {} of {})",
                    delay.as_secs_f64(),
                    attempt + 2,
                    self.retry.max_retries + 1
                ),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Text the failed attempt streamed has already been shown
                    return Err(Interrupted::Cancelled { partial });
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Run one tool call. `None` means the call was cancelled.
    async fn execute_tool(
        &self,
        call: &MessageToolCall,
        ctx: &mut dyn ToolContext,
        events: &UnboundedSender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Option<(String, Vec<ChatMessage>)> {
        let arguments = match parse_call_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                let content = format!("Error: invalid JSON arguments: {e}");
                let _ = events.send(AgentEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    output: content.clone(),
                    success: false,
                });
                return Some((content, Vec::new()));
            }
        };

        let _ = events.send(AgentEvent::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            input: arguments.clone(),
        });

        let tool_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        };
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.tools.execute(&tool_call, &mut *ctx) => Some(result),
        }?;

        let (content, success, new_messages) = match result {
            Ok(output) => (output.result, output.success, output.new_messages),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (format!("Error: {e}"), false, Vec::new())
            }
        };
        debug!(tool = %call.name, success, "Tool executed");

        let _ = events.send(AgentEvent::ToolResult {
            id: call.id.clone(),
            name: call.name.clone(),
            output: content.clone(),
            success,
        });
        Some((content, new_messages))
    }

    fn turn_usage(&self, model: &str, spent: Usage) -> TurnUsage {
        TurnUsage {
            prompt_tokens: spent.prompt_tokens,
            completion_tokens: spent.completion_tokens,
            cost_usd: self
                .pricing
                .compute_cost(model, spent.prompt_tokens, spent.completion_tokens),
        }
    }

    fn end(
        &self,
        state: &mut ConversationState,
        events: &UnboundedSender<AgentEvent>,
        model: &str,
        spent: Usage,
        turns: usize,
        status: TurnStatus,
    ) {
        let usage = self.turn_usage(model, spent);
        state.apply(ConversationAction::IncrementUsage(usage));
        let _ = events.send(AgentEvent::Done {
            status,
            turns,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost_usd: usage.cost_usd,
        });
    }

    fn fail(
        &self,
        state: &mut ConversationState,
        events: &UnboundedSender<AgentEvent>,
        model: &str,
        spent: Usage,
        partial: String,
        error: AgentError,
    ) -> AgentError {
        warn!(error = %error, "Agent invocation failed");
        let content = if partial.is_empty() {
            format!("Error: {error}")
        } else {
            format!("{partial}\n\nError: {error}")
        };
        state.apply(ConversationAction::Append(assistant_message(
            content,
            None,
            TurnStatus::Failed,
        )));
        state.apply(ConversationAction::IncrementUsage(self.turn_usage(model, spent)));
        let _ = events.send(AgentEvent::Error {
            message: error.to_string(),
        });
        error
    }
}

/// Answer every tool call in `state` that has no result yet.
///
/// Returns how many results were added.
pub fn close_dangling_tool_calls(state: &mut ConversationState) -> usize {
    let dangling = state.unanswered_tool_calls();
    for call in &dangling {
        debug!(call_id = %call.id, tool = %call.name, "Closing dangling tool call");
        state.apply(ConversationAction::Append(ChatMessage::tool_result(
            &call.id,
            CANCELLED_TOOL_RESULT,
        )));
    }
    dangling.len()
}

fn assistant_message(content: String, usage: Option<TurnUsage>, status: TurnStatus) -> ChatMessage {
    ChatMessage::Assistant(AssistantMessage {
        content,
        tool_calls: Vec::new(),
        usage,
        status,
    })
}

fn parse_call_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}
