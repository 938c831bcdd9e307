//! Shared test helpers for agent tests.

use async_trait::async_trait;
use dandiclaw_core::error::ProviderError;
use dandiclaw_core::message::MessageToolCall;
use dandiclaw_core::provider::{CompletionRequest, Provider, StreamChunk, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One scripted reaction to a completion request.
pub enum Script {
    /// `stream()` fails outright.
    Fail(ProviderError),
    /// The chunks are delivered and the stream ends.
    Reply(Vec<StreamChunk>),
    /// The chunks are delivered, then the stream never finishes.
    Stall(Vec<StreamChunk>),
}

/// A mock provider that answers each request with the next script.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();

        let (tx, rx) = mpsc::channel(16);
        match script {
            None => return Err(ProviderError::MalformedResponse("script exhausted".into())),
            Some(Script::Fail(e)) => return Err(e),
            Some(Script::Reply(chunks)) => {
                for chunk in chunks {
                    tx.send(Ok(chunk)).await.unwrap();
                }
            }
            Some(Script::Stall(chunks)) => {
                for chunk in chunks {
                    tx.send(Ok(chunk)).await.unwrap();
                }
                tokio::spawn(async move { tx.closed().await });
            }
        }
        Ok(rx)
    }
}

pub fn text_chunk(text: &str) -> StreamChunk {
    StreamChunk {
        content: Some(text.into()),
        ..Default::default()
    }
}

pub fn done_chunk(tool_calls: Vec<MessageToolCall>, prompt_tokens: u64, completion_tokens: u64) -> StreamChunk {
    StreamChunk {
        done: true,
        tool_calls,
        usage: Some(Usage {
            prompt_tokens,
            completion_tokens,
        }),
        ..Default::default()
    }
}

/// A final text answer.
pub fn text_reply(text: &str) -> Script {
    Script::Reply(vec![text_chunk(text), done_chunk(vec![], 1000, 100)])
}

/// A reply that only requests tools.
pub fn tool_reply(calls: Vec<MessageToolCall>) -> Script {
    Script::Reply(vec![done_chunk(calls, 1000, 100)])
}

pub fn rate_limited() -> Script {
    Script::Fail(ProviderError::RateLimited {
        message: "Too Many Requests".into(),
    })
}

pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: args.to_string(),
    }
}
