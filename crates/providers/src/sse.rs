//! Incremental decoder for the gateway's server-sent event stream.
//!
//! Bytes go in as they arrive from the network; [`StreamChunk`]s come out.
//! Text deltas are emitted immediately. Tool-call fragments are accumulated
//! by index and only handed out, fully assembled, on the final chunk.
//!
//! The decoder is independent of the HTTP client so it can be driven from
//! tests byte by byte.

use dandiclaw_core::error::ProviderError;
use dandiclaw_core::message::MessageToolCall;
use dandiclaw_core::provider::{StreamChunk, Usage};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::trace;

/// Result of feeding bytes into the decoder.
pub type Decoded = Vec<Result<StreamChunk, ProviderError>>;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    usage: Option<Usage>,
    saw_data: bool,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the final chunk has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed raw bytes. Lines split across calls are reassembled, including
    /// multi-byte characters split at a chunk boundary.
    pub fn feed(&mut self, bytes: &[u8]) -> Decoded {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            self.process_line(&line, &mut out);
            if self.finished {
                self.buffer.clear();
                break;
            }
        }
        out
    }

    /// Signal end of input. Flushes a trailing unterminated line and returns
    /// the final chunk if `[DONE]` was never seen.
    pub fn finish(&mut self) -> Decoded {
        let mut out = Vec::new();
        if !self.finished && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line, &mut out);
        }
        if !self.finished {
            if self.saw_data {
                out.push(Ok(self.final_chunk()));
            } else {
                self.finished = true;
                out.push(Err(ProviderError::MalformedResponse(
                    "response body contained no events".into(),
                )));
            }
        }
        out
    }

    fn process_line(&mut self, raw: &[u8], out: &mut Decoded) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);

        // Skip blank separators and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            // `event:`, `id:` and `retry:` fields carry nothing we use
            return;
        };
        let data = data.trim();
        self.saw_data = true;

        if data == "[DONE]" {
            out.push(Ok(self.final_chunk()));
            return;
        }

        let event: StreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return;
            }
        };

        if let Some(error) = event.error {
            self.finished = true;
            out.push(Err(classify_stream_error(&error.message())));
            return;
        }

        if let Some(usage) = event.usage {
            self.usage = Some(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            });
        }

        let Some(choice) = event.choices.into_iter().next() else {
            return;
        };

        for fragment in choice.delta.tool_calls.unwrap_or_default() {
            let acc = self.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                acc.id = id;
            }
            if let Some(function) = fragment.function {
                if let Some(name) = function.name {
                    acc.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    acc.arguments.push_str(&arguments);
                }
            }
        }

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            out.push(Ok(StreamChunk {
                content: Some(content),
                ..Default::default()
            }));
        }
    }

    fn final_chunk(&mut self) -> StreamChunk {
        self.finished = true;
        let tool_calls = std::mem::take(&mut self.tool_calls)
            .into_values()
            .filter(|acc| !acc.name.is_empty())
            .map(ToolCallAccumulator::into_tool_call)
            .collect();
        StreamChunk {
            content: None,
            tool_calls,
            done: true,
            usage: self.usage,
        }
    }
}

/// Map an error message from the gateway to a [`ProviderError`].
///
/// Rate limiting is recognized by phrase because some upstreams report it in
/// the body of an otherwise generic error.
pub fn classify_stream_error(message: &str) -> ProviderError {
    if mentions_rate_limit(message) {
        ProviderError::RateLimited {
            message: message.to_string(),
        }
    } else {
        ProviderError::StreamInterrupted(message.to_string())
    }
}

pub(crate) fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("too many requests")
}

/// Accumulates streaming tool call fragments into a complete call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self) -> MessageToolCall {
        let id = if self.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            self.id
        };
        let arguments = if self.arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            self.arguments
        };
        MessageToolCall {
            id,
            name: self.name,
            arguments,
        }
    }
}

// --- Wire types ---

/// A single `data: {...}` payload.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta, arriving incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamErrorBody {
    Text(String),
    Object {
        #[serde(default)]
        message: String,
    },
}

impl StreamErrorBody {
    fn message(&self) -> String {
        match self {
            StreamErrorBody::Text(s) => s.clone(),
            StreamErrorBody::Object { message } => message.clone(),
        }
    }
}
