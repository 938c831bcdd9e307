//! Completion gateway provider.
//!
//! The gateway accepts `POST {url}` with
//! `{model, systemMessage, messages, tools, app}` and answers with an
//! OpenAI-style server-sent event stream.

use crate::sse::{SseDecoder, mentions_rate_limit};
use async_trait::async_trait;
use dandiclaw_config::AppConfig;
use dandiclaw_core::error::ProviderError;
use dandiclaw_core::message::ChatMessage;
use dandiclaw_core::provider::{CompletionRequest, Provider, StreamChunk, ToolDefinition};
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Streams completions from the gateway.
pub struct GatewayProvider {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GatewayProvider {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            api_key,
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        Self::new(
            config.gateway.url.clone(),
            config.effective_api_key().map(str::to_string),
            Duration::from_secs(config.gateway.timeout_secs),
        )
    }

    fn request_body(request: &CompletionRequest) -> GatewayRequest<'_> {
        GatewayRequest {
            model: &request.model,
            system_message: &request.system_message,
            messages: to_api_messages(&request.messages),
            tools: to_api_tools(&request.tools),
            app: request.app.as_deref(),
            temperature: request.temperature,
            stream: true,
        }
    }
}

#[async_trait]
impl Provider for GatewayProvider {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let body = Self::request_body(&request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let mut builder = self
            .client
            .post(&self.url)
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gateway returned error");
            return Err(classify_status(status, error_body));
        }

        let (tx, rx) = mpsc::channel(64);

        // Spawn task to read the SSE byte stream and decode chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            loop {
                let next = tokio::select! {
                    // Receiver dropped: stop reading and close the connection
                    _ = tx.closed() => return,
                    next = byte_stream.next() => next,
                };

                let decoded = match next {
                    Some(Ok(bytes)) => decoder.feed(&bytes),
                    Some(Err(e)) => {
                        let _ = tx.send(Err(map_transport_error(e))).await;
                        return;
                    }
                    None => decoder.finish(),
                };

                for item in decoded {
                    if tx.send(item).await.is_err() {
                        return; // receiver dropped
                    }
                }
                if decoder.is_finished() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

/// Map a non-2xx status and its body to a [`ProviderError`].
pub fn classify_status(status: u16, body: String) -> ProviderError {
    if status == 429 || mentions_rate_limit(&body) {
        return ProviderError::RateLimited { message: body };
    }
    match status {
        401 | 403 => ProviderError::AuthenticationFailed(if body.is_empty() {
            "Invalid API key or insufficient permissions".into()
        } else {
            body
        }),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else if e.is_body() || e.is_decode() {
        ProviderError::StreamInterrupted(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Convert chat messages to the OpenAI-style wire format.
fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|m| match m {
            ChatMessage::User { content } => ApiMessage {
                role: "user",
                content,
                tool_calls: None,
                tool_call_id: None,
            },
            ChatMessage::Assistant(assistant) => ApiMessage {
                role: "assistant",
                content: &assistant.content,
                tool_calls: (!assistant.tool_calls.is_empty()).then(|| {
                    assistant
                        .tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: &tc.id,
                            r#type: "function",
                            function: ApiFunction {
                                name: &tc.name,
                                arguments: &tc.arguments,
                            },
                        })
                        .collect()
                }),
                tool_call_id: None,
            },
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => ApiMessage {
                role: "tool",
                content,
                tool_calls: None,
                tool_call_id: Some(tool_call_id),
            },
        })
        .collect()
}

fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition<'_>> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function",
            function: t,
        })
        .collect()
}

// --- Gateway API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayRequest<'a> {
    model: &'a str,
    system_message: &'a str,
    messages: Vec<ApiMessage<'a>>,
    tools: Vec<ApiToolDefinition<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    app: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall<'a> {
    id: &'a str,
    r#type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition<'a> {
    r#type: &'static str,
    function: &'a ToolDefinition,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dandiclaw_core::message::MessageToolCall;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "openai/gpt-4o".into(),
            system_message: "You edit dandiset metadata.".into(),
            messages: vec![
                ChatMessage::user("Add a keyword"),
                ChatMessage::assistant_with_tools(
                    "",
                    vec![MessageToolCall {
                        id: "call_1".into(),
                        name: "get_metadata".into(),
                        arguments: "{}".into(),
                    }],
                ),
                ChatMessage::tool_result("call_1", "{\"keywords\":[]}"),
            ],
            tools: vec![ToolDefinition {
                name: "get_metadata".into(),
                description: "Read metadata".into(),
                parameters: json!({"type": "object"}),
            }],
            app: Some("dandiclaw".into()),
            temperature: Some(0.2),
        }
    }

    fn sse(events: &[&str]) -> String {
        events.iter().map(|e| format!("data: {e}\n\n")).collect()
    }

    async fn provider_for(server: &MockServer) -> GatewayProvider {
        GatewayProvider::new(
            format!("{}/v1/completion", server.uri()),
            Some("sk-test".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn request_body_matches_gateway_contract() {
        let req = request();
        let body = serde_json::to_value(GatewayProvider::request_body(&req)).unwrap();
        assert_eq!(body["systemMessage"], "You edit dandiset metadata.");
        assert_eq!(body["app"], "dandiclaw");
        assert_eq!(body["messages"][1]["tool_calls"][0]["type"], "function");
        assert_eq!(body["messages"][1]["tool_calls"][0]["function"]["name"], "get_metadata");
        assert_eq!(body["messages"][2]["role"], "tool");
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_metadata");
        assert!(body["messages"][0].get("tool_calls").is_none());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(classify_status(429, String::new()), ProviderError::RateLimited { .. }));
        assert!(matches!(
            classify_status(503, "Upstream rate limit reached".into()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            classify_status(500, "boom".into()),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }

    #[tokio::test]
    async fn streams_text_and_tool_calls() {
        let server = MockServer::start().await;
        let body = sse(&[
            r#"{"choices":[{"delta":{"content":"Adding "}}]}"#,
            r#"{"choices":[{"delta":{"content":"it."}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"modify_metadata","arguments":"{}"}}]}}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":100,"completion_tokens":12}}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(path("/v1/completion"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "openai/gpt-4o", "app": "dandiclaw"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let mut partials = Vec::new();
        let completion = provider
            .send(request(), &mut |t: &str| partials.push(t.to_string()))
            .await
            .unwrap();

        assert_eq!(completion.text, "Adding it.");
        assert_eq!(partials.last().map(String::as_str), Some("Adding it."));
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].id, "call_9");
        assert_eq!(completion.usage.unwrap().completion_tokens, 12);
    }

    #[tokio::test]
    async fn http_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider.send(request(), &mut |_: &str| {}).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider.send(request(), &mut |_: &str| {}).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 400, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn empty_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider.send(request(), &mut |_: &str| {}).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_network_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let provider =
            GatewayProvider::new("http://127.0.0.1:9/v1/completion", None, Duration::from_secs(2)).unwrap();
        let err = provider.send(request(), &mut |_: &str| {}).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
