//! Provider for OpenAI-compatible Chat Completions endpoints.
//!
//! Covers OpenAI itself and the many gateways that mirror its protocol
//! (OpenRouter, Together, vLLM, LiteLLM, ...).  System messages stay in the
//! `messages` array, tool calls live in `assistant.tool_calls` with their
//! arguments serialized as a JSON string, and tool results use
//! `role: "tool"` with a `tool_call_id`.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::config::{OpenAiConfig, resolve_api_key};
use crate::error::{AgentError, ProviderError};
use crate::llm::provider::{
    ChatStream, Provider, build_http_client, post_json, read_json, resolve_model,
};
use crate::llm::streaming::decode_frames;
use crate::llm::streaming_openai::OpenAiStreamDecoder;
use crate::llm::types::{
    ChatMessage, ChatRequest, ChatResponse, ChatTool, ChatToolCall, Role, StopReason,
    arguments_from_value,
};

const PROVIDER: &str = "openai";

/// Talks to `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    /// `None` for keyless local gateways.
    api_key: Option<String>,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OpenAiProvider {
    /// Build a provider from its configuration record.
    ///
    /// A missing key is allowed; the `Authorization` header is then omitted
    /// and the gateway decides whether to accept the request.
    pub fn new(config: &OpenAiConfig) -> Result<Self, AgentError> {
        let api_key = resolve_api_key(config.api_key.as_deref(), config.api_key_env.as_deref());
        if api_key.is_none() {
            tracing::info!(base_url = %config.base_url, "no API key configured, sending unauthenticated requests");
        }

        Ok(Self {
            http: build_http_client(PROVIDER, config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build the JSON body for the Chat Completions API.
    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": resolve_model(request, &self.model),
            "messages": messages_to_openai(&request.messages),
        });

        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature.or(self.temperature) {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = tools_to_openai(&request.tools);
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                ProviderError::Authentication {
                    provider: PROVIDER.into(),
                    message: format!("invalid authorization header: {e}"),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(request, stream);
        post_json(
            &self.http,
            PROVIDER,
            resolve_model(request, &self.model),
            &url,
            self.headers()?,
            &body,
        )
        .await
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let resp = self.send(request, false).await?;
        let v = read_json(PROVIDER, resp).await?;
        parse_openai_response(&v)
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError> {
        let resp = self.send(request, true).await?;
        Ok(decode_frames(
            PROVIDER.to_owned(),
            resp.bytes_stream(),
            OpenAiStreamDecoder::new(PROVIDER),
        ))
    }
}

// ---------------------------------------------------------------------------
// Format conversion
// ---------------------------------------------------------------------------

/// Convert messages to the Chat Completions wire format.
fn messages_to_openai(messages: &[ChatMessage]) -> Vec<Value> {
    let mut wire_messages: Vec<Value> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => {
                wire_messages.push(json!({
                    "role": "system",
                    "content": msg.content,
                }));
            }
            Role::User if msg.images.is_empty() => {
                wire_messages.push(json!({
                    "role": "user",
                    "content": msg.content,
                }));
            }
            Role::User => {
                let mut parts = vec![json!({ "type": "text", "text": msg.content })];
                parts.extend(msg.images.iter().map(|img| {
                    json!({
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:{};base64,{}", img.media_type(), img.to_base64()),
                        }
                    })
                }));
                wire_messages.push(json!({ "role": "user", "content": parts }));
            }
            Role::Assistant => {
                if msg.tool_calls.is_empty() {
                    wire_messages.push(json!({
                        "role": "assistant",
                        "content": msg.content,
                    }));
                } else {
                    let tool_calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": Value::Object(tc.arguments.clone()).to_string(),
                                }
                            })
                        })
                        .collect();

                    let mut m = json!({
                        "role": "assistant",
                        "tool_calls": tool_calls,
                    });
                    if !msg.content.is_empty() {
                        m["content"] = json!(msg.content);
                    }
                    wire_messages.push(m);
                }
            }
            Role::Tool => {
                wire_messages.push(json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id,
                    "content": msg.content,
                }));
            }
        }
    }

    wire_messages
}

/// Wrap each tool as `{"type": "function", "function": {...}}`.
fn tools_to_openai(tools: &[ChatTool]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect();
    json!(tool_values)
}

/// Parse a non-streaming Chat Completions response.
fn parse_openai_response(v: &Value) -> Result<ChatResponse, ProviderError> {
    let choice = &v["choices"][0];
    let message = &choice["message"];
    if message.is_null() {
        return Err(ProviderError::request(
            PROVIDER,
            "missing `choices[0].message` in response",
        ));
    }

    let tool_calls: Vec<ChatToolCall> = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|tc| {
                    let id = tc["id"]
                        .as_str()
                        .filter(|s| !s.is_empty())
                        .map_or_else(ChatToolCall::synthesize_id, String::from);
                    let func = &tc["function"];
                    ChatToolCall::new(
                        id,
                        func["name"].as_str().unwrap_or_default(),
                        arguments_from_value(&func["arguments"]),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let text = message["content"].as_str().unwrap_or_default().to_owned();
    let stop_reason = choice["finish_reason"]
        .as_str()
        .map_or(StopReason::EndTurn, StopReason::from_vendor);
    Ok(ChatResponse::new(text, tool_calls, stop_reason))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ImageData, ToolArguments};

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(&OpenAiConfig {
            api_key: Some("sk-test".into()),
            ..OpenAiConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn system_message_stays_in_messages() {
        let wire = messages_to_openai(&[
            ChatMessage::system("You are helpful."),
            ChatMessage::user("Hello"),
        ]);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "You are helpful.");
        assert_eq!(wire[1]["role"], "user");
    }

    #[test]
    fn tool_call_arguments_are_serialized_as_string() {
        let mut args = ToolArguments::new();
        args.insert("file_path".into(), json!("test.txt"));
        let wire = messages_to_openai(&[
            ChatMessage::assistant_with_tool_calls(
                "",
                vec![ChatToolCall::new("call_abc", "read_file", args)],
            ),
            ChatMessage::tool_result("call_abc", "file contents"),
        ]);

        let tc = &wire[0]["tool_calls"][0];
        assert_eq!(tc["id"], "call_abc");
        assert_eq!(tc["type"], "function");
        assert!(wire[0].get("content").is_none());
        let args: Value = serde_json::from_str(tc["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args["file_path"], "test.txt");

        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_call_id"], "call_abc");
        assert_eq!(wire[1]["content"], "file contents");
    }

    #[test]
    fn images_become_data_uris() {
        let wire = messages_to_openai(&[ChatMessage::user("describe")
            .with_image(ImageData::Base64("iVBORw0KGgo=".into()))]);
        let parts = wire[0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "describe");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/png;base64,iVBORw0KGgo="
        );
    }

    #[test]
    fn tools_preserve_schema() {
        let wire = tools_to_openai(&[ChatTool {
            name: "read_file".into(),
            description: "Read a file from disk".into(),
            parameters: json!({
                "type": "object",
                "properties": {"file_path": {"type": "string"}},
                "required": ["file_path"]
            }),
        }]);
        let arr = wire.as_array().unwrap();
        assert_eq!(arr[0]["type"], "function");
        assert_eq!(arr[0]["function"]["name"], "read_file");
        assert_eq!(arr[0]["function"]["parameters"]["type"], "object");
        assert_eq!(arr[0]["function"]["parameters"]["required"][0], "file_path");
    }

    #[test]
    fn request_body_uses_default_model_and_sampling() {
        let mut request = ChatRequest::new(
            "",
            vec![ChatMessage::system("sys"), ChatMessage::user("Hello")],
        );
        request.temperature = Some(0.5);
        request.max_tokens = Some(2048);

        let body = provider().build_request_body(&request, false);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 2048);
        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 0.5).abs() < 1e-6);
        assert!(body.get("stream").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn parse_text_response() {
        let v = json!({
            "id": "chatcmpl-abc",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello from the gateway!"},
                "finish_reason": "stop"
            }]
        });
        let resp = parse_openai_response(&v).unwrap();
        assert_eq!(resp.message.content, "Hello from the gateway!");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn parse_tool_call_response() {
        let v = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_xyz", "type": "function",
                         "function": {"name": "read_file", "arguments": "{\"file_path\":\"/tmp/test.txt\"}"}},
                        {"id": "call_bad", "type": "function",
                         "function": {"name": "list_files", "arguments": "{not json"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let resp = parse_openai_response(&v).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert!(resp.message.content.is_empty());
        let calls = &resp.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments["file_path"], "/tmp/test.txt");
        assert!(calls[1].arguments.is_empty());
    }

    #[test]
    fn parse_missing_choices_is_an_error() {
        assert!(parse_openai_response(&json!({"object": "error"})).is_err());
    }

    #[test]
    fn keyless_provider_omits_authorization() {
        let keyless = OpenAiProvider::new(&OpenAiConfig {
            api_key: None,
            api_key_env: None,
            base_url: "http://localhost:8000/v1/".into(),
            ..OpenAiConfig::default()
        })
        .unwrap();
        assert_eq!(keyless.base_url, "http://localhost:8000/v1");
        assert!(keyless.headers().unwrap().get(AUTHORIZATION).is_none());
        assert_eq!(provider().headers().unwrap()[AUTHORIZATION], "Bearer sk-test");
    }
}
