//! Provider for the Anthropic Messages API.
//!
//! System messages travel in the top-level `system` field rather than the
//! `messages` array, tool calls are `tool_use` content blocks, and tool
//! results go back as `tool_result` blocks inside a user message.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue};
use serde_json::{Value, json};

use crate::config::{AnthropicConfig, resolve_api_key};
use crate::error::{AgentError, ProviderError};
use crate::llm::provider::{
    ChatStream, Provider, build_http_client, post_json, read_json, resolve_model,
};
use crate::llm::streaming::decode_frames;
use crate::llm::streaming_anthropic::AnthropicStreamDecoder;
use crate::llm::types::{
    ChatMessage, ChatRequest, ChatResponse, ChatTool, ChatToolCall, Role, StopReason,
    arguments_from_value,
};

const PROVIDER: &str = "anthropic";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic beta header required for OAuth token authentication.
const ANTHROPIC_OAUTH_BETA: &str = "oauth-2025-04-20";

/// Talks to `POST {base_url}/v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl AnthropicProvider {
    /// Build a provider from its configuration record.
    ///
    /// Fails with [`AgentError::MissingApiKey`] when no key resolves.
    pub fn new(config: &AnthropicConfig) -> Result<Self, AgentError> {
        let api_key = resolve_api_key(config.api_key.as_deref(), config.api_key_env.as_deref())
            .ok_or_else(|| AgentError::MissingApiKey {
                provider: PROVIDER.into(),
            })?;

        Ok(Self {
            http: build_http_client(PROVIDER, config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build the JSON body for the Messages API.
    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let (system_text, messages) = messages_to_anthropic(&request.messages);

        let mut body = json!({
            "model": resolve_model(request, &self.model),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "messages": messages,
        });

        if let Some(system) = system_text {
            body["system"] = json!(system);
        }
        if let Some(temp) = request.temperature.or(self.temperature) {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = tools_to_anthropic(&request.tools);
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    /// Request headers.
    ///
    /// OAuth tokens (`sk-ant-oat` prefix) use Bearer auth plus the OAuth beta
    /// header; regular API keys use `x-api-key`.
    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        let invalid = |e: InvalidHeaderValue| ProviderError::Authentication {
            provider: PROVIDER.into(),
            message: format!("API key is not a valid header value: {e}"),
        };

        if self.api_key.starts_with("sk-ant-oat") {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(invalid)?,
            );
            headers.insert(
                "anthropic-beta",
                HeaderValue::from_static(ANTHROPIC_OAUTH_BETA),
            );
        } else {
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(&self.api_key).map_err(invalid)?,
            );
        }
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
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
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let resp = self.send(request, false).await?;
        let v = read_json(PROVIDER, resp).await?;
        parse_anthropic_response(&v)
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError> {
        let resp = self.send(request, true).await?;
        Ok(decode_frames(
            PROVIDER.to_owned(),
            resp.bytes_stream(),
            AnthropicStreamDecoder::new(PROVIDER),
        ))
    }
}

// ---------------------------------------------------------------------------
// Format conversion
// ---------------------------------------------------------------------------

/// Split the system messages out (joined with newlines) and convert the rest
/// to the Anthropic wire format.
///
/// Consecutive tool results are merged into one user message, since the API
/// requires every `tool_result` answering an assistant turn to arrive in the
/// message immediately after it.
fn messages_to_anthropic(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system: Option<String> = None;
    let mut wire_messages: Vec<Value> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => match &mut system {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&msg.content);
                }
                None => system = Some(msg.content.clone()),
            },
            Role::User => {
                if msg.images.is_empty() {
                    wire_messages.push(json!({
                        "role": "user",
                        "content": msg.content,
                    }));
                } else {
                    let mut content: Vec<Value> = msg
                        .images
                        .iter()
                        .map(|img| {
                            json!({
                                "type": "image",
                                "source": {
                                    "type": "base64",
                                    "media_type": img.media_type(),
                                    "data": img.to_base64(),
                                }
                            })
                        })
                        .collect();
                    if !msg.content.is_empty() {
                        content.push(json!({ "type": "text", "text": msg.content }));
                    }
                    wire_messages.push(json!({ "role": "user", "content": content }));
                }
            }
            Role::Assistant => {
                if msg.tool_calls.is_empty() {
                    wire_messages.push(json!({
                        "role": "assistant",
                        "content": msg.content,
                    }));
                } else {
                    let mut content: Vec<Value> = Vec::new();
                    if !msg.content.is_empty() {
                        content.push(json!({ "type": "text", "text": msg.content }));
                    }
                    for tc in &msg.tool_calls {
                        content.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": tc.arguments,
                        }));
                    }
                    wire_messages.push(json!({ "role": "assistant", "content": content }));
                }
            }
            Role::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id,
                    "content": msg.content,
                });
                let merged = wire_messages.last_mut().and_then(|last| {
                    let is_results = last["role"] == "user"
                        && last["content"]
                            .as_array()
                            .and_then(|blocks| blocks.first())
                            .is_some_and(|b| b["type"] == "tool_result");
                    if is_results {
                        last["content"].as_array_mut()
                    } else {
                        None
                    }
                });
                match merged {
                    Some(blocks) => blocks.push(block),
                    None => wire_messages.push(json!({ "role": "user", "content": [block] })),
                }
            }
        }
    }

    (system, wire_messages)
}

/// Convert tool schemas into the Anthropic API format.
fn tools_to_anthropic(tools: &[ChatTool]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.parameters,
            })
        })
        .collect();
    json!(tool_values)
}

/// Parse a non-streaming Messages API response.
fn parse_anthropic_response(v: &Value) -> Result<ChatResponse, ProviderError> {
    let content = v["content"].as_array().ok_or_else(|| {
        ProviderError::request(PROVIDER, "missing `content` array in response")
    })?;

    let mut text = String::new();
    let mut tool_calls: Vec<ChatToolCall> = Vec::new();

    for block in content {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let id = block["id"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map_or_else(ChatToolCall::synthesize_id, String::from);
                tool_calls.push(ChatToolCall::new(
                    id,
                    block["name"].as_str().unwrap_or_default(),
                    arguments_from_value(&block["input"]),
                ));
            }
            _ => {}
        }
    }

    let stop_reason = v["stop_reason"]
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

    fn provider_with_key(key: &str) -> AnthropicProvider {
        AnthropicProvider::new(&AnthropicConfig {
            api_key: Some(key.into()),
            ..AnthropicConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn build_request_body_basic() {
        let provider = provider_with_key("sk-ant-test");
        let request = ChatRequest::new(
            "",
            vec![
                ChatMessage::system("You are helpful."),
                ChatMessage::user("Hello"),
            ],
        );

        let body = provider.build_request_body(&request, false);
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["system"], "You are helpful.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!(body.get("stream").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn build_request_body_with_tools() {
        let provider = provider_with_key("sk-ant-test");
        let request = ChatRequest::new("claude-3-5-haiku-latest", vec![ChatMessage::user("hi")])
            .with_tools(vec![ChatTool {
                name: "read_file".into(),
                description: "Read a file".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"file_path": {"type": "string"}},
                    "required": ["file_path"]
                }),
            }]);

        let body = provider.build_request_body(&request, true);
        assert_eq!(body["model"], "claude-3-5-haiku-latest");
        assert_eq!(body["stream"], true);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools[0]["name"], "read_file");
        assert_eq!(tools[0]["input_schema"]["required"][0], "file_path");
        assert_eq!(tools[0]["input_schema"]["properties"]["file_path"]["type"], "string");
    }

    #[test]
    fn tool_results_are_merged_and_keyed_by_call_id() {
        let mut args = ToolArguments::new();
        args.insert("file_path".into(), json!("a.txt"));
        let messages = vec![
            ChatMessage::user("read both"),
            ChatMessage::assistant_with_tool_calls(
                "Reading.",
                vec![
                    ChatToolCall::new("toolu_1", "read_file", args),
                    ChatToolCall::new("toolu_2", "list_files", ToolArguments::new()),
                ],
            ),
            ChatMessage::tool_result("toolu_1", "alpha"),
            ChatMessage::tool_result("toolu_2", "b.txt"),
        ];

        let (system, wire) = messages_to_anthropic(&messages);
        assert!(system.is_none());
        assert_eq!(wire.len(), 3);

        let assistant = wire[1]["content"].as_array().unwrap();
        assert_eq!(assistant[0]["type"], "text");
        assert_eq!(assistant[1]["type"], "tool_use");
        assert_eq!(assistant[1]["input"]["file_path"], "a.txt");

        let results = wire[2]["content"].as_array().unwrap();
        assert_eq!(wire[2]["role"], "user");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "toolu_1");
        assert_eq!(results[1]["tool_use_id"], "toolu_2");
        assert_eq!(results[1]["content"], "b.txt");
    }

    #[test]
    fn multiple_system_messages_are_joined() {
        let (system, wire) = messages_to_anthropic(&[
            ChatMessage::system("one"),
            ChatMessage::system("two"),
            ChatMessage::user("hi"),
        ]);
        assert_eq!(system.as_deref(), Some("one\ntwo"));
        assert_eq!(wire.len(), 1);
    }

    #[test]
    fn images_become_base64_blocks() {
        let msg = ChatMessage::user("what is this?")
            .with_image(ImageData::Bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]));
        let (_, wire) = messages_to_anthropic(&[msg]);
        let content = wire[0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["text"], "what is this?");
    }

    #[test]
    fn parse_text_response() {
        let v = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hello there"}],
            "stop_reason": "end_turn"
        });
        let resp = parse_anthropic_response(&v).unwrap();
        assert_eq!(resp.message.content, "Hello there");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert!(!resp.message.has_tool_calls());
    }

    #[test]
    fn parse_tool_use_response() {
        let v = json!({
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_01", "name": "list_files", "input": {"path": "src"}},
                {"type": "tool_use", "id": "toolu_02", "name": "read_file"}
            ],
            "stop_reason": "tool_use"
        });
        let resp = parse_anthropic_response(&v).unwrap();
        assert_eq!(resp.message.content, "Let me look.");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        let calls = &resp.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments["path"], "src");
        assert!(calls[1].arguments.is_empty());
    }

    #[test]
    fn parse_response_without_content_is_an_error() {
        let err = parse_anthropic_response(&json!({"type": "message"})).unwrap_err();
        assert_eq!(err.provider(), "anthropic");
    }

    #[test]
    fn oauth_tokens_use_bearer_auth() {
        let headers = provider_with_key("sk-ant-oat01-abc").headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-ant-oat01-abc");
        assert_eq!(headers["anthropic-beta"], ANTHROPIC_OAUTH_BETA);
        assert!(headers.get("x-api-key").is_none());

        let headers = provider_with_key("sk-ant-api03-xyz").headers().unwrap();
        assert_eq!(headers["x-api-key"], "sk-ant-api03-xyz");
        assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let err = AnthropicProvider::new(&AnthropicConfig {
            api_key: None,
            api_key_env: Some("CODELOOP_TEST_DEFINITELY_UNSET".into()),
            ..AnthropicConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, AgentError::MissingApiKey { .. }));
    }
}
