//! Provider for a locally hosted model served by Ollama.
//!
//! Uses the native `/api/chat` endpoint.  Ollama assigns no ids to tool
//! calls, so every call gets a synthesized one; tool results are correlated
//! back by tool name.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::config::OllamaConfig;
use crate::error::{AgentError, ProviderError};
use crate::llm::provider::{
    ChatStream, Provider, build_http_client, post_json, read_json, resolve_model,
};
use crate::llm::streaming::decode_frames;
use crate::llm::streaming_ollama::OllamaStreamDecoder;
use crate::llm::types::{
    ChatMessage, ChatRequest, ChatResponse, ChatTool, ChatToolCall, Role, StopReason,
    arguments_from_value,
};

const PROVIDER: &str = "ollama";

/// Talks to `POST {host}/api/chat`.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    http: reqwest::Client,
    host: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Result<Self, AgentError> {
        Ok(Self {
            http: build_http_client(PROVIDER, config.timeout_secs)?,
            host: config.host.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": resolve_model(request, &self.model),
            "messages": messages_to_ollama(&request.messages),
            "stream": stream,
        });

        let mut options = serde_json::Map::new();
        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            options.insert("num_predict".into(), json!(max_tokens));
        }
        if let Some(temp) = request.temperature.or(self.temperature) {
            options.insert("temperature".into(), json!(temp));
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }
        if !request.tools.is_empty() {
            body["tools"] = tools_to_ollama(&request.tools);
        }

        body
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/api/chat", self.host);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        post_json(
            &self.http,
            PROVIDER,
            resolve_model(request, &self.model),
            &url,
            headers,
            &self.build_request_body(request, stream),
        )
        .await
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let resp = self.send(request, false).await?;
        let v = read_json(PROVIDER, resp).await?;
        parse_ollama_response(&v)
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError> {
        let resp = self.send(request, true).await?;
        Ok(decode_frames(
            PROVIDER.to_owned(),
            resp.bytes_stream(),
            OllamaStreamDecoder::new(PROVIDER),
        ))
    }
}

// ---------------------------------------------------------------------------
// Format conversion
// ---------------------------------------------------------------------------

fn messages_to_ollama(messages: &[ChatMessage]) -> Vec<Value> {
    // call id -> tool name, for labelling tool results.
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut wire_messages = Vec::with_capacity(messages.len());

    for msg in messages {
        let mut m = match msg.role {
            Role::System => json!({ "role": "system", "content": msg.content }),
            Role::User => json!({ "role": "user", "content": msg.content }),
            Role::Assistant => {
                let mut m = json!({ "role": "assistant", "content": msg.content });
                if msg.has_tool_calls() {
                    let calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            call_names.insert(&tc.id, &tc.name);
                            json!({
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments,
                                }
                            })
                        })
                        .collect();
                    m["tool_calls"] = json!(calls);
                }
                m
            }
            Role::Tool => {
                let mut m = json!({ "role": "tool", "content": msg.content });
                if let Some(name) = msg
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| call_names.get(id))
                {
                    m["tool_name"] = json!(name);
                }
                m
            }
        };

        if !msg.images.is_empty() {
            let images: Vec<String> = msg.images.iter().map(|img| img.to_base64()).collect();
            m["images"] = json!(images);
        }
        wire_messages.push(m);
    }

    wire_messages
}

fn tools_to_ollama(tools: &[ChatTool]) -> Value {
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

fn parse_ollama_response(v: &Value) -> Result<ChatResponse, ProviderError> {
    let message = &v["message"];
    if message.is_null() {
        return Err(ProviderError::request(
            PROVIDER,
            "missing `message` in response",
        ));
    }

    let tool_calls: Vec<ChatToolCall> = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let func = &tc["function"];
                    let name = func["name"].as_str().filter(|n| !n.is_empty())?;
                    Some(ChatToolCall::new(
                        ChatToolCall::synthesize_id(),
                        name,
                        arguments_from_value(&func["arguments"]),
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    let text = message["content"].as_str().unwrap_or_default().to_owned();
    let stop_reason = v["done_reason"]
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

    #[test]
    fn request_body_maps_sampling_to_options() {
        let provider = OllamaProvider::new(&OllamaConfig {
            max_tokens: Some(512),
            ..OllamaConfig::default()
        })
        .unwrap();
        let mut request = ChatRequest::new("", vec![ChatMessage::user("hi")]);
        request.temperature = Some(0.2);

        let body = provider.build_request_body(&request, true);
        assert_eq!(body["model"], "qwen2.5:latest");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 512);
        assert!(body["options"]["temperature"].is_number());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn request_body_without_sampling_has_no_options() {
        let provider = OllamaProvider::new(&OllamaConfig::default()).unwrap();
        let body = provider.build_request_body(&ChatRequest::new("llama3.1", vec![]), false);
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["stream"], false);
        assert!(body.get("options").is_none());
    }

    #[test]
    fn tool_results_are_labelled_with_the_tool_name() {
        let mut args = ToolArguments::new();
        args.insert("path".into(), json!("."));
        let wire = messages_to_ollama(&[
            ChatMessage::assistant_with_tool_calls(
                "",
                vec![ChatToolCall::new("call_1", "list_files", args)],
            ),
            ChatMessage::tool_result("call_1", "a.txt\nb.txt"),
            ChatMessage::tool_result("call_unknown", "orphan"),
        ]);

        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "list_files");
        assert_eq!(wire[0]["tool_calls"][0]["function"]["arguments"]["path"], ".");
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_name"], "list_files");
        assert!(wire[2].get("tool_name").is_none());
    }

    #[test]
    fn images_are_sent_as_base64_strings() {
        let wire = messages_to_ollama(&[
            ChatMessage::user("look").with_image(ImageData::Bytes(b"GIF89a".to_vec()))
        ]);
        assert_eq!(wire[0]["images"][0], "R0lGODlh");
    }

    #[test]
    fn parse_response_synthesizes_call_ids() {
        let v = json!({
            "model": "llama3.1",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "read_file", "arguments": {"file_path": "README.md"}}},
                    {"function": {"name": "read_file", "arguments": {"file_path": "Cargo.toml"}}}
                ]
            },
            "done": true,
            "done_reason": "stop"
        });
        let resp = parse_ollama_response(&v).unwrap();
        let calls = &resp.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].id, calls[1].id);
        assert_eq!(calls[1].arguments["file_path"], "Cargo.toml");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn parse_text_response() {
        let v = json!({
            "message": {"role": "assistant", "content": "Hi!"},
            "done": true,
            "done_reason": "length"
        });
        let resp = parse_ollama_response(&v).unwrap();
        assert_eq!(resp.message.content, "Hi!");
        assert_eq!(resp.stop_reason, StopReason::MaxTokens);
    }
}
