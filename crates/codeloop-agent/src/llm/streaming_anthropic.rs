//! SSE stream decoder for the Anthropic Messages API.
//!
//! The Anthropic streaming format sends `event:` and `data:` lines in
//! standard SSE format.  [`SseParser`] turns those lines into typed
//! [`StreamEvent`]s; [`AnthropicStreamDecoder`] folds the events into
//! [`ChatChunk`]s.

use serde_json::Value;

use crate::error::ProviderError;
use crate::llm::streaming::{Frame, FrameDecoder, ToolCallAccumulator};
use crate::llm::types::{ChatChunk, StopReason};

/// Events emitted during SSE streaming from the Anthropic Messages API.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The stream has started.
    MessageStart { message_id: String, model: String },

    /// A new content block has started (`"text"` or `"tool_use"`).
    ContentBlockStart {
        index: usize,
        content_type: String,
        id: Option<String>,
        name: Option<String>,
    },

    /// An incremental delta within a content block.
    ContentBlockDelta { index: usize, delta: StreamDelta },

    /// A content block has finished streaming.
    ContentBlockStop { index: usize },

    /// Message-level update carrying the stop reason.
    MessageDelta { stop_reason: Option<String> },

    /// The stream has fully terminated.
    MessageStop,

    /// Keepalive.
    Ping,

    /// The API reported an error mid-stream.
    Error { kind: String, message: String },
}

/// Incremental delta within a streaming content block.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// A chunk of text.
    TextDelta(String),

    /// A chunk of JSON for a tool-use input.
    InputJsonDelta(String),
}

/// Parses raw SSE lines from the Anthropic Messages API stream.
///
/// SSE events span an `event:` line followed by a `data:` line, so the
/// parser remembers the most recent event type.
#[derive(Debug, Default)]
pub struct SseParser {
    current_event_type: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a single line from the SSE stream.
    ///
    /// Returns `None` for comments, blank lines, `event:` lines, unknown
    /// events and unparseable payloads.  A `message_stop` event is returned
    /// even when its payload is malformed.
    pub fn parse_line(&mut self, line: &str) -> Option<StreamEvent> {
        let line = line.trim_end();

        if line.starts_with(':') || line.is_empty() {
            return None;
        }

        if let Some(event_type) = strip_field(line, "event") {
            self.current_event_type = Some(event_type.to_owned());
            return None;
        }

        if let Some(data) = strip_field(line, "data") {
            let event_type = self
                .current_event_type
                .take()
                .unwrap_or_else(|| "unknown".into());
            return parse_event(&event_type, data);
        }

        tracing::trace!(line, "ignoring unrecognised SSE line");
        None
    }
}

/// Strip an SSE `field:` prefix, tolerating the optional single space.
fn strip_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Parse an (event_type, data_json) pair into a [`StreamEvent`].
fn parse_event(event_type: &str, data: &str) -> Option<StreamEvent> {
    // The completion marker is honoured regardless of its payload.
    if event_type == "message_stop" || data.trim() == "[DONE]" {
        return Some(StreamEvent::MessageStop);
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(event_type, error = %e, "skipping unparseable SSE payload");
            return None;
        }
    };

    // Some proxies omit `event:` lines; the payload's `type` says the same.
    let event_type = match event_type {
        "unknown" => v["type"].as_str().unwrap_or("unknown"),
        other => other,
    };

    match event_type {
        "message_start" => {
            let message = &v["message"];
            Some(StreamEvent::MessageStart {
                message_id: json_string(message, "id"),
                model: json_string(message, "model"),
            })
        }

        "content_block_start" => {
            let block = &v["content_block"];
            Some(StreamEvent::ContentBlockStart {
                index: json_index(&v),
                content_type: json_string(block, "type"),
                id: block["id"].as_str().map(String::from),
                name: block["name"].as_str().map(String::from),
            })
        }

        "content_block_delta" => {
            let delta_obj = &v["delta"];
            let delta = match delta_obj["type"].as_str().unwrap_or_default() {
                "text_delta" => StreamDelta::TextDelta(json_string(delta_obj, "text")),
                "input_json_delta" => {
                    StreamDelta::InputJsonDelta(json_string(delta_obj, "partial_json"))
                }
                other => {
                    tracing::debug!(delta_type = other, "ignoring delta type");
                    return None;
                }
            };
            Some(StreamEvent::ContentBlockDelta {
                index: json_index(&v),
                delta,
            })
        }

        "content_block_stop" => Some(StreamEvent::ContentBlockStop {
            index: json_index(&v),
        }),

        "message_delta" => Some(StreamEvent::MessageDelta {
            stop_reason: v["delta"]["stop_reason"].as_str().map(String::from),
        }),

        "message_stop" => Some(StreamEvent::MessageStop),

        "ping" => Some(StreamEvent::Ping),

        "error" => Some(StreamEvent::Error {
            kind: json_string(&v["error"], "type"),
            message: json_string(&v["error"], "message"),
        }),

        _ => {
            tracing::trace!(event_type, "ignoring unknown SSE event type");
            None
        }
    }
}

fn json_string(v: &Value, field: &str) -> String {
    v[field].as_str().unwrap_or_default().to_owned()
}

fn json_index(v: &Value) -> usize {
    v["index"].as_u64().unwrap_or(0) as usize
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Folds Anthropic stream events into chat chunks.
#[derive(Debug)]
pub(crate) struct AnthropicStreamDecoder {
    provider: String,
    parser: SseParser,
    tool_calls: ToolCallAccumulator,
    stop_reason: Option<String>,
}

impl AnthropicStreamDecoder {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            parser: SseParser::new(),
            tool_calls: ToolCallAccumulator::default(),
            stop_reason: None,
        }
    }
}

impl FrameDecoder for AnthropicStreamDecoder {
    fn decode_line(&mut self, line: &str) -> Frame {
        let Some(event) = self.parser.parse_line(line) else {
            return Frame::Skip;
        };

        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_type,
                id,
                name,
            } if content_type == "tool_use" => {
                let slot = self.tool_calls.slot(index);
                slot.id = id.unwrap_or_default();
                slot.name = name.unwrap_or_default();
                Frame::Skip
            }

            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                StreamDelta::TextDelta(t) => Frame::Text(t),
                StreamDelta::InputJsonDelta(j) => {
                    self.tool_calls.slot(index).arguments_json.push_str(&j);
                    Frame::Skip
                }
            },

            StreamEvent::MessageDelta { stop_reason } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                Frame::Skip
            }

            StreamEvent::MessageStop => Frame::Done,

            StreamEvent::Error { kind, message } => {
                let err = if kind == "overloaded_error" || kind == "rate_limit_error" {
                    ProviderError::RateLimited {
                        provider: self.provider.clone(),
                        retry_after_secs: None,
                        message,
                    }
                } else {
                    ProviderError::request(self.provider.clone(), format!("{kind}: {message}"))
                };
                Frame::Failed(err)
            }

            _ => Frame::Skip,
        }
    }

    fn finish(&mut self) -> ChatChunk {
        let calls = self.tool_calls.take_calls();
        let stop_reason = self
            .stop_reason
            .as_deref()
            .map_or(StopReason::EndTurn, StopReason::from_vendor);
        ChatChunk::terminal(calls, stop_reason)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
