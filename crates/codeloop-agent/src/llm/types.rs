//! Core types for LLM interaction.
//!
//! These types model the data flowing between the agent runtime and LLM
//! providers.  They are provider-agnostic at this layer; each provider module
//! translates them into its vendor's wire format.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unvalidated, string-keyed tool arguments as produced by the model.
pub type ToolArguments = Map<String, Value>;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the LLM.
    Assistant,
    /// Result of a tool invocation, fed back to the model.
    Tool,
}

/// An image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageData {
    /// Already base64-encoded image data.
    Base64(String),
    /// Raw image bytes.
    Bytes(Vec<u8>),
}

impl ImageData {
    /// Base64 text form, encoding raw bytes when necessary.
    pub fn to_base64(&self) -> String {
        match self {
            Self::Base64(s) => s.clone(),
            Self::Bytes(b) => BASE64.encode(b),
        }
    }

    /// Best-effort media type sniffed from the leading magic bytes.
    pub fn media_type(&self) -> &'static str {
        let head: Vec<u8> = match self {
            Self::Bytes(b) => b.iter().take(12).copied().collect(),
            Self::Base64(s) => {
                let prefix: String = s.chars().take(16).collect();
                BASE64.decode(prefix.as_bytes()).unwrap_or_default()
            }
        };
        if head.starts_with(&[0x89, b'P', b'N', b'G']) {
            "image/png"
        } else if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
            "image/jpeg"
        } else if head.starts_with(b"GIF8") {
            "image/gif"
        } else if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
            "image/webp"
        } else {
            "image/png"
        }
    }
}

/// A single message in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced this message.
    pub role: Role,

    /// The textual content of the message.
    ///
    /// For [`Role::Tool`] messages this holds the tool's result text.
    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the assistant (only on assistant messages).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,

    /// The [`ChatToolCall::id`] this message answers (only on tool messages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Images attached to the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
}

impl ChatMessage {
    fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            images: Vec::new(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content.into())
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// Create an assistant message carrying tool calls (and possibly text).
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ChatToolCall>,
    ) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content.into())
        }
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content.into())
        }
    }

    /// Attach an image.
    pub fn with_image(mut self, image: ImageData) -> Self {
        self.images.push(image);
        self
    }

    /// Whether this is an assistant message that requests tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// A function schema advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTool {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's parameters.
    pub parameters: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatToolCall {
    /// Identifier assigned by the vendor (synthesized when it assigns none).
    pub id: String,

    /// The name of the tool to invoke.
    pub name: String,

    /// Arguments as produced by the model, not validated against the schema.
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ChatToolCall {
    /// Create a tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Generate an id for vendors that do not assign one.
    pub fn synthesize_id() -> String {
        format!("call_{}", uuid::Uuid::now_v7().simple())
    }
}

/// Coerce a vendor argument payload into an argument map.
///
/// Objects pass through; JSON text is parsed; anything empty, missing or
/// unparseable becomes an empty map so a malformed call still yields a
/// well-formed [`ChatToolCall`].
pub fn arguments_from_value(value: &Value) -> ToolArguments {
    match value {
        Value::Object(map) => map.clone(),
        Value::String(text) => arguments_from_str(text),
        _ => ToolArguments::new(),
    }
}

/// Parse argument JSON text, see [`arguments_from_value`].
pub fn arguments_from_str(text: &str) -> ToolArguments {
    if text.trim().is_empty() {
        return ToolArguments::new();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(arguments = %other, "tool call arguments are not an object");
            ToolArguments::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "unparseable tool call arguments");
            ToolArguments::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// A full request to send to an LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// The model identifier.  Empty means the provider's configured model.
    pub model: String,

    /// The conversation, including any system message.
    pub messages: Vec<ChatMessage>,

    /// Tool schemas the model may invoke.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,

    /// Maximum tokens the model may generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    /// Create a request with no tools and provider-default sampling.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    /// Attach tool schemas.
    pub fn with_tools(mut self, tools: Vec<ChatTool>) -> Self {
        self.tools = tools;
        self
    }
}

/// Why the model stopped generating, normalized across vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the turn.
    EndTurn,
    /// The model is waiting on tool results.
    ToolUse,
    /// The token limit was reached.
    MaxTokens,
    /// A stop sequence was produced.
    StopSequence,
}

impl StopReason {
    /// Normalize a vendor stop/finish reason string.
    pub fn from_vendor(reason: &str) -> Self {
        match reason {
            "tool_use" | "tool_calls" | "function_call" => Self::ToolUse,
            "max_tokens" | "length" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            _ => Self::EndTurn,
        }
    }
}

/// The complete response to a non-streaming chat call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// The assistant message, including any tool calls.
    pub message: ChatMessage,

    /// Why generation stopped.
    pub stop_reason: StopReason,
}

impl ChatResponse {
    /// Build a response, deriving the assistant message from its parts.
    ///
    /// A vendor that reports a natural stop while still emitting tool calls
    /// is normalized to [`StopReason::ToolUse`].
    pub fn new(text: String, tool_calls: Vec<ChatToolCall>, stop_reason: StopReason) -> Self {
        let stop_reason = if !tool_calls.is_empty() && stop_reason == StopReason::EndTurn {
            StopReason::ToolUse
        } else {
            stop_reason
        };
        Self {
            message: ChatMessage::assistant_with_tool_calls(text, tool_calls),
            stop_reason,
        }
    }
}

/// One streamed fragment of a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatChunk {
    /// Incremental text.  May be empty.
    pub delta: String,

    /// Present only on the terminal chunk: the fully reassembled tool calls.
    pub tool_calls: Option<Vec<ChatToolCall>>,

    /// Present only on the terminal chunk.
    pub stop_reason: Option<StopReason>,
}

impl ChatChunk {
    /// A text fragment.
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            ..Self::default()
        }
    }

    /// The terminal chunk of a stream.
    pub fn terminal(tool_calls: Vec<ChatToolCall>, stop_reason: StopReason) -> Self {
        Self {
            delta: String::new(),
            tool_calls: Some(tool_calls),
            stop_reason: Some(stop_reason),
        }
    }

    /// Whether this chunk ends the stream.
    pub fn is_terminal(&self) -> bool {
        self.tool_calls.is_some()
    }
}
