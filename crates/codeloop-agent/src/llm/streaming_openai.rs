//! SSE stream decoder for the OpenAI Chat Completions API.
//!
//! The OpenAI streaming format sends `data:` lines with JSON payloads
//! containing `choices[].delta` objects and terminates with a
//! `data: [DONE]` sentinel.  Some compatible gateways close the body right
//! after the final `finish_reason` without the sentinel; that is accepted.

use serde_json::Value;

use crate::error::ProviderError;
use crate::llm::streaming::{Frame, FrameDecoder, ToolCallAccumulator};
use crate::llm::types::{ChatChunk, StopReason};

/// Folds OpenAI `chat.completion.chunk` payloads into chat chunks.
///
/// Tool call deltas carry an `index` that correlates fragments of the same
/// call; the name and id arrive first, argument text follows in pieces.
#[derive(Debug)]
pub(crate) struct OpenAiStreamDecoder {
    provider: String,
    tool_calls: ToolCallAccumulator,
    finish_reason: Option<String>,
}

impl OpenAiStreamDecoder {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            tool_calls: ToolCallAccumulator::default(),
            finish_reason: None,
        }
    }

    fn absorb_tool_deltas(&mut self, deltas: &[Value]) {
        for (position, tc) in deltas.iter().enumerate() {
            let index = tc["index"].as_u64().map_or(position, |i| i as usize);
            let slot = self.tool_calls.slot(index);

            if let Some(id) = tc["id"].as_str().filter(|s| !s.is_empty()) {
                slot.id = id.to_owned();
            }
            let func = &tc["function"];
            if let Some(name) = func["name"].as_str() {
                slot.name.push_str(name);
            }
            match &func["arguments"] {
                Value::String(fragment) => slot.arguments_json.push_str(fragment),
                // A few gateways send the arguments already decoded.
                Value::Object(map) => slot.arguments = Some(map.clone()),
                _ => {}
            }
        }
    }
}

impl FrameDecoder for OpenAiStreamDecoder {
    fn decode_line(&mut self, line: &str) -> Frame {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with(':') {
            return Frame::Skip;
        }

        let Some(data) = line.strip_prefix("data:") else {
            return Frame::Skip;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Frame::Done;
        }

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "skipping unparseable SSE payload");
                return Frame::Skip;
            }
        };

        if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
            let message = err["message"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| err.to_string());
            return Frame::Failed(ProviderError::request(self.provider.clone(), message));
        }

        let choice = &v["choices"][0];
        if let Some(reason) = choice["finish_reason"].as_str() {
            self.finish_reason = Some(reason.to_owned());
        }

        let delta = &choice["delta"];
        if let Some(tool_deltas) = delta["tool_calls"].as_array() {
            self.absorb_tool_deltas(tool_deltas);
        }

        match delta["content"].as_str() {
            Some(content) => Frame::Text(content.to_owned()),
            None => Frame::Skip,
        }
    }

    fn finish(&mut self) -> ChatChunk {
        let calls = self.tool_calls.take_calls();
        let stop_reason = self
            .finish_reason
            .as_deref()
            .map_or(StopReason::EndTurn, StopReason::from_vendor);
        ChatChunk::terminal(calls, stop_reason)
    }

    fn complete_at_eof(&self) -> bool {
        self.finish_reason.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(frame: Frame) -> Option<String> {
        match frame {
            Frame::Text(t) => Some(t),
            _ => None,
        }
    }

    #[test]
    fn text_content_deltas_are_forwarded() {
        let mut dec = OpenAiStreamDecoder::new("openai");
        let a = dec.decode_line(r#"data: {"choices":[{"index":0,"delta":{"role":"assistant","content":"Hello"}}]}"#);
        let b = dec.decode_line(r#"data: {"choices":[{"index":0,"delta":{"content":" world"}}]}"#);
        assert_eq!(text_of(a).as_deref(), Some("Hello"));
        assert_eq!(text_of(b).as_deref(), Some(" world"));
        assert!(matches!(dec.decode_line("data: [DONE]"), Frame::Done));
    }

    #[test]
    fn tool_call_fragments_are_reassembled_per_index() {
        let mut dec = OpenAiStreamDecoder::new("openai");
        for line in [
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"read_file","arguments":""}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"id":"call_2","type":"function","function":{"name":"list_files","arguments":"{}"}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"file_path\":"}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"src/main.rs\"}"}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
        ] {
            assert!(matches!(dec.decode_line(line), Frame::Skip));
        }

        let terminal = dec.finish();
        let calls = terminal.tool_calls.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments["file_path"], "src/main.rs");
        assert_eq!(calls[1].name, "list_files");
        assert!(calls[1].arguments.is_empty());
        assert_eq!(terminal.stop_reason, Some(StopReason::ToolUse));
    }

    #[test]
    fn truncated_arguments_become_empty_map() {
        let mut dec = OpenAiStreamDecoder::new("openai");
        dec.decode_line(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"name":"read_file","arguments":"{\"file_"}}]}}]}"#);
        let calls = dec.finish().tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.is_empty());
    }

    #[test]
    fn eof_is_complete_only_after_finish_reason() {
        let mut dec = OpenAiStreamDecoder::new("openai");
        dec.decode_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#);
        assert!(!dec.complete_at_eof());
        dec.decode_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert!(dec.complete_at_eof());
    }

    #[test]
    fn malformed_payloads_and_comments_are_skipped() {
        let mut dec = OpenAiStreamDecoder::new("openai");
        assert!(matches!(dec.decode_line(": OPENROUTER PROCESSING"), Frame::Skip));
        assert!(matches!(dec.decode_line("data: {broken"), Frame::Skip));
        assert!(matches!(dec.decode_line("event: ping"), Frame::Skip));
        assert!(matches!(dec.decode_line("data:[DONE]"), Frame::Done));
    }

    #[test]
    fn in_stream_error_fails_the_stream() {
        let mut dec = OpenAiStreamDecoder::new("gateway");
        match dec.decode_line(r#"data: {"error":{"message":"upstream timeout","code":502}}"#) {
            Frame::Failed(err) => {
                assert_eq!(err.provider(), "gateway");
                assert!(err.to_string().contains("upstream timeout"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
