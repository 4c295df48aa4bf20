//! Newline-delimited JSON stream decoder for Ollama's `/api/chat`.
//!
//! Every line is a complete JSON record.  The last record carries
//! `"done": true`; tool calls arrive whole inside a record's
//! `message.tool_calls` array and are given synthesized ids.

use serde_json::Value;

use crate::error::ProviderError;
use crate::llm::streaming::{Frame, FrameDecoder, ToolCallAccumulator};
use crate::llm::types::{ChatChunk, StopReason, arguments_from_value};

#[derive(Debug)]
pub(crate) struct OllamaStreamDecoder {
    provider: String,
    tool_calls: ToolCallAccumulator,
    done_reason: Option<String>,
    /// Text carried by the final record itself.
    tail: String,
}

impl OllamaStreamDecoder {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            tool_calls: ToolCallAccumulator::default(),
            done_reason: None,
            tail: String::new(),
        }
    }
}

/// Whether an unparseable record still looks like the terminal one.
fn looks_terminal(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.contains("\"done\":true")
}

impl FrameDecoder for OllamaStreamDecoder {
    fn decode_line(&mut self, line: &str) -> Frame {
        let line = line.trim();
        if line.is_empty() {
            return Frame::Skip;
        }

        let v: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) if looks_terminal(line) => {
                tracing::warn!(provider = %self.provider, error = %e, "malformed final record, finishing stream");
                return Frame::Done;
            }
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "skipping unparseable stream record");
                return Frame::Skip;
            }
        };

        if let Some(err) = v["error"].as_str() {
            return Frame::Failed(ProviderError::request(self.provider.clone(), err));
        }

        let message = &v["message"];
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let index = self.tool_calls.next_index();
                let slot = self.tool_calls.slot(index);
                let func = &call["function"];
                slot.id = call["id"].as_str().unwrap_or_default().to_owned();
                slot.name = func["name"].as_str().unwrap_or_default().to_owned();
                slot.arguments = Some(arguments_from_value(&func["arguments"]));
            }
        }

        if v["done"].as_bool() == Some(true) {
            self.done_reason = v["done_reason"].as_str().map(String::from);
            if let Some(content) = message["content"].as_str() {
                self.tail.push_str(content);
            }
            return Frame::Done;
        }

        match message["content"].as_str() {
            Some(content) => Frame::Text(content.to_owned()),
            None => Frame::Skip,
        }
    }

    fn finish(&mut self) -> ChatChunk {
        let calls = self.tool_calls.take_calls();
        // Ollama reports "stop" even when the model asked for tools.
        let stop_reason = match self.done_reason.as_deref() {
            _ if !calls.is_empty() => StopReason::ToolUse,
            Some(reason) => StopReason::from_vendor(reason),
            None => StopReason::EndTurn,
        };
        ChatChunk {
            delta: std::mem::take(&mut self.tail),
            ..ChatChunk::terminal(calls, stop_reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_records_become_text() {
        let mut dec = OllamaStreamDecoder::new("ollama");
        let frame = dec.decode_line(
            r#"{"model":"llama3.1","message":{"role":"assistant","content":"Hel"},"done":false}"#,
        );
        assert!(matches!(frame, Frame::Text(t) if t == "Hel"));
    }

    #[test]
    fn done_record_finishes_with_tool_calls() {
        let mut dec = OllamaStreamDecoder::new("ollama");
        dec.decode_line(
            r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"read_file","arguments":{"file_path":"Cargo.toml"}}}]},"done":false}"#,
        );
        let frame = dec.decode_line(
            r#"{"message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#,
        );
        assert!(matches!(frame, Frame::Done));

        let terminal = dec.finish();
        assert!(terminal.delta.is_empty());
        let calls = terminal.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].arguments["file_path"], "Cargo.toml");
        assert_eq!(terminal.stop_reason, Some(StopReason::ToolUse));
    }

    #[test]
    fn final_record_content_is_kept() {
        let mut dec = OllamaStreamDecoder::new("ollama");
        dec.decode_line(r#"{"message":{"role":"assistant","content":"bye"},"done":true}"#);
        assert_eq!(dec.finish().delta, "bye");
    }

    #[test]
    fn malformed_terminal_record_is_honoured() {
        let mut dec = OllamaStreamDecoder::new("ollama");
        assert!(matches!(dec.decode_line(r#"{"done": true, "total_duration": "#), Frame::Done));
        assert!(matches!(dec.decode_line(r#"{"message": {"content": "#), Frame::Skip));
    }

    #[test]
    fn error_record_fails_the_stream() {
        let mut dec = OllamaStreamDecoder::new("ollama");
        match dec.decode_line(r#"{"error":"model requires more system memory"}"#) {
            Frame::Failed(err) => assert!(err.to_string().contains("system memory")),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
