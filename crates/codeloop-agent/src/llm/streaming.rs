//! Vendor-neutral streaming machinery.
//!
//! Every supported vendor streams line-oriented frames (SSE `event:`/`data:`
//! lines, or newline-delimited JSON records).  [`decode_frames`] splits the
//! raw byte stream into lines and hands each line to a vendor-specific
//! [`FrameDecoder`], turning the result into a lazy [`ChatStream`].
//!
//! Tool-call arguments arrive in fragments; [`ToolCallAccumulator`] collects
//! them per call slot and only releases whole calls on the terminal chunk.

use std::collections::BTreeMap;
use std::fmt::Display;

use futures::stream::{self, Stream, StreamExt};

use crate::error::ProviderError;
use crate::llm::provider::ChatStream;
use crate::llm::types::{
    ChatChunk, ChatResponse, ChatToolCall, StopReason, ToolArguments, arguments_from_str,
};

// ---------------------------------------------------------------------------
// Frame decoding
// ---------------------------------------------------------------------------

/// Outcome of decoding a single line of a vendor stream.
#[derive(Debug)]
pub(crate) enum Frame {
    /// Nothing to emit (keepalive, bookkeeping event, unparseable fragment).
    Skip,
    /// A text fragment to forward.
    Text(String),
    /// The vendor's completion marker.
    Done,
    /// The vendor reported an error inside the stream.
    Failed(ProviderError),
}

/// Vendor-specific, stateful line decoder.
pub(crate) trait FrameDecoder: Send + 'static {
    /// Decode one line (trailing newline already stripped).
    fn decode_line(&mut self, line: &str) -> Frame;

    /// Build the terminal chunk from everything accumulated so far.
    fn finish(&mut self) -> ChatChunk;

    /// Whether reaching end-of-body without the completion marker still
    /// counts as a complete response.
    fn complete_at_eof(&self) -> bool {
        false
    }
}

struct DecodeState<S, D> {
    provider: String,
    bytes: S,
    decoder: D,
    buffer: Vec<u8>,
    /// The byte stream has returned `None` and must not be polled again.
    eof: bool,
    finished: bool,
}

impl<S, D: FrameDecoder> DecodeState<S, D> {
    /// Pop the next complete line from the buffer, if any.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(line_from_bytes(&raw))
    }

    /// Turn one decoded frame into the item to emit, if any.
    fn emit(&mut self, frame: Frame) -> Option<Result<ChatChunk, ProviderError>> {
        match frame {
            Frame::Skip => None,
            Frame::Text(t) if t.is_empty() => None,
            Frame::Text(t) => Some(Ok(ChatChunk::text(t))),
            Frame::Done => {
                self.finished = true;
                Some(Ok(self.decoder.finish()))
            }
            Frame::Failed(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn line_from_bytes(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.trim_end_matches(['\n', '\r']).to_owned()
}

/// Turn a raw byte stream into a lazy stream of [`ChatChunk`]s.
///
/// The returned stream ends after the terminal chunk.  A transport failure,
/// an in-stream vendor error, or end-of-body before the completion marker
/// each yield a single `Err` item and end the stream.
pub(crate) fn decode_frames<S, B, E, D>(provider: String, bytes: S, decoder: D) -> ChatStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + 'static,
    E: Display + 'static,
    D: FrameDecoder,
{
    let state = DecodeState {
        provider,
        bytes,
        decoder,
        buffer: Vec::new(),
        eof: false,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }
        loop {
            while let Some(line) = st.next_line() {
                let frame = st.decoder.decode_line(&line);
                if let Some(item) = st.emit(frame) {
                    return Some((item, st));
                }
            }

            let next = if st.eof { None } else { st.bytes.next().await };
            match next {
                Some(Ok(chunk)) => st.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    let err = ProviderError::request(
                        st.provider.clone(),
                        format!("stream read error: {e}"),
                    );
                    return Some((Err(err), st));
                }
                None => {
                    st.eof = true;
                    // Flush a final line that had no trailing newline.
                    if !st.buffer.is_empty() {
                        let raw = std::mem::take(&mut st.buffer);
                        let frame = st.decoder.decode_line(&line_from_bytes(&raw));
                        if let Some(item) = st.emit(frame) {
                            return Some((item, st));
                        }
                    }

                    st.finished = true;
                    if st.decoder.complete_at_eof() {
                        return Some((Ok(st.decoder.finish()), st));
                    }
                    let err = ProviderError::request(
                        st.provider.clone(),
                        "stream ended before the completion marker",
                    );
                    return Some((Err(err), st));
                }
            }
        }
    })
    .boxed()
}

// ---------------------------------------------------------------------------
// Tool-call reassembly
// ---------------------------------------------------------------------------

/// A tool call being assembled from stream fragments.
#[derive(Debug, Default)]
pub(crate) struct PartialToolCall {
    pub id: String,
    pub name: String,
    /// Concatenated argument JSON fragments.
    pub arguments_json: String,
    /// Arguments delivered whole (vendors that do not fragment them).
    pub arguments: Option<ToolArguments>,
}

/// Collects tool-call fragments keyed by the vendor's call-slot index.
#[derive(Debug, Default)]
pub(crate) struct ToolCallAccumulator {
    slots: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    /// The slot at `index`, created on first use.
    pub fn slot(&mut self, index: usize) -> &mut PartialToolCall {
        self.slots.entry(index).or_default()
    }

    /// Whether a slot exists at `index`.
    #[cfg(test)]
    pub fn contains(&self, index: usize) -> bool {
        self.slots.contains_key(&index)
    }

    /// Number of the next unused slot.
    pub fn next_index(&self) -> usize {
        self.slots.keys().next_back().map_or(0, |i| i + 1)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Release every call in slot order, parsing the accumulated arguments.
    pub fn take_calls(&mut self) -> Vec<ChatToolCall> {
        std::mem::take(&mut self.slots)
            .into_values()
            .filter(|slot| !slot.name.is_empty())
            .map(|slot| {
                let arguments = slot
                    .arguments
                    .unwrap_or_else(|| arguments_from_str(&slot.arguments_json));
                let id = if slot.id.is_empty() {
                    ChatToolCall::synthesize_id()
                } else {
                    slot.id
                };
                ChatToolCall::new(id, slot.name, arguments)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Collecting
// ---------------------------------------------------------------------------

/// Drain a [`ChatStream`] into a [`ChatResponse`], forwarding every
/// non-empty delta to `on_token` as it arrives.
pub async fn collect_stream(
    mut stream: ChatStream,
    mut on_token: impl FnMut(&str) + Send,
) -> Result<ChatResponse, ProviderError> {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut stop_reason = StopReason::EndTurn;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.delta.is_empty() {
            on_token(&chunk.delta);
            text.push_str(&chunk.delta);
        }
        if let Some(reason) = chunk.stop_reason {
            stop_reason = reason;
        }
        if let Some(calls) = chunk.tool_calls {
            tool_calls = calls;
            break;
        }
    }

    Ok(ChatResponse::new(text, tool_calls, stop_reason))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
