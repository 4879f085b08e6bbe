//! Server-sent event decoding for streaming chat completions.
//!
//! [`SseDecoder`] is a push parser: feed it body chunks as they arrive and it returns every
//! complete `data:` frame. Lines are split at the byte level, so a multi-byte character that
//! straddles two chunks is reassembled before it is decoded.
//!
//! [`decode_stream`] wraps a response body stream and yields one JSON value per frame, ending at
//! the `[DONE]` sentinel or at end of body.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use log::{debug, warn};
use serde_json::Value;

use crate::error::ClientError;

const DATA_PREFIX: &[u8] = b"data:";
const DONE_SENTINEL: &[u8] = b"[DONE]";

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A `data:` line carrying a JSON payload.
    Data(Value),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental SSE line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    done: bool,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            done: false,
        }
    }

    /// Whether the `[DONE]` sentinel has been seen.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Appends `chunk` and returns the frames completed by it.
    ///
    /// A trailing partial line stays buffered. Nothing is returned after `[DONE]`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            if let Some(frame) = self.decode_line(&line[..pos]) {
                frames.push(frame);
                if self.done {
                    self.buffer.clear();
                    break;
                }
            }
        }
        frames
    }

    /// Flushes the final unterminated line at end of body.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.done || self.buffer.is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        let remaining = self.buffer.split();
        self.decode_line(&remaining).into_iter().collect()
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<SseFrame> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let rest = line.strip_prefix(DATA_PREFIX)?;
        let payload = rest.strip_prefix(b" ").unwrap_or(rest).trim_ascii();

        if payload.is_empty() {
            return None;
        }
        if payload == DONE_SENTINEL {
            self.done = true;
            return Some(SseFrame::Done);
        }

        match serde_json::from_slice::<Value>(payload) {
            Ok(value) => Some(SseFrame::Data(value)),
            Err(e) => {
                warn!(
                    "Skipping malformed SSE frame ({e}): {}",
                    String::from_utf8_lossy(payload)
                );
                None
            }
        }
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
    finished: bool,
}

/// Decodes a response body into a stream of JSON event payloads.
///
/// The stream ends after `[DONE]` or at end of body. A transport error is yielded once and ends
/// the stream. Dropping the returned stream drops `body`.
pub fn decode_stream<S, B, E>(body: S) -> impl Stream<Item = Result<Value, ClientError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: Buf + Send,
    E: Into<ClientError> + Send,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            match state.pending.pop_front() {
                Some(SseFrame::Data(value)) => return Some((Ok(value), state)),
                Some(SseFrame::Done) => {
                    debug!("SSE stream reached [DONE]");
                    return None;
                }
                None if state.finished => return None,
                None => {}
            }

            match state.body.next().await {
                Some(Ok(mut chunk)) => {
                    while chunk.has_remaining() {
                        let frames = state.decoder.feed(chunk.chunk());
                        let consumed = chunk.chunk().len();
                        chunk.advance(consumed);
                        state.pending.extend(frames);
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    debug!("SSE body ended without [DONE]");
                    state.finished = true;
                    let frames = state.decoder.finish();
                    state.pending.extend(frames);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use bytes::Bytes;
    use serde_json::json;

    use super::*;

    fn body(chunks: Vec<&'static str>) -> impl Stream<Item = Result<Bytes, ClientError>> + Send {
        futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes()))),
        )
    }

    #[test]
    fn test_decodes_data_lines_and_done() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: {\"a\":1}\n\ndata: [DONE]\n\n");

        assert_eq!(frames, vec![SseFrame::Data(json!({"a": 1})), SseFrame::Done]);
        assert!(decoder.is_done());
        assert!(decoder.feed(b"data: {\"b\":2}\n").is_empty());
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"con").is_empty());
        assert_eq!(
            decoder.feed(b"tent\":\"hi\"}\n"),
            vec![SseFrame::Data(json!({"content": "hi"}))]
        );
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "data: {\"t\":\"héllo\"}\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xc3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&text[..split]).is_empty());
        assert_eq!(
            decoder.feed(&text[split..]),
            vec![SseFrame::Data(json!({"t": "héllo"}))]
        );
    }

    #[test]
    fn test_ignores_non_data_lines_and_crlf() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(
            b": keep-alive\r\nevent: message\r\nid: 7\r\nretry: 1000\r\ndata:{\"x\":true}\r\n\r\n",
        );
        assert_eq!(frames, vec![SseFrame::Data(json!({"x": true}))]);
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: {not json}\ndata: {\"ok\":1}\n");
        assert_eq!(frames, vec![SseFrame::Data(json!({"ok": 1}))]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"last\":1}").is_empty());
        assert_eq!(decoder.finish(), vec![SseFrame::Data(json!({"last": 1}))]);
        assert!(decoder.finish().is_empty());
    }

    #[tokio::test]
    async fn test_decode_stream_stops_at_done() {
        let values: Vec<_> = decode_stream(body(vec![
            "data: {\"n\":1}\n",
            "\ndata: {\"n\":2}\n\ndata: [DO",
            "NE]\n\ndata: {\"n\":3}\n\n",
        ]))
        .collect()
        .await;

        let values: Vec<Value> = values.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[tokio::test]
    async fn test_decode_stream_without_done_ends_normally() {
        let values: Vec<_> = decode_stream(body(vec!["data: {\"n\":1}\n\ndata: {\"n\":2}"]))
            .collect()
            .await;

        assert_eq!(values.len(), 2);
        assert!(values.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn test_decode_stream_surfaces_transport_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n")),
            Err(ClientError::TimeoutError),
            Ok(Bytes::from_static(b"data: {\"n\":2}\n")),
        ];
        let items: Vec<_> = decode_stream(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(ClientError::TimeoutError)));
    }
}
