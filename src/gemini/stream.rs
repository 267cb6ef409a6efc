//! Server-sent-event decoding for `streamGenerateContent?alt=sse`.

use crate::error::{Result, StudioError};
use crate::gemini::types::GenerateContentResponse;
use base64::Engine;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;

/// One usable item pulled out of a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseChunk {
    /// Decoded image bytes.
    Image {
        /// MIME type reported by the API.
        mime_type: String,
        /// Raw image bytes.
        data: Vec<u8>,
    },
    /// Incidental text emitted alongside (or instead of) an image.
    Text(String),
}

/// Error object Gemini emits in-stream when a request fails mid-way.
#[derive(Debug, Deserialize)]
struct StreamError {
    error: StreamErrorBody,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

/// Incremental decoder turning SSE bytes into response objects.
///
/// Bytes may be split anywhere, including inside a UTF-8 sequence; only
/// complete lines are interpreted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    // Prefix of `buf` already known to hold no newline.
    scanned: usize,
    data: Vec<String>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<GenerateContentResponse>> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                events.extend(self.dispatch());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // Comments, `event:` and `id:` lines carry nothing we use.
        }
        self.scanned = self.buf.len();

        events
    }

    /// Flushes a trailing event not followed by a blank line.
    pub fn finish(&mut self) -> Vec<Result<GenerateContentResponse>> {
        let mut events = Vec::new();
        if !self.buf.is_empty() {
            events.extend(self.push(b"\n"));
        }
        events.extend(self.dispatch());
        events
    }

    fn dispatch(&mut self) -> Option<Result<GenerateContentResponse>> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();

        if payload.trim().is_empty() {
            return None;
        }
        Some(parse_event(&payload))
    }
}

fn parse_event(payload: &str) -> Result<GenerateContentResponse> {
    if let Ok(err) = serde_json::from_str::<StreamError>(payload) {
        return Err(StudioError::Api {
            status: err.error.code,
            message: err.error.message,
        });
    }
    serde_json::from_str(payload)
        .map_err(|e| StudioError::Decode(format!("malformed stream event: {e}")))
}

/// Splits one response object into image and text chunks.
///
/// A blocked prompt or candidate yields a single `ContentBlocked` error.
pub fn chunks_from_response(response: &GenerateContentResponse) -> Vec<Result<ResponseChunk>> {
    let parts = response.parts();
    if parts.is_empty() {
        if let Some(reason) = response.block_reason() {
            return vec![Err(StudioError::ContentBlocked(reason))];
        }
        return Vec::new();
    }

    parts
        .iter()
        .filter_map(|part| {
            if let Some(inline) = &part.inline_data {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(&inline.data)
                    .map(|data| ResponseChunk::Image {
                        mime_type: inline.mime_type.clone(),
                        data,
                    })
                    .map_err(|e| StudioError::Decode(e.to_string()));
                return Some(decoded);
            }
            part.text
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|t| Ok(ResponseChunk::Text(t.clone())))
        })
        .collect()
}

/// Lazy, finite sequence of chunks from one streamed call.
///
/// Consumers call [`ChunkStream::next_chunk`] until it returns `None`. After
/// the first transport error the stream ends.
pub struct ChunkStream {
    responses: BoxStream<'static, Result<GenerateContentResponse>>,
    pending: VecDeque<Result<ResponseChunk>>,
    failed: bool,
}

impl ChunkStream {
    /// Wraps a stream of already-parsed response objects.
    pub fn new<S>(responses: S) -> Self
    where
        S: Stream<Item = Result<GenerateContentResponse>> + Send + 'static,
    {
        Self {
            responses: responses.boxed(),
            pending: VecDeque::new(),
            failed: false,
        }
    }

    /// Builds a stream that yields the given responses in order.
    pub fn from_responses(responses: Vec<GenerateContentResponse>) -> Self {
        Self::new(stream::iter(responses.into_iter().map(Ok)))
    }

    /// Decodes an SSE byte stream as returned by `reqwest::Response::bytes_stream`.
    pub fn from_sse<S, B>(bytes: S) -> Self
    where
        S: Stream<Item = reqwest::Result<B>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
    {
        struct State {
            bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
            decoder: SseDecoder,
            ready: VecDeque<Result<GenerateContentResponse>>,
            done: bool,
        }

        let state = State {
            bytes: bytes.map(|r| r.map(|b| b.as_ref().to_vec())).boxed(),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            done: false,
        };

        let responses = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.ready.pop_front() {
                    return Some((item, state));
                }
                if state.done {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(bytes)) => {
                        let events = state.decoder.push(&bytes);
                        state.ready.extend(events);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(StudioError::Network(e)), state));
                    }
                    None => {
                        state.done = true;
                        let events = state.decoder.finish();
                        state.ready.extend(events);
                    }
                }
            }
        });

        Self::new(responses)
    }

    /// Returns the next chunk, `None` once the stream is exhausted.
    pub async fn next_chunk(&mut self) -> Option<Result<ResponseChunk>> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(chunk);
            }
            if self.failed {
                return None;
            }
            match self.responses.next().await? {
                Ok(response) => self.pending.extend(chunks_from_response(&response)),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("pending", &self.pending.len())
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::types::{Blob, Candidate, Content, Part, Role};

    fn text_event(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":\"{text}\"}}]}}}}]}}\r\n\r\n"
        )
    }

    fn image_response(data: &[u8]) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content::new(
                    Role::Model,
                    vec![Part {
                        inline_data: Some(Blob {
                            mime_type: "image/png".into(),
                            data: base64::engine::general_purpose::STANDARD.encode(data),
                        }),
                        ..Part::default()
                    }],
                )),
                finish_reason: None,
            }],
            prompt_feedback: None,
        }
    }

    #[test]
    fn test_decoder_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(text_event("hi").as_bytes());
        assert_eq!(events.len(), 1);
        let resp = events.into_iter().next().unwrap().unwrap();
        assert_eq!(resp.text().as_deref(), Some("hi"));
    }

    #[test]
    fn test_decoder_handles_split_bytes() {
        let raw = format!("{}{}", text_event("one"), text_event("two"));
        let bytes = raw.as_bytes();
        let mut decoder = SseDecoder::new();
        let mut texts = Vec::new();

        for piece in bytes.chunks(7) {
            for event in decoder.push(piece) {
                texts.push(event.unwrap().text().unwrap());
            }
        }
        assert!(decoder.finish().is_empty());
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_decoder_long_line_in_small_pieces() {
        let image = vec![0xABu8; 150_000];
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image);
        let raw = format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"inlineData\":{{\"mimeType\":\"image/png\",\"data\":\"{encoded}\"}}}}]}}}}]}}\n\n"
        );
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();

        for piece in raw.as_bytes().chunks(512) {
            events.extend(decoder.push(piece));
            assert_eq!(decoder.scanned, decoder.buf.len());
        }
        assert!(decoder.buf.is_empty());
        assert_eq!(events.len(), 1);

        let response = events.pop().unwrap().unwrap();
        let chunks = chunks_from_response(&response);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ResponseChunk::Image {
                mime_type: "image/png".into(),
                data: image,
            }
        );
    }

    #[test]
    fn test_decoder_flushes_trailing_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"candidates\":[]}");
        assert!(events.is_empty());
        let events = decoder.finish();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[test]
    fn test_decoder_ignores_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_decoder_surfaces_error_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .push(b"data: {\"error\":{\"code\":500,\"message\":\"Internal error\"}}\n\n");
        match events.into_iter().next().unwrap() {
            Err(StudioError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "Internal error");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: not json\n\n");
        assert!(matches!(events[0], Err(StudioError::Decode(_))));
    }

    #[test]
    fn test_chunks_from_image_response() {
        let chunks = chunks_from_response(&image_response(b"\x89PNG"));
        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            Ok(ResponseChunk::Image { mime_type, data }) => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data, b"\x89PNG");
            }
            other => panic!("expected image chunk, got {other:?}"),
        }
    }

    #[test]
    fn test_chunks_skip_empty_response() {
        let chunks = chunks_from_response(&GenerateContentResponse::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunks_blocked_response() {
        let resp: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        let chunks = chunks_from_response(&resp);
        assert!(matches!(chunks[0], Err(StudioError::ContentBlocked(_))));
    }

    #[test]
    fn test_chunks_bad_base64() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "***"}}]}}]}"#,
        )
        .unwrap();
        let chunks = chunks_from_response(&resp);
        assert!(matches!(chunks[0], Err(StudioError::Decode(_))));
    }

    #[tokio::test]
    async fn test_chunk_stream_from_responses() {
        let text: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Here you go"}]}}]}"#,
        )
        .unwrap();
        let mut stream = ChunkStream::from_responses(vec![
            text,
            GenerateContentResponse::default(),
            image_response(b"abc"),
        ]);

        assert_eq!(
            stream.next_chunk().await.unwrap().unwrap(),
            ResponseChunk::Text("Here you go".into())
        );
        assert!(matches!(
            stream.next_chunk().await.unwrap().unwrap(),
            ResponseChunk::Image { .. }
        ));
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_chunk_stream_from_sse_bytes() {
        let raw = text_event("streamed");
        let (head, tail) = raw.as_bytes().split_at(10);
        let bytes = stream::iter(vec![
            Ok::<Vec<u8>, reqwest::Error>(head.to_vec()),
            Ok(tail.to_vec()),
        ]);
        let mut chunks = ChunkStream::from_sse(bytes);

        assert_eq!(
            chunks.next_chunk().await.unwrap().unwrap(),
            ResponseChunk::Text("streamed".into())
        );
        assert!(chunks.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_chunk_stream_stops_after_error() {
        let mut chunks = ChunkStream::new(stream::iter(vec![
            Err(StudioError::Decode("boom".into())),
            Ok(image_response(b"abc")),
        ]));
        assert!(chunks.next_chunk().await.unwrap().is_err());
        assert!(chunks.next_chunk().await.is_none());
    }
}
