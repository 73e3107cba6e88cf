//! Server-sent-event decoding shared by all provider adapters.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::llm_client::error::GatewayError;
use crate::llm_client::FragmentStream;

/// One decoded `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseData {
    Payload(String),
    Done,
}

/// Incremental line splitter. Bytes are buffered until a newline arrives so a
/// multi-byte character split across network chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseData> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = parse_line(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<SseData> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line).into_iter().collect()
    }
}

fn parse_line(raw: &[u8]) -> Option<SseData> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == "[DONE]" {
        Some(SseData::Done)
    } else if data.trim().is_empty() {
        None
    } else {
        Some(SseData::Payload(data.to_string()))
    }
}

/// Maps one `data:` payload to a text fragment, nothing, or a failure.
pub type FragmentExtractor = fn(&str) -> Result<Option<String>, GatewayError>;

struct StreamState {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<SseData>,
    extract: FragmentExtractor,
    cancel: CancellationToken,
    exhausted: bool,
    finished: bool,
}

/// Turns a streaming SSE response into a stream of text fragments.
///
/// The stream ends at `[DONE]`, at end of body, after the first error, or as
/// soon as `cancel` fires. Empty fragments are skipped.
pub fn fragment_stream(
    response: reqwest::Response,
    cancel: CancellationToken,
    extract: FragmentExtractor,
) -> FragmentStream {
    decode_fragments(response.bytes_stream().boxed(), cancel, extract)
}

pub(crate) fn decode_fragments(
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    cancel: CancellationToken,
    extract: FragmentExtractor,
) -> FragmentStream {
    let state = StreamState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        extract,
        cancel,
        exhausted: false,
        finished: false,
    };

    let stream = stream::unfold(state, |mut st| async move {
        loop {
            if st.finished || st.cancel.is_cancelled() {
                return None;
            }

            if let Some(data) = st.pending.pop_front() {
                match data {
                    SseData::Done => return None,
                    SseData::Payload(payload) => match (st.extract)(&payload) {
                        Ok(Some(text)) if !text.is_empty() => return Some((Ok(text), st)),
                        Ok(_) => continue,
                        Err(e) => {
                            st.finished = true;
                            return Some((Err(e), st));
                        }
                    },
                }
            }

            if st.exhausted {
                return None;
            }

            let next = tokio::select! {
                biased;
                _ = st.cancel.cancelled() => return None,
                next = st.bytes.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    let decoded = st.decoder.push(&bytes);
                    st.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(GatewayError::from(e)), st));
                }
                None => {
                    let rest = st.decoder.finish();
                    st.pending.extend(rest);
                    st.exhausted = true;
                }
            }
        }
    });

    Box::pin(stream)
}
