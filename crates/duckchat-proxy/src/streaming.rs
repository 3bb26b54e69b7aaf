//! Client-facing event stream.
//!
//! Reads backend payloads one at a time and emits OpenAI-style chunks:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"He"}}]}
//!
//! data: {"choices":[{"delta":{"content":""},"finish_reason":"stop"}]}
//!
//! data: [DONE]
//!
//! ```
//!
//! The stop chunk and `[DONE]` are always emitted once the backend stream ends,
//! whether it completed or ran out of retries.

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::{debug, info};

use crate::backend::LineStream;
use crate::sse::{self, DONE_FRAME};
use crate::translation::extract_content;
use crate::types::ChatCompletionChunk;

/// Logs a client disconnect if the stream is dropped before `[DONE]`.
struct DisconnectGuard {
    model: String,
    finished: bool,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            debug!(model = %self.model, "client disconnected mid-stream, backend call cancelled");
        }
    }
}

/// Build the SSE body for one completion.
pub fn completion_stream(
    mut lines: LineStream,
    model: String,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream! {
        let mut guard = DisconnectGuard { model, finished: false };
        let mut transcript = String::new();

        while let Some(raw) = lines.next().await {
            let content = extract_content(&raw);
            if content.is_empty() {
                continue;
            }
            transcript.push_str(&content);
            yield Ok(Bytes::from(delta_frame(&content)));
        }

        yield Ok(Bytes::from(stop_frame()));
        yield Ok(Bytes::from_static(DONE_FRAME.as_bytes()));

        guard.finished = true;
        info!(model = %guard.model, chars = transcript.chars().count(), "completion finished");
        debug!(model = %guard.model, %transcript, "completion transcript");
    }
}

pub fn delta_frame(content: &str) -> String {
    frame(&ChatCompletionChunk::delta(content))
}

pub fn stop_frame() -> String {
    frame(&ChatCompletionChunk::stop())
}

fn frame(chunk: &ChatCompletionChunk<'_>) -> String {
    // Chunks are plain strings and static markers; serialization cannot fail.
    sse::encode_frame(chunk).unwrap_or_default()
}
