//! Incremental delivery of a single model reply
//!
//! Streaming bypasses the conversation loop: one call to the backend's
//! streaming interface, no tools. Every fragment becomes a [`StreamEvent`],
//! a backend failure becomes one `Error` event, and the sequence always
//! ends with exactly one `Done`.

use crate::client::{ChatBackend, ChatChunk, ChatRequest};
use crate::conversation::Role;
use futures::{Stream, StreamExt};
use std::sync::Arc;

/// One event of a streamed reply
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of the assistant message
    Delta {
        role: Role,
        content: String,
        /// Set on the final fragment only
        finish_reason: Option<String>,
    },
    /// The backend failed; no further deltas follow
    Error(String),
    /// End of stream, always last
    Done,
}

impl StreamEvent {
    /// Delta for a fragment, `None` when the fragment carries no message
    fn from_chunk(chunk: ChatChunk) -> Option<Self> {
        let message = chunk.message?;

        Some(StreamEvent::Delta {
            role: message.role,
            content: message.content,
            finish_reason: if chunk.done { chunk.done_reason } else { None },
        })
    }
}

/// Stream a reply for `request` as events, terminated by exactly one `Done`
pub fn stream_events(
    backend: Arc<dyn ChatBackend>,
    mut request: ChatRequest,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    request.tools = None;
    request.stream = true;

    async_stream::stream! {
        match backend.chat_stream(request).await {
            Ok(mut chunks) => {
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(chunk) => {
                            let done = chunk.done;
                            if let Some(event) = StreamEvent::from_chunk(chunk) {
                                yield event;
                            }
                            if done {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!("Model stream failed: {}", e);
                            yield StreamEvent::Error(e.to_string());
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!("Model stream could not start: {}", e);
                yield StreamEvent::Error(e.to_string());
            }
        }

        yield StreamEvent::Done;
    }
}
