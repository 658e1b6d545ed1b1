use async_stream::stream;
use bytes::Bytes;
use chrono::Timelike;
use common::data::{ChatRequest, ChatResult, Conversation};
use common::error::Result;
use common::stream::{FrameParser, StreamEvent};
use faststr::FastStr;
use futures_util::{Stream, StreamExt, pin_mut};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

/// Turns raw upstream chunks into `StreamEvent`s, yielding each one as soon
/// as its line is complete.
///
/// The output always ends with exactly one terminal event: `Done` from the
/// upstream, an upstream error frame, or a synthesized `Error` when the
/// transport fails, the upstream closes early or `deadline` passes. The
/// upstream stream is dropped as soon as a terminal event is produced or the
/// returned stream is dropped.
pub fn relay<S>(chunks: S, deadline: Instant) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = Result<Bytes>> + Send,
{
    stream! {
        let mut parser = FrameParser::new();
        pin_mut!(chunks);
        loop {
            let next = match timeout_at(deadline, chunks.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!("upstream deadline reached mid-stream");
                    if let Some(event) = parser.abort("upstream timed out") {
                        yield event;
                    }
                    break;
                }
            };

            match next {
                Some(Ok(bytes)) => {
                    for event in parser.feed(&bytes) {
                        yield event;
                    }
                    if parser.is_terminal() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "upstream transport failed mid-stream");
                    if let Some(event) = parser.abort(format!("upstream connection failed: {e}")) {
                        yield event;
                    }
                    break;
                }
                None => {
                    debug!("upstream closed");
                    for event in parser.finish() {
                        yield event;
                    }
                    break;
                }
            }
        }
    }
}

/// Accumulates deltas into a `ChatResult`.
#[derive(Debug)]
pub struct ChatResultBuilder {
    conversation_id: Option<FastStr>,
    first_id:        Option<FastStr>,
    message_id:      Option<FastStr>,
    text:            String,
}

impl ChatResultBuilder {
    pub fn new(request: &ChatRequest, conversation: Option<&Conversation>) -> Self {
        Self {
            conversation_id: request.conversation_id.clone(),
            first_id:        conversation.map(|c| c.first_id.clone()),
            message_id:      None,
            text:            String::new(),
        }
    }

    pub fn push(&mut self, event: &StreamEvent) {
        if let StreamEvent::Delta { id, text } = event {
            if self.message_id.is_none() {
                self.message_id = id.clone();
            }
            self.text.push_str(text);
        }
    }

    /// Finalizes the result once the upstream sent `Done`. Upstreams that
    /// never sent an id get a generated one.
    pub fn finish(self, final_id: Option<FastStr>) -> ChatResult {
        let message_id = self
            .message_id
            .or(final_id)
            .unwrap_or_else(generate_completion_id);
        ChatResult {
            conversation_id: self.conversation_id,
            first_id: self.first_id.unwrap_or_else(|| message_id.clone()),
            message_id,
            text: self.text,
        }
    }
}

#[inline]
pub fn generate_completion_id() -> FastStr {
    let now = chrono::Utc::now();
    format!("chatcmpl-{}{:09}", now.timestamp(), now.nanosecond()).into()
}
