pub mod chat_openai;

use crate::{channel::ChannelConfig, error::Result, messages::Message};
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// Raw response body of a streaming completion, chunked as the socket
/// delivers it. Single pass; dropping it closes the upstream connection.
pub type ByteChunks = BoxStream<'static, Result<Bytes>>;

pub trait Upstream: Send + Sync {
    fn stream_chat_completion(
        &self,
        config: &ChannelConfig,
        messages: Vec<Message>,
    ) -> impl Future<Output = Result<ByteChunks>> + Send;
}
