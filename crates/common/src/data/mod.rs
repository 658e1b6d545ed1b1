mod chat;
mod request;

pub use chat::{ChatCompletionsData, ChatLogRecord, ChatRequest, ChatResult, Conversation};
pub use request::UpstreamRequest;
