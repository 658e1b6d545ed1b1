use crate::channel::ChannelConfig;
use crate::data::ChatCompletionsData;
use crate::error::Result;
use crate::messages::Message;
use faststr::FastStr;
use serde_json::Value;

/// A prepared streaming `chat/completions` call, independent of the http
/// client that sends it.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url:     String,
    pub api_key: FastStr,
    pub body:    Value,
}

impl UpstreamRequest {
    pub fn chat_completions(config: &ChannelConfig, messages: Vec<Message>) -> Result<Self> {
        let body = serde_json::to_value(ChatCompletionsData::streaming(config, messages))?;
        Ok(Self {
            url: config.completions_url(),
            api_key: config.api_key.clone(),
            body,
        })
    }

    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}
