use crate::channel::ChannelConfig;
use crate::messages::Message;
use faststr::FastStr;
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionsData {
    #[serde(rename = "model")]
    pub model_name:        FastStr,
    pub messages:          Vec<Message>,
    pub stream:            bool,
    pub temperature:       f32,
    pub max_tokens:        u32,
    pub top_p:             f32,
    pub frequency_penalty: f32,
    pub presence_penalty:  f32,
}

impl ChatCompletionsData {
    pub fn streaming(config: &ChannelConfig, messages: Vec<Message>) -> Self {
        let sampling = &config.sampling;
        Self {
            model_name: config.model.clone(),
            messages,
            stream: true,
            temperature: sampling.temperature,
            max_tokens: config.response_tokens,
            top_p: sampling.top_p,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
        }
    }
}

/// An accepted inbound chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub user_id:         i64,
    pub conversation_id: Option<FastStr>,
    pub message:         FastStr,
    pub model:           Option<FastStr>,
    pub channel:         Option<FastStr>,
}

/// The assembled outcome of a relay that ended with `Done`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResult {
    pub conversation_id: Option<FastStr>,
    pub first_id:        FastStr,
    pub message_id:      FastStr,
    pub text:            String,
}

/// Prior turns of a conversation, keyed in the history cache by the id of
/// the last assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub first_id: FastStr,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatLogRecord {
    pub user_id:         i64,
    pub conversation_id: Option<FastStr>,
    pub first_id:        FastStr,
    pub message_id:      FastStr,
    pub model:           FastStr,
    pub prompt:          FastStr,
    pub response:        String,
}

impl ChatLogRecord {
    pub fn new(request: &ChatRequest, result: &ChatResult, model: &FastStr) -> Self {
        Self {
            user_id:         request.user_id,
            conversation_id: result.conversation_id.clone(),
            first_id:        result.first_id.clone(),
            message_id:      result.message_id.clone(),
            model:           model.clone(),
            prompt:          request.message.clone(),
            response:        result.text.clone(),
        }
    }
}
