use crate::error::{Error, Result};
use common::data::ChatRequest;
use faststr::FastStr;
use serde::{Deserialize, Deserializer};

/// Chats without a signed-in member are billed to the guest account.
pub const GUEST_USER_ID: i64 = 1;

/// Body of `POST /openai/chat-process`, sent either as JSON or as a
/// url-encoded form.
#[derive(Default, Debug, Clone, Deserialize)]
pub struct ChatProcessRequest {
    pub message:         FastStr,
    #[serde(default)]
    pub conversation_id: Option<FastStr>,
    // forms carry it as text
    #[serde(default, deserialize_with = "lenient_i64")]
    pub user_id:         Option<i64>,
    #[serde(default)]
    pub model:           Option<FastStr>,
    #[serde(default)]
    pub channel:         Option<FastStr>,
}

impl ChatProcessRequest {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let json_err = match serde_json::from_slice::<Self>(body) {
            Ok(req) => return Ok(req),
            Err(e) => e,
        };
        serde_urlencoded::from_bytes::<Self>(body)
            .map_err(|form_err| Error::InvalidRequestBody(format!("not json ({json_err}) nor form ({form_err})").into()))
    }

    pub fn into_chat_request(self) -> ChatRequest {
        ChatRequest {
            user_id:         self.user_id.unwrap_or(GUEST_USER_ID),
            conversation_id: non_empty(self.conversation_id),
            message:         self.message,
            model:           non_empty(self.model),
            channel:         non_empty(self.channel),
        }
    }
}

fn non_empty(value: Option<FastStr>) -> Option<FastStr> {
    value.filter(|v| !v.trim().is_empty())
}

fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(i64),
        Text(String),
    }

    Ok(
        match Option::<NumberOrText>::deserialize(deserializer)? {
            Some(NumberOrText::Number(n)) => Some(n),
            Some(NumberOrText::Text(s)) => s.trim().parse().ok(),
            None => None,
        },
    )
}
