use faststr::FastStr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Assistant,
    User,
}

impl MessageRole {
    pub fn is_system(&self) -> bool {
        matches!(self, MessageRole::System)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    pub role:    MessageRole,
    pub content: FastStr,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<FastStr>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<FastStr>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<FastStr>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<FastStr>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Rough token estimate: one token per character. Close enough for CJK
    /// text and conservative for latin text.
    pub fn estimated_tokens(&self) -> u32 {
        u32::try_from(self.content.chars().count()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_as_openai_shape() {
        let message = Message::user("失眠怎么办？");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "失眠怎么办？");
    }

    #[test]
    fn test_estimated_tokens_counts_chars() {
        assert_eq!(Message::user("你好").estimated_tokens(), 2);
        assert_eq!(Message::system("").estimated_tokens(), 0);
    }
}
