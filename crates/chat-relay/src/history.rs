use common::channel::ChannelConfig;
use common::data::{ChatResult, Conversation};
use common::messages::Message;
use storage::ConversationCache;
use storage::cache::KVCache;
use tracing::debug;

/// Stored turns per conversation are capped; older ones would be trimmed
/// from every prompt anyway.
const MAX_STORED_MESSAGES: usize = 40;

#[derive(Clone, Default)]
pub struct History {
    cache: ConversationCache,
}

impl History {
    pub async fn load(&self, conversation_id: &str) -> Option<Conversation> {
        let conversation = self.cache.get(conversation_id).await;
        if conversation.is_none() {
            debug!(conversation_id = %conversation_id, "unknown or expired conversation, starting fresh");
        }
        conversation
    }

    /// Records a finished turn under the new message id, which the client
    /// sends back as `conversation_id` for its next message.
    pub async fn store(&self, previous: Option<Conversation>, prompt: &Message, result: &ChatResult) {
        let mut messages = previous.map(|c| c.messages).unwrap_or_default();
        messages.push(prompt.clone());
        messages.push(Message::assistant(result.text.clone()));
        if messages.len() > MAX_STORED_MESSAGES {
            messages.drain(..messages.len() - MAX_STORED_MESSAGES);
        }

        let conversation = Conversation {
            first_id: result.first_id.clone(),
            messages,
        };
        self.cache.set(&result.message_id, conversation).await;
    }
}

/// Builds the upstream message list: system prompt, as much history as fits
/// the prompt budget, then the new user message. History is dropped a whole
/// user/assistant turn at a time, oldest first. The system prompt and the new
/// message are always sent.
pub fn assemble_messages(
    config: &ChannelConfig,
    conversation: Option<&Conversation>,
    prompt: &Message,
) -> Vec<Message> {
    let system = config
        .system_prompt
        .as_ref()
        .map(|p| Message::system(p.clone()));

    let mut remaining = config
        .prompt_budget()
        .saturating_sub(prompt.estimated_tokens())
        .saturating_sub(system.as_ref().map_or(0, Message::estimated_tokens));

    let history = conversation.map(|c| c.messages.as_slice()).unwrap_or_default();
    let mut kept = 0;
    for turn in history.rchunks(2) {
        let cost = turn
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(m.estimated_tokens()));
        if cost > remaining {
            break;
        }
        remaining -= cost;
        kept += turn.len();
    }

    let mut messages = Vec::with_capacity(kept + 2);
    messages.extend(system);
    messages.extend(history[history.len() - kept..].iter().cloned());
    messages.push(prompt.clone());
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::channel::{Channel, DEFAULT_TIMEOUT, SamplingParams};
    use common::messages::MessageRole;

    fn config(system_prompt: Option<&'static str>, context: u32, response: u32) -> ChannelConfig {
        ChannelConfig {
            channel:         Channel::OpenAi,
            api_key:         "sk".into(),
            host:            "https://api.openai.com".into(),
            proxy_host:      None,
            model:           "gpt-3.5-turbo".into(),
            context_tokens:  context,
            response_tokens: response,
            system_prompt:   system_prompt.map(Into::into),
            sampling:        SamplingParams::default(),
            timeout:         DEFAULT_TIMEOUT,
        }
    }

    fn conversation() -> Conversation {
        Conversation {
            first_id: "m0".into(),
            messages: vec![
                Message::user("aaaa"),
                Message::assistant("bbbb"),
                Message::user("cccc"),
                Message::assistant("dddd"),
            ],
        }
    }

    #[test]
    fn test_order_system_history_prompt() {
        let messages = assemble_messages(
            &config(Some("sys"), 4000, 1000),
            Some(&conversation()),
            &Message::user("new"),
        );
        let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
            ]
        );
        assert_eq!(messages[0].content, "sys");
        assert_eq!(messages[5].content, "new");
    }

    #[test]
    fn test_no_system_prompt_no_history() {
        let messages = assemble_messages(&config(None, 4000, 1000), None, &Message::user("hi"));
        assert_eq!(messages, vec![Message::user("hi")]);
    }

    #[test]
    fn test_history_trimmed_oldest_first() {
        // budget 20 - prompt 3 - system 3 = 14: one 8-char turn fits, the
        // older turn would leave its assistant half orphaned
        let messages = assemble_messages(
            &config(Some("sys"), 30, 10),
            Some(&conversation()),
            &Message::user("new"),
        );
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "cccc", "dddd", "new"]);
        assert_eq!(messages[1].role, MessageRole::User);
    }

    #[test]
    fn test_oversized_prompt_still_sent() {
        let messages = assemble_messages(
            &config(Some("sys"), 10, 8),
            Some(&conversation()),
            &Message::user("a very long question"),
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[0].role.is_system());
    }

    #[tokio::test]
    async fn test_store_and_load_turn() {
        let history = History::default();
        let result = ChatResult {
            conversation_id: None,
            first_id:        "m1".into(),
            message_id:      "m1".into(),
            text:            "你好，请".into(),
        };
        history.store(None, &Message::user("失眠怎么办？"), &result).await;

        let stored = history.load("m1").await.expect("turn stored under message id");
        assert_eq!(stored.first_id, "m1");
        assert_eq!(
            stored.messages,
            vec![Message::user("失眠怎么办？"), Message::assistant("你好，请")]
        );

        let follow_up = ChatResult {
            conversation_id: Some("m1".into()),
            first_id:        "m1".into(),
            message_id:      "m2".into(),
            text:            "ok".into(),
        };
        history.store(Some(stored), &Message::user("还有呢"), &follow_up).await;
        let stored = history.load("m2").await.unwrap();
        assert_eq!(stored.first_id, "m1");
        assert_eq!(stored.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_stored_history_is_capped() {
        let history = History::default();
        let long = Conversation {
            first_id: "m0".into(),
            messages: (0..MAX_STORED_MESSAGES).map(|i| Message::user(i.to_string())).collect(),
        };
        let result = ChatResult {
            first_id: "m0".into(),
            message_id: "m9".into(),
            ..Default::default()
        };
        history.store(Some(long), &Message::user("q"), &result).await;

        let stored = history.load("m9").await.unwrap();
        assert_eq!(stored.messages.len(), MAX_STORED_MESSAGES);
        assert_eq!(stored.messages[0].content, "2");
    }
}
