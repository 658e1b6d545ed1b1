use crate::cache::{CONVERSATION_POLICY, CachePolicy, KVCache, SETTINGS_POLICY};
use common::data::Conversation;
use common::settings::AiChatSettings;
use faststr::FastStr;
use moka::future::Cache;
use std::sync::Arc;

fn build<V>(policy: CachePolicy) -> Arc<Cache<FastStr, V>>
where
    V: Clone + Send + Sync + 'static,
{
    Arc::new(
        Cache::builder()
            .max_capacity(policy.max_capacity)
            .time_to_live(policy.time_to_live)
            .build(),
    )
}

/// Caches persisted settings documents by kind.
#[derive(Clone)]
pub struct SettingsCache(Arc<Cache<FastStr, AiChatSettings>>);

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsCache {
    pub fn new() -> Self {
        Self(build(SETTINGS_POLICY))
    }
}

impl KVCache<AiChatSettings> for SettingsCache {
    fn init() -> Self {
        Self::new()
    }

    async fn get(&self, k: &str) -> Option<AiChatSettings> {
        self.0.get(k).await
    }

    async fn set(&self, key: &str, value: AiChatSettings) {
        self.0.insert(FastStr::new(key), value).await;
    }
}

/// Conversation history keyed by the id of its latest assistant message.
#[derive(Clone)]
pub struct ConversationCache(Arc<Cache<FastStr, Conversation>>);

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationCache {
    pub fn new() -> Self {
        Self::with_policy(CONVERSATION_POLICY)
    }

    pub fn with_policy(policy: CachePolicy) -> Self {
        Self(build(policy))
    }
}

impl KVCache<Conversation> for ConversationCache {
    fn init() -> Self {
        Self::new()
    }

    async fn get(&self, k: &str) -> Option<Conversation> {
        self.0.get(k).await
    }

    async fn set(&self, key: &str, value: Conversation) {
        self.0.insert(FastStr::new(key), value).await;
    }
}
