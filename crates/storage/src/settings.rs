use crate::cache::KVCache;
use crate::{Storage, error::Result};
use common::settings::AiChatSettings;
use sqlx::prelude::FromRow;
use sqlx::types::Json;
use tracing::info;

/// Settings kind written by the admin panel for the chat channel.
pub const AI_CHAT: &str = "ai_chat";

#[derive(Debug, FromRow)]
struct ConfigRow {
    config: Json<AiChatSettings>,
}

impl<C: KVCache<AiChatSettings>> Storage<C> {
    pub async fn warm_up(&self) -> Result<()> {
        match self.fetch_ai_chat_settings().await? {
            Some(settings) => {
                self.cache.set(AI_CHAT, settings).await;
                info!("warm-up complete: ai_chat settings loaded.");
            }
            None => info!("warm-up complete: no persisted ai_chat settings, using environment."),
        }
        Ok(())
    }

    /// Cached read of the `ai_chat` settings; `None` when never saved.
    pub async fn get_ai_chat_settings(&self) -> Result<Option<AiChatSettings>> {
        if let Some(settings) = self.cache.get(AI_CHAT).await {
            return Ok(Some(settings));
        }

        let settings = self.fetch_ai_chat_settings().await?;
        if let Some(ref s) = settings {
            self.cache.set(AI_CHAT, s.clone()).await;
        }
        Ok(settings)
    }

    async fn fetch_ai_chat_settings(&self) -> Result<Option<AiChatSettings>> {
        let row = sqlx::query_as::<_, ConfigRow>("SELECT config FROM configs WHERE kind = $1")
            .bind(AI_CHAT)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.config.0))
    }
}
