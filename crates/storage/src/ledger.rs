use crate::{Storage, error::Result};
use common::data::ChatLogRecord;

impl<C> Storage<C> {
    /// Debits one chat from the member's package.
    pub async fn record_consumption(&self, member_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO member_consumptions (member_id, num) VALUES ($1, 1)")
            .bind(member_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_chat_log(&self, record: &ChatLogRecord) -> Result<()> {
        sqlx::query(
            r#"
        INSERT INTO chat_logs
            (member_id, conversation_id, first_id, message_id, model, prompt, response)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
        )
        .bind(record.user_id)
        .bind(record.conversation_id.as_deref())
        .bind(record.first_id.as_str())
        .bind(record.message_id.as_str())
        .bind(record.model.as_str())
        .bind(record.prompt.as_str())
        .bind(record.response.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Chats logged for the member since local midnight of the database.
    pub async fn count_chat_logs_today(&self, member_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_logs WHERE member_id = $1 AND created_at >= date_trunc('day', now())",
        )
        .bind(member_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
