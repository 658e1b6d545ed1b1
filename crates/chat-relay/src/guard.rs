use common::settings::GuardLimits;
use std::convert::Infallible;
use std::fmt::Display;
use storage::Storage;
use thiserror::Error;
use tracing::warn;

/// Characters allowed per conversation round.
const CHARS_PER_ROUND: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("message must not be empty")]
    EmptyPrompt,
    #[error("message too long: at most {0} characters")]
    ConversationTooLong(usize),
    #[error("message contains blocked content")]
    ContentFiltered,
    #[error("daily limit of {0} chats reached, try again tomorrow")]
    DailyLimitExceeded(u32),
}

impl GuardError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "invalid_request",
            Self::ConversationTooLong(_) => "conversation_too_long",
            Self::ContentFiltered => "content_filtered",
            Self::DailyLimitExceeded(_) => "daily_limit_exceeded",
        }
    }
}

/// Counts the chats a member already had today.
pub trait DailyUsage: Send + Sync + 'static {
    type Error: Display + Send;

    fn requests_today(&self, user_id: i64) -> impl Future<Output = Result<i64, Self::Error>> + Send;
}

/// No counter wired in; the daily limit never triggers.
impl DailyUsage for () {
    type Error = Infallible;

    async fn requests_today(&self, _user_id: i64) -> Result<i64, Self::Error> {
        Ok(0)
    }
}

impl<C: Send + Sync + 'static> DailyUsage for Storage<C> {
    type Error = storage::error::Error;

    async fn requests_today(&self, user_id: i64) -> Result<i64, Self::Error> {
        self.count_chat_logs_today(user_id).await
    }
}

/// Prompt checks for restricted deployments. Disabled guards only reject
/// empty prompts.
#[derive(Debug, Clone)]
pub struct RequestGuard {
    enabled: bool,
    limits:  GuardLimits,
}

impl RequestGuard {
    pub fn new(enabled: bool, limits: GuardLimits) -> Self {
        Self { enabled, limits }
    }

    pub fn disabled() -> Self {
        Self::new(false, GuardLimits::default())
    }

    pub fn check(&self, prompt: &str) -> Result<(), GuardError> {
        if prompt.trim().is_empty() {
            return Err(GuardError::EmptyPrompt);
        }
        if !self.enabled {
            return Ok(());
        }

        let max_chars = self.limits.max_conversation_length.saturating_mul(CHARS_PER_ROUND);
        if prompt.chars().count() > max_chars {
            return Err(GuardError::ConversationTooLong(max_chars));
        }

        if self.limits.content_filter {
            let lowered = prompt.to_lowercase();
            let blocked = self
                .limits
                .blocked_keywords
                .iter()
                .any(|keyword| lowered.contains(&keyword.to_lowercase()));
            if blocked {
                return Err(GuardError::ContentFiltered);
            }
        }
        Ok(())
    }

    /// Rejects members over their daily quota. A failing counter lets the
    /// request through.
    pub async fn check_daily<D: DailyUsage>(&self, user_id: i64, usage: &D) -> Result<(), GuardError> {
        let limit = self.limits.max_daily_requests;
        if !self.enabled || limit == 0 {
            return Ok(());
        }

        match usage.requests_today(user_id).await {
            Ok(count) if count >= i64::from(limit) => Err(GuardError::DailyLimitExceeded(limit)),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(user_id, error = %e, "failed to count today's chats, allowing request");
                Ok(())
            }
        }
    }
}
