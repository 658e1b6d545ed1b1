use common::channel::ChannelConfig;
use common::error::{Error, Result};
use common::settings::AiChatSettings;
use std::time::Duration;
use storage::Storage;
use storage::cache::KVCache;
use tracing::warn;

/// Where the persisted `ai_chat` settings come from.
pub trait SettingsSource: Send + Sync + 'static {
    fn load_settings(&self) -> impl Future<Output = Result<Option<AiChatSettings>>> + Send;
}

impl<C: KVCache<AiChatSettings>> SettingsSource for Storage<C> {
    async fn load_settings(&self) -> Result<Option<AiChatSettings>> {
        self.get_ai_chat_settings()
            .await
            .map_err(|e| Error::MsgError(e.to_string().into()))
    }
}

/// Resolves the channel configuration for one request.
pub trait ConfigProvider: Send + Sync + 'static {
    fn resolve(&self, channel_hint: Option<&str>) -> impl Future<Output = Result<ChannelConfig>> + Send;
}

/// Merges persisted settings with the environment.
///
/// Persisted settings win in normal mode; in restricted mode the deployment
/// environment wins so operators can pin the vendor.
pub struct SettingsConfigProvider<S> {
    source:     S,
    env:        AiChatSettings,
    restricted: bool,
    timeout:    Duration,
}

impl<S: SettingsSource> SettingsConfigProvider<S> {
    pub fn new(source: S, env: AiChatSettings, restricted: bool, timeout: Duration) -> Self {
        Self {
            source,
            env,
            restricted,
            timeout,
        }
    }
}

impl<S: SettingsSource> ConfigProvider for SettingsConfigProvider<S> {
    async fn resolve(&self, channel_hint: Option<&str>) -> Result<ChannelConfig> {
        let stored = match self.source.load_settings().await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to load persisted settings, using environment");
                AiChatSettings::default()
            }
        };

        AiChatSettings::merge(stored, self.env.clone(), self.restricted).resolve(
            channel_hint,
            self.restricted,
            self.timeout,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::channel::{Channel, DEFAULT_TIMEOUT};
    use common::settings::{DEFAULT_MODEL, MEDICAL_SYSTEM_PROMPT};

    pub(crate) struct StaticSettings(pub Option<AiChatSettings>);

    impl SettingsSource for StaticSettings {
        async fn load_settings(&self) -> Result<Option<AiChatSettings>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSettings;

    impl SettingsSource for BrokenSettings {
        async fn load_settings(&self) -> Result<Option<AiChatSettings>> {
            Err(Error::MsgError("database unavailable".into()))
        }
    }

    fn stored() -> AiChatSettings {
        AiChatSettings {
            channel: Some("openai".into()),
            openai_key: Some("sk-stored".into()),
            openai_model: Some("gpt-4o-mini".into()),
            ..Default::default()
        }
    }

    fn env() -> AiChatSettings {
        AiChatSettings {
            channel: Some("deepseek".into()),
            openai_key: Some("sk-env".into()),
            openai_host: Some("https://api.deepseek.com".into()),
            openai_model: Some("deepseek-chat".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_persisted_settings_win_by_default() {
        let provider =
            SettingsConfigProvider::new(StaticSettings(Some(stored())), env(), false, DEFAULT_TIMEOUT);
        let config = provider.resolve(None).await.unwrap();

        assert_eq!(config.channel, Channel::OpenAi);
        assert_eq!(config.api_key, "sk-stored");
        assert_eq!(config.model, "gpt-4o-mini");
        // unset in the stored record, so the environment fills it in
        assert_eq!(config.host, "https://api.deepseek.com");
        assert!(config.system_prompt.is_none());
    }

    #[tokio::test]
    async fn test_environment_wins_in_restricted_mode() {
        let provider =
            SettingsConfigProvider::new(StaticSettings(Some(stored())), env(), true, DEFAULT_TIMEOUT);
        let config = provider.resolve(None).await.unwrap();

        assert_eq!(config.channel, Channel::Compatible("deepseek".into()));
        assert_eq!(config.api_key, "sk-env");
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.system_prompt.as_deref(), Some(MEDICAL_SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_restricted_mode_ignores_admin_prompt() {
        let with_prompt = AiChatSettings {
            default_system_prompt: Some("admin prompt".into()),
            ..stored()
        };
        let provider =
            SettingsConfigProvider::new(StaticSettings(Some(with_prompt.clone())), env(), true, DEFAULT_TIMEOUT);
        let config = provider.resolve(None).await.unwrap();
        assert_eq!(config.system_prompt.as_deref(), Some(MEDICAL_SYSTEM_PROMPT));

        let provider =
            SettingsConfigProvider::new(StaticSettings(Some(with_prompt)), env(), false, DEFAULT_TIMEOUT);
        let config = provider.resolve(None).await.unwrap();
        assert_eq!(config.system_prompt.as_deref(), Some("admin prompt"));
    }

    #[tokio::test]
    async fn test_load_failure_falls_back_to_environment() {
        let provider = SettingsConfigProvider::new(BrokenSettings, env(), false, DEFAULT_TIMEOUT);
        let config = provider.resolve(Some("openai")).await.unwrap();

        assert_eq!(config.channel, Channel::OpenAi);
        assert_eq!(config.api_key, "sk-env");
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let provider = SettingsConfigProvider::new(
            StaticSettings(None),
            AiChatSettings::default(),
            false,
            DEFAULT_TIMEOUT,
        );
        let err = provider.resolve(None).await.unwrap_err();
        assert!(matches!(err, Error::ConfigMissing(_)));
    }

    #[tokio::test]
    async fn test_defaults_fill_unset_fields() {
        let settings = AiChatSettings {
            openai_key: Some("sk".into()),
            ..Default::default()
        };
        let provider =
            SettingsConfigProvider::new(StaticSettings(Some(settings)), AiChatSettings::default(), false, DEFAULT_TIMEOUT);
        let config = provider.resolve(None).await.unwrap();

        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.completions_url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
