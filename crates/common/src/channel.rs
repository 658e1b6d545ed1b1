use faststr::FastStr;
use std::fmt::Display;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    OpenAi,
    GptLink,
    /// Any other vendor speaking the OpenAI chat-completions protocol,
    /// e.g. `deepseek`.
    Compatible(FastStr),
}

impl Channel {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "gptlink" => Self::GptLink,
            other => Self::Compatible(FastStr::new(other)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::OpenAi => "openai",
            Self::GptLink => "gptlink",
            Self::Compatible(name) => name.as_str(),
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature:       f32,
    pub top_p:             f32,
    pub frequency_penalty: f32,
    pub presence_penalty:  f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature:       0.3,
            top_p:             0.9,
            frequency_penalty: 0.2,
            presence_penalty:  0.2,
        }
    }
}

/// Snapshot of one upstream integration, resolved once per request and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub channel:         Channel,
    pub api_key:         FastStr,
    pub host:            FastStr,
    pub proxy_host:      Option<FastStr>,
    pub model:           FastStr,
    pub context_tokens:  u32,
    pub response_tokens: u32,
    pub system_prompt:   Option<FastStr>,
    pub sampling:        SamplingParams,
    pub timeout:         Duration,
}

impl ChannelConfig {
    /// The proxy host replaces the vendor host when configured.
    pub fn base_url(&self) -> &str {
        self.proxy_host
            .as_deref()
            .unwrap_or(&self.host)
            .trim_end_matches('/')
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url())
    }

    /// Tokens left for system prompt, history and the new message once the
    /// response allowance is reserved.
    pub fn prompt_budget(&self) -> u32 {
        self.context_tokens.saturating_sub(self.response_tokens)
    }

    pub fn with_model(mut self, model: Option<FastStr>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChannelConfig {
        ChannelConfig {
            channel:         Channel::OpenAi,
            api_key:         "sk-test".into(),
            host:            "https://api.deepseek.com/".into(),
            proxy_host:      None,
            model:           "deepseek-chat".into(),
            context_tokens:  4000,
            response_tokens: 1000,
            system_prompt:   None,
            sampling:        SamplingParams::default(),
            timeout:         DEFAULT_TIMEOUT,
        }
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!(Channel::parse("OpenAI"), Channel::OpenAi);
        assert_eq!(Channel::parse(" gptlink "), Channel::GptLink);
        assert_eq!(
            Channel::parse("deepseek"),
            Channel::Compatible("deepseek".into())
        );
        assert_eq!(Channel::parse("deepseek").to_string(), "deepseek");
    }

    #[test]
    fn test_completions_url_prefers_proxy_host() {
        let mut config = config();
        assert_eq!(
            config.completions_url(),
            "https://api.deepseek.com/v1/chat/completions"
        );

        config.proxy_host = Some("http://127.0.0.1:8080".into());
        assert_eq!(
            config.completions_url(),
            "http://127.0.0.1:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_model_override() {
        assert_eq!(config().with_model(None).model, "deepseek-chat");
        assert_eq!(config().with_model(Some(" ".into())).model, "deepseek-chat");
        assert_eq!(
            config().with_model(Some("deepseek-reasoner".into())).model,
            "deepseek-reasoner"
        );
    }

    #[test]
    fn test_prompt_budget_saturates() {
        let mut config = config();
        assert_eq!(config.prompt_budget(), 3000);
        config.response_tokens = 8000;
        assert_eq!(config.prompt_budget(), 0);
    }
}
