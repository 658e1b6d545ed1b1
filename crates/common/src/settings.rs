use crate::channel::{Channel, ChannelConfig, DEFAULT_TIMEOUT, SamplingParams};
use crate::error::{Error, Result};
use crate::random::KeyPool;
use faststr::FastStr;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_CHANNEL: &str = "openai";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_HOST: &str = "https://api.openai.com";
pub const DEFAULT_CONTEXT_TOKENS: u32 = 4000;
pub const DEFAULT_RESPONSE_TOKENS: u32 = 1000;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9503";

pub const MEDICAL_SYSTEM_PROMPT: &str = "你是一个专业的医疗健康AI助手，专门为用户提供医疗健康相关的咨询和知识服务。\n\n你的职责包括：\n1. 提供基础的健康知识和医疗常识\n2. 解答常见疾病的症状、预防和护理方法\n3. 分享健康生活方式和养生建议\n4. 协助理解医疗检查报告和用药指导\n5. 提供急救知识和健康管理建议\n\n重要提醒：\n- 我只能提供健康咨询和医疗知识，不能替代专业医生的诊断\n- 对于严重症状或紧急情况，请立即就医\n- 用药建议仅供参考，具体用药请遵医嘱\n\n请始终保持专业、准确、负责的态度，用通俗易懂的语言回答问题。";

const DEFAULT_BLOCKED_KEYWORDS: &str = "政治,暴力,色情,赌博,非法药物";

/// The `ai_chat` settings record, as persisted by the admin panel or taken
/// from the process environment. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiChatSettings {
    pub channel:                Option<FastStr>,
    pub default_system_prompt:  Option<FastStr>,
    pub gptlink_key:            Option<FastStr>,
    pub openai_key:             Option<FastStr>,
    pub openai_model:           Option<FastStr>,
    // the admin panel stores these either as numbers or numeric strings
    #[serde(default, deserialize_with = "lenient_u32")]
    pub openai_tokens:          Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub openai_response_tokens: Option<u32>,
    pub openai_host:            Option<FastStr>,
    pub openai_proxy_host:      Option<FastStr>,
}

impl AiChatSettings {
    pub fn from_env(vars: &HashMap<String, String>) -> Self {
        let text = |name: &str| vars.get(name).map(|v| FastStr::new(v.trim()));
        let number = |name: &str| vars.get(name).and_then(|v| v.trim().parse().ok());
        Self {
            channel:                text("AI_CHANNEL"),
            default_system_prompt:  text("SYSTEM_PROMPT"),
            gptlink_key:            text("GPTLINK_KEY"),
            openai_key:             text("OPENAI_API_KEY"),
            openai_model:           text("OPENAI_MODEL"),
            openai_tokens:          number("OPENAI_TOKENS"),
            openai_response_tokens: number("OPENAI_RESPONSE_TOKENS"),
            openai_host:            text("OPENAI_HOST"),
            openai_proxy_host:      text("OPENAI_PROXY_HOST"),
        }
    }

    /// Layers `top` over `self`: every field set in `top` wins.
    pub fn overlay(self, top: Self) -> Self {
        fn pick(base: Option<FastStr>, top: Option<FastStr>) -> Option<FastStr> {
            non_empty(top).or_else(|| non_empty(base))
        }
        Self {
            channel:                pick(self.channel, top.channel),
            default_system_prompt:  pick(self.default_system_prompt, top.default_system_prompt),
            gptlink_key:            pick(self.gptlink_key, top.gptlink_key),
            openai_key:             pick(self.openai_key, top.openai_key),
            openai_model:           pick(self.openai_model, top.openai_model),
            openai_tokens:          top.openai_tokens.or(self.openai_tokens),
            openai_response_tokens: top.openai_response_tokens.or(self.openai_response_tokens),
            openai_host:            pick(self.openai_host, top.openai_host),
            openai_proxy_host:      pick(self.openai_proxy_host, top.openai_proxy_host),
        }
    }

    /// Combines the persisted record with the environment. Persisted values
    /// win normally; in restricted mode the environment wins and the admin
    /// system prompt is ignored, so only `SYSTEM_PROMPT` can replace the
    /// medical prompt.
    pub fn merge(stored: Self, env: Self, restricted: bool) -> Self {
        if !restricted {
            return env.overlay(stored);
        }
        let env_prompt = non_empty(env.default_system_prompt.clone());
        Self {
            default_system_prompt: env_prompt,
            ..stored.overlay(env)
        }
    }

    /// Builds the per-request channel snapshot. `channel_hint` overrides the
    /// configured channel; a key is drawn from the channel's pool.
    pub fn resolve(
        &self,
        channel_hint: Option<&str>,
        restricted: bool,
        timeout: Duration,
    ) -> Result<ChannelConfig> {
        let channel_name = channel_hint
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .or_else(|| non_empty_str(&self.channel))
            .unwrap_or(DEFAULT_CHANNEL);
        let channel = Channel::parse(channel_name);

        let raw_keys = match channel {
            Channel::GptLink => &self.gptlink_key,
            Channel::OpenAi | Channel::Compatible(_) => &self.openai_key,
        };
        let pool = KeyPool::parse(non_empty_str(raw_keys).unwrap_or_default());
        let api_key = pool
            .pick()
            .cloned()
            .ok_or_else(|| Error::ConfigMissing(format!("no api key for channel {channel}").into()))?;

        let system_prompt = non_empty(self.default_system_prompt.clone())
            .or_else(|| restricted.then(|| FastStr::from_static_str(MEDICAL_SYSTEM_PROMPT)));

        Ok(ChannelConfig {
            channel,
            api_key,
            host: FastStr::new(non_empty_str(&self.openai_host).unwrap_or(DEFAULT_HOST)),
            proxy_host: non_empty(self.openai_proxy_host.clone()),
            model: FastStr::new(non_empty_str(&self.openai_model).unwrap_or(DEFAULT_MODEL)),
            context_tokens: self.openai_tokens.unwrap_or(DEFAULT_CONTEXT_TOKENS),
            response_tokens: self
                .openai_response_tokens
                .unwrap_or(DEFAULT_RESPONSE_TOKENS),
            system_prompt,
            sampling: SamplingParams::default(),
            timeout,
        })
    }
}

fn non_empty(value: Option<FastStr>) -> Option<FastStr> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_str(value: &Option<FastStr>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(u64),
        Text(String),
    }

    Ok(
        match Option::<NumberOrText>::deserialize(deserializer)? {
            Some(NumberOrText::Number(n)) => u32::try_from(n).ok(),
            Some(NumberOrText::Text(s)) => s.trim().parse().ok(),
            None => None,
        },
    )
}

/// Prompt limits applied in restricted mode.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardLimits {
    /// Maximum conversation rounds; a prompt may hold 100 chars per round.
    pub max_conversation_length: usize,
    pub content_filter:          bool,
    pub blocked_keywords:        Vec<FastStr>,
    /// Chats a member may start per day; 0 disables the check.
    pub max_daily_requests:      u32,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self {
            max_conversation_length: 20,
            content_filter:          true,
            blocked_keywords:        parse_keywords(DEFAULT_BLOCKED_KEYWORDS),
            max_daily_requests:      50,
        }
    }
}

fn parse_keywords(raw: &str) -> Vec<FastStr> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(FastStr::new)
        .collect()
}

/// Process-level configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url:     FastStr,
    pub listen_addr:      SocketAddr,
    /// `MEDICAL_MODE`: environment settings win over persisted ones and the
    /// prompt guard is active.
    pub restricted:       bool,
    pub upstream_timeout: Duration,
    pub guard:            GuardLimits,
    pub env_settings:     AiChatSettings,
}

impl AppConfig {
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();

        let database_url = vars
            .get("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .map(|v| FastStr::new(v.trim()))
            .ok_or_else(|| Error::ConfigMissing("DATABASE_URL".into()))?;

        let listen_addr = vars
            .get("LISTEN_ADDR")
            .map(String::as_str)
            .unwrap_or(DEFAULT_LISTEN_ADDR);
        let listen_addr = listen_addr
            .parse::<SocketAddr>()
            .map_err(|_| Error::InvalidConfig("LISTEN_ADDR", FastStr::new(listen_addr)))?;

        let upstream_timeout = match vars.get("UPSTREAM_TIMEOUT") {
            Some(secs) => secs
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| Error::InvalidConfig("UPSTREAM_TIMEOUT", FastStr::new(secs)))?,
            None => DEFAULT_TIMEOUT,
        };

        let defaults = GuardLimits::default();
        let guard = GuardLimits {
            max_conversation_length: vars
                .get("MED_MAX_CONVERSATION_LENGTH")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_conversation_length),
            content_filter:          flag(&vars, "MED_CONTENT_FILTER", defaults.content_filter),
            blocked_keywords:        vars
                .get("MED_BLOCKED_KEYWORDS")
                .map(|v| parse_keywords(v))
                .unwrap_or(defaults.blocked_keywords),
            max_daily_requests:      vars
                .get("MED_MAX_DAILY_REQUESTS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_daily_requests),
        };

        Ok(Self {
            database_url,
            listen_addr,
            restricted: flag(&vars, "MEDICAL_MODE", false),
            upstream_timeout,
            guard,
            env_settings: AiChatSettings::from_env(&vars),
        })
    }
}

fn flag(vars: &HashMap<String, String>, name: &str, default: bool) -> bool {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}
