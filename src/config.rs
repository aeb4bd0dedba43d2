use crate::render::RenderLimits;
use crate::stream::PacingConfig;
use crate::util::is_local_endpoint_url;
use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a concise, helpful assistant. Answer clearly. \
If the user asks for code, provide minimal runnable examples. \
Keep answers under 6 paragraphs unless asked for more detail.";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Largest field body the embed surface accepts.
pub const MAX_FIELD_LIMIT: usize = 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: Option<u32>,
    pub limits: RenderLimits,
    pub pacing: PacingConfig,
    pub channel_capacity: usize,
    pub webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: None,
            limits: RenderLimits::default(),
            pacing: PacingConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            webhook_url: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let api_key = non_empty_var("DEEPSEEK_API_KEY");
        let api_url = non_empty_var("DEEPSEEK_BASE_URL").unwrap_or(defaults.api_url);
        let model = non_empty_var("DEEPSEEK_MODEL").unwrap_or(defaults.model);
        let system_prompt = non_empty_var("ASK_SYSTEM_PROMPT").unwrap_or(defaults.system_prompt);
        let max_tokens = parse_var::<u32>("ASK_MAX_TOKENS")?.map(|v| v.clamp(16, 8192));

        let limits = RenderLimits {
            field_limit: parse_var("ASK_FIELD_LIMIT")?.unwrap_or(defaults.limits.field_limit),
            answer_limit: parse_var("ASK_ANSWER_LIMIT")?.unwrap_or(defaults.limits.answer_limit),
        };

        let pacing = PacingConfig {
            char_rate: parse_var("ASK_CHAR_RATE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.pacing.char_rate),
            chars_per_tick: parse_var("ASK_CHARS_PER_TICK")?
                .unwrap_or(defaults.pacing.chars_per_tick),
            stall_timeout: parse_var("ASK_STALL_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.pacing.stall_timeout),
            punctuation_pause: parse_var("ASK_PUNCTUATION_PAUSE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.pacing.punctuation_pause),
        };

        Ok(Self {
            api_key,
            api_url,
            model,
            system_prompt,
            max_tokens,
            limits,
            pacing,
            channel_capacity: parse_var("ASK_CHANNEL_CAPACITY")?
                .unwrap_or(defaults.channel_capacity),
            webhook_url: non_empty_var("ASK_WEBHOOK_URL"),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid DEEPSEEK_BASE_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!(
                "DEEPSEEK_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.model.trim().is_empty() {
            bail!("DEEPSEEK_MODEL must not be empty");
        }

        if self.limits.field_limit == 0 || self.limits.field_limit > MAX_FIELD_LIMIT {
            bail!(
                "ASK_FIELD_LIMIT must be between 1 and {MAX_FIELD_LIMIT} (got {})",
                self.limits.field_limit
            );
        }

        if self.limits.answer_limit == 0 {
            bail!("ASK_ANSWER_LIMIT must be positive");
        }

        if self.pacing.chars_per_tick == 0 {
            bail!("ASK_CHARS_PER_TICK must be positive");
        }

        if self.pacing.char_rate.is_zero() {
            bail!("ASK_CHAR_RATE_MS must be positive");
        }

        if self.pacing.stall_timeout <= self.pacing.char_rate {
            bail!(
                "ASK_STALL_TIMEOUT_SECS ({:?}) must exceed the reveal cadence ({:?})",
                self.pacing.stall_timeout,
                self.pacing.char_rate
            );
        }

        if self.channel_capacity == 0 {
            bail!("ASK_CHANNEL_CAPACITY must be positive");
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    non_empty_var(name)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("{name} has an invalid value '{raw}'"))
        })
        .transpose()
}
