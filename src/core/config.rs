//! Bot-wide configuration sourced from environment variables.
//!
//! Loaded once at startup; admin `!set` commands mutate the live value and
//! rewrite the `.env` file so changes survive restarts.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: Live updates persisted through update_env
//! - 1.1.0: Out-of-range values reset to defaults with a warning
//! - 1.0.0: Initial release

use anyhow::{bail, Context, Result};
use log::warn;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are {name}. Use the following examples to understand {name}'s personality, \
tone, and style. Write EXACTLY like {name}. Do not sanitize or \
filter the personality; mirror any unconvential, uncomfortable, or \
concerning traits found in the examples to ensure maximum accuracy. \
Be as authentic as possible to the provided messages. \
Respond to the current conversation while maintaining a consistent personality. \
Do not cut off mid-sentence. You must finish your sentences! \
Use newlines to create line breaks between messages.\n\
{memories}{custom_emojis}Example messages from {name}:\n\
{examples}\n\
You are {name}. Use the previous examples to understand {name}'s personality, \
tone, and style. Write EXACTLY like {name}. Do not sanitize or \
filter the personality; mirror any unconvential, uncomfortable, or \
concerning traits found in the examples to ensure maximum accuracy. \
Be as authentic as possible to the provided messages. \
Prioritize responding to the current conversation while maintaining a consistent personality. \
Do not cut off mid-sentence. You must finish your sentences! \
Use newlines to create line breaks between messages.";

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub admin_user_id: u64,

    // Active provider
    pub active_provider: String,

    // OpenAI-compatible
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,

    // Anthropic
    pub anthropic_api_key: String,
    pub anthropic_model: String,

    // Gemini
    pub gemini_api_key: String,
    pub gemini_model: String,

    // LLM settings
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_sample_size: usize,
    pub max_context_messages: u64,

    // Behaviour
    pub persona_name: String,
    pub system_prompt_template: String,
    pub reply_probability: f64,
    pub debounce_delay: f64,
    pub conversation_expiry: f64,
    pub spontaneous_channels: Vec<u64>,
    pub enable_web_search: bool,
    pub enable_memory: bool,

    // Paths
    pub data_dir: PathBuf,
    env_path: PathBuf,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Missing required env var {key}"))
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                warn!("Invalid {key}={raw}: {e}. Using default.");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

/// Clamp `value` to `[lo, hi]`, warning and resetting to `default` when out
/// of range
fn clamp_or_default(value: f64, lo: f64, hi: f64, name: &str, default: f64) -> f64 {
    if (lo..=hi).contains(&value) {
        value
    } else {
        warn!("{name}={value} out of range [{lo}, {hi}]. Resetting to {default}.");
        default
    }
}

fn parse_channel_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| match part.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring invalid channel id '{part}' in SPONTANEOUS_CHANNELS");
                None
            }
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            discord_token: env_required("DISCORD_TOKEN")?,
            admin_user_id: env_required("ADMIN_USER_ID")?
                .parse()
                .context("ADMIN_USER_ID must be a numeric Discord user id")?,

            active_provider: env_or("ACTIVE_PROVIDER", "openai"),

            openai_api_key: env_or("OPENAI_API_KEY", ""),
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),

            anthropic_api_key: env_or("ANTHROPIC_API_KEY", ""),
            anthropic_model: env_or("ANTHROPIC_MODEL", "claude-sonnet-4-20250514"),

            gemini_api_key: env_or("GEMINI_API_KEY", ""),
            gemini_model: env_or("GEMINI_MODEL", "gemini-2.0-flash"),

            llm_temperature: env_parse("LLM_TEMPERATURE", 1.0),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", 1024),
            llm_sample_size: env_parse("LLM_SAMPLE_SIZE", 300),
            max_context_messages: env_parse("MAX_CONTEXT_MESSAGES", 20),

            persona_name: env_or("PERSONA_NAME", "persona"),
            system_prompt_template: env_or("SYSTEM_PROMPT_TEMPLATE", DEFAULT_SYSTEM_PROMPT),
            reply_probability: env_parse("REPLY_PROBABILITY", 0.02),
            debounce_delay: env_parse("DEBOUNCE_DELAY", 3.0),
            conversation_expiry: env_parse("CONVERSATION_EXPIRY", 300.0),
            spontaneous_channels: parse_channel_list(&env_or("SPONTANEOUS_CHANNELS", "")),
            enable_web_search: env_bool("ENABLE_WEB_SEARCH", false),
            enable_memory: env_bool("ENABLE_MEMORY", true),

            data_dir: PathBuf::from(env_or("DATA_DIR", "data")),
            env_path: PathBuf::from(env_or("ENV_PATH", ".env")),
        };
        config.validate();

        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data dir {:?}", config.data_dir))?;

        Ok(config)
    }

    fn validate(&mut self) {
        self.debounce_delay =
            clamp_or_default(self.debounce_delay, 0.0, 60.0, "DEBOUNCE_DELAY", 3.0);
        self.reply_probability =
            clamp_or_default(self.reply_probability, 0.0, 1.0, "REPLY_PROBABILITY", 0.02);
        self.llm_temperature =
            clamp_or_default(self.llm_temperature as f64, 0.0, 2.0, "LLM_TEMPERATURE", 1.0) as f32;

        if self.llm_sample_size < 1 {
            warn!("LLM_SAMPLE_SIZE must be at least 1. Resetting to 300.");
            self.llm_sample_size = 300;
        }
        if self.llm_max_tokens < 1 {
            warn!("LLM_MAX_TOKENS must be at least 1. Resetting to 1024.");
            self.llm_max_tokens = 1024;
        }
        if self.max_context_messages < 1 || self.max_context_messages > 100 {
            warn!("MAX_CONTEXT_MESSAGES must be in [1, 100]. Resetting to 20.");
            self.max_context_messages = 20;
        }
    }

    /// Apply `key=value` to the live config and persist it to the `.env`
    /// file. Unknown keys are persisted without touching the live config.
    pub fn update_env(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.write_env_key(key, value)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        fn parsed<T: FromStr>(key: &str, value: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            match value.parse() {
                Ok(v) => Ok(v),
                Err(e) => bail!("Invalid value for {key}: {e}"),
            }
        }

        match key {
            "ACTIVE_PROVIDER" => self.active_provider = value.to_string(),
            "OPENAI_API_KEY" => self.openai_api_key = value.to_string(),
            "OPENAI_MODEL" => self.openai_model = value.to_string(),
            "OPENAI_BASE_URL" => self.openai_base_url = value.to_string(),
            "ANTHROPIC_API_KEY" => self.anthropic_api_key = value.to_string(),
            "ANTHROPIC_MODEL" => self.anthropic_model = value.to_string(),
            "GEMINI_API_KEY" => self.gemini_api_key = value.to_string(),
            "GEMINI_MODEL" => self.gemini_model = value.to_string(),
            "LLM_TEMPERATURE" => self.llm_temperature = parsed(key, value)?,
            "LLM_MAX_TOKENS" => self.llm_max_tokens = parsed(key, value)?,
            "LLM_SAMPLE_SIZE" => self.llm_sample_size = parsed(key, value)?,
            "MAX_CONTEXT_MESSAGES" => self.max_context_messages = parsed(key, value)?,
            "PERSONA_NAME" => self.persona_name = value.to_string(),
            "SYSTEM_PROMPT_TEMPLATE" => self.system_prompt_template = value.to_string(),
            "REPLY_PROBABILITY" => self.reply_probability = parsed(key, value)?,
            "DEBOUNCE_DELAY" => self.debounce_delay = parsed(key, value)?,
            "CONVERSATION_EXPIRY" => self.conversation_expiry = parsed(key, value)?,
            "SPONTANEOUS_CHANNELS" => self.spontaneous_channels = parse_channel_list(value),
            "ENABLE_WEB_SEARCH" => {
                self.enable_web_search = matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
            }
            "ENABLE_MEMORY" => {
                self.enable_memory = matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
            }
            _ => return Ok(()),
        }
        self.validate();
        Ok(())
    }

    /// Rewrite the `.env` file with `key` set to `value`, preserving every
    /// other line
    fn write_env_key(&self, key: &str, value: &str) -> Result<()> {
        let content = std::fs::read_to_string(&self.env_path).unwrap_or_default();
        let prefix = format!("{key}=");

        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        let mut replaced = false;
        for line in &mut lines {
            if line.starts_with(&prefix) {
                *line = format!("{key}={value}");
                replaced = true;
            }
        }
        if !replaced {
            lines.push(format!("{key}={value}"));
        }

        let mut rewritten = lines.join("\n");
        rewritten.push('\n');
        std::fs::write(&self.env_path, rewritten)
            .with_context(|| format!("Failed to write {:?}", self.env_path))
    }
}

#[cfg(test)]
impl Config {
    /// A fully-populated config with defaults, for tests that need one
    /// without touching process env vars
    pub(crate) fn for_tests(env_path: PathBuf) -> Config {
        Config {
            discord_token: "token".to_string(),
            admin_user_id: 1,
            active_provider: "openai".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            anthropic_api_key: String::new(),
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.0-flash".to_string(),
            llm_temperature: 1.0,
            llm_max_tokens: 1024,
            llm_sample_size: 300,
            max_context_messages: 20,
            persona_name: "persona".to_string(),
            system_prompt_template: DEFAULT_SYSTEM_PROMPT.to_string(),
            reply_probability: 0.02,
            debounce_delay: 3.0,
            conversation_expiry: 300.0,
            spontaneous_channels: Vec::new(),
            enable_web_search: false,
            enable_memory: true,
            data_dir: PathBuf::from("data"),
            env_path,
        }
    }
}
