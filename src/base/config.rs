//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::base::prompts;

use super::types::{Res, Void};

/// Default Matrix homeserver.
fn default_homeserver() -> String {
    "https://matrix.org".to_string()
}

/// Default device ID used on login.
fn default_device_id() -> String {
    "llm-relay".to_string()
}

/// Default long-poll timeout for `/sync`, in milliseconds.
fn default_sync_timeout_ms() -> u64 {
    30000
}

/// Default system instruction.
fn default_preprompt() -> String {
    prompts::DEFAULT_PREPROMPT.to_string()
}

/// Default number of events kept as context.
fn default_history_size() -> usize {
    10
}

/// Default prompt token budget.
fn default_context_token_budget() -> usize {
    2048
}

/// Default end-of-turn stop marker.
fn default_end_of_turn_marker() -> String {
    prompts::DEFAULT_END_OF_TURN_MARKER.to_string()
}

/// Default overflow notice.
fn default_overflow_notice() -> String {
    prompts::DEFAULT_OVERFLOW_NOTICE.to_string()
}

/// Default interval between typing assertions.
fn default_heartbeat_interval_secs() -> u64 {
    10
}

/// Default server-side expiry of a typing assertion.
fn default_typing_timeout_secs() -> u64 {
    30
}

/// Default OpenAI-compatible endpoint (a local llama.cpp server).
fn default_openai_api_endpoint() -> String {
    "http://localhost:8000/v1".to_string()
}

/// Default API key; local servers ignore it.
fn default_openai_api_key() -> String {
    "no-key".to_string()
}

/// Default model name.
fn default_openai_model() -> String {
    "local-model".to_string()
}

/// Default sampling temperature.
fn default_openai_temperature() -> f32 {
    0.0
}

/// Default max output tokens.
fn default_openai_max_tokens() -> u32 {
    256
}

/// Default completion timeout.
fn default_openai_timeout_secs() -> u64 {
    120
}

/// Configuration for the relay.
///
/// Constructed once per process and immutable thereafter.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Matrix homeserver URL (`HOMESERVER`).
    #[serde(default = "default_homeserver")]
    pub homeserver: String,
    /// Matrix username, without the `@` or server part (`USERNAME`).
    pub username: String,
    /// Matrix password (`PASSWORD`).
    pub password: String,
    /// Device ID to log in with (`DEVICE_ID`).
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Room ID or alias to monitor (`ROOM`).
    pub room: String,
    /// Long-poll timeout for `/sync` in milliseconds (`SYNC_TIMEOUT_MS`).
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
    /// System instruction for the model (`PREPROMPT`).
    #[serde(default = "default_preprompt")]
    pub preprompt: String,
    /// Number of recent events kept as context (`HISTORY_SIZE`).
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Maximum prompt size in tokens (`CONTEXT_TOKEN_BUDGET`).
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,
    /// Backend-specific end-of-turn stop marker (`END_OF_TURN_MARKER`).
    #[serde(default = "default_end_of_turn_marker")]
    pub end_of_turn_marker: String,
    /// Emote published when the prompt overflows the budget (`OVERFLOW_NOTICE`).
    #[serde(default = "default_overflow_notice")]
    pub overflow_notice: String,
    /// Seconds between typing assertions while generating (`HEARTBEAT_INTERVAL_SECS`).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Seconds the homeserver keeps a typing assertion alive (`TYPING_TIMEOUT_SECS`).
    #[serde(default = "default_typing_timeout_secs")]
    pub typing_timeout_secs: u64,
    /// OpenAI-compatible API base URL (`OPENAI_API_ENDPOINT`).
    #[serde(default = "default_openai_api_endpoint")]
    pub openai_api_endpoint: String,
    /// OpenAI API key (`OPENAI_API_KEY`).
    #[serde(default = "default_openai_api_key")]
    pub openai_api_key: String,
    /// Model name sent with each request (`OPENAI_MODEL`).
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Sampling temperature (`OPENAI_TEMPERATURE`).
    /// Value between 0 and 2. Higher values like 0.8 make output more random,
    /// while lower values like 0.2 make it more focused and deterministic.
    #[serde(default = "default_openai_temperature")]
    pub openai_temperature: f32,
    /// Max output tokens (`OPENAI_MAX_TOKENS`).
    #[serde(default = "default_openai_max_tokens")]
    pub openai_max_tokens: u32,
    /// Timeout for a single completion call, in seconds (`OPENAI_TIMEOUT_SECS`).
    #[serde(default = "default_openai_timeout_secs")]
    pub openai_timeout_secs: u64,
    /// Optional llama.cpp server base URL used for exact token counts (`TOKENIZER_ENDPOINT`).
    #[serde(default)]
    pub tokenizer_endpoint: Option<String>,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            homeserver: default_homeserver(),
            username: String::new(),
            password: String::new(),
            device_id: default_device_id(),
            room: String::new(),
            sync_timeout_ms: default_sync_timeout_ms(),
            preprompt: default_preprompt(),
            history_size: default_history_size(),
            context_token_budget: default_context_token_budget(),
            end_of_turn_marker: default_end_of_turn_marker(),
            overflow_notice: default_overflow_notice(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            typing_timeout_secs: default_typing_timeout_secs(),
            openai_api_endpoint: default_openai_api_endpoint(),
            openai_api_key: default_openai_api_key(),
            openai_model: default_openai_model(),
            openai_temperature: default_openai_temperature(),
            openai_max_tokens: default_openai_max_tokens(),
            openai_timeout_secs: default_openai_timeout_secs(),
            tokenizer_endpoint: None,
        }
    }
}

impl ConfigInner {
    /// Interval between typing assertions.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Server-side expiry of a typing assertion.
    pub fn typing_timeout(&self) -> Duration {
        Duration::from_secs(self.typing_timeout_secs)
    }

    /// Timeout for a single completion call.
    pub fn openai_timeout(&self) -> Duration {
        Duration::from_secs(self.openai_timeout_secs)
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("LLM_RELAY"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Void {
        if self.username.is_empty() {
            return Err(anyhow::anyhow!("Username must not be empty."));
        }

        if self.room.is_empty() {
            return Err(anyhow::anyhow!("Room must not be empty."));
        }

        if self.openai_temperature < 0.0 || self.openai_temperature > 2.0 {
            return Err(anyhow::anyhow!("OpenAI temperature must be between 0 and 2."));
        }

        if self.openai_max_tokens < 1 || self.openai_max_tokens > 128000 {
            return Err(anyhow::anyhow!("OpenAI max tokens must be between 1 and 128000."));
        }

        if self.history_size < 1 {
            return Err(anyhow::anyhow!("History size must be at least 1."));
        }

        if self.context_token_budget < 1 {
            return Err(anyhow::anyhow!("Context token budget must be at least 1."));
        }

        if self.heartbeat_interval_secs < 1 {
            return Err(anyhow::anyhow!("Heartbeat interval must be at least 1 second."));
        }

        Ok(())
    }
}
