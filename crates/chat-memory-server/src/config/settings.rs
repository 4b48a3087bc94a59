use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub memory: MemoryConfig,
    pub generator: GeneratorConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            // React dev servers
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Refuse to create a session while the store is full of live sessions.
    #[default]
    Reject,
    /// Drop the least recently updated session to make room.
    EvictLeastRecent,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_sessions: usize,
    pub session_ttl_seconds: u64,
    pub max_turns_per_session: usize,
    pub capacity_policy: CapacityPolicy,
    /// 0 disables the background sweeper
    pub sweep_interval_seconds: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            session_ttl_seconds: 24 * 60 * 60,
            max_turns_per_session: 5,
            capacity_policy: CapacityPolicy::Reject,
            sweep_interval_seconds: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_seconds: u64,
    pub smooth_streaming: bool,
    pub pacing_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash-exp".to_string(),
            api_key: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
            timeout_seconds: 120,
            smooth_streaming: true,
            pacing_ms: 0,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding expert and helpful assistant.

Key traits:
- Be helpful, harmless, and honest
- Provide clear, accurate information
- When writing code, explain it clearly
- Use proper formatting for code blocks
- Be concise but thorough";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// Turns read back for the `/chat` endpoints (the store cap usually wins)
    pub history_limit: usize,
    /// Capacity of the queue between the generator and the SSE response
    pub stream_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            stream_buffer: 32,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Enables a daily rolling file sink in this directory
    pub directory: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(Self::environment())
            .build()?;

        Self::from_config(config)
    }

    /// `APP_<SECTION>__<KEY>`, e.g. `APP_MEMORY__MAX_SESSIONS=50`.
    fn environment() -> Environment {
        Environment::with_prefix("APP")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("server.allowed_origins")
            .try_parsing(true)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let mut settings: Settings = config.try_deserialize()?;

        if settings.generator.api_key.is_empty() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                settings.generator.api_key = key;
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.generator.api_key.trim().is_empty() {
            anyhow::bail!("generator API key is required (APP_GENERATOR__API_KEY or GEMINI_API_KEY)");
        }
        if self.memory.max_sessions == 0 {
            anyhow::bail!("memory.max_sessions must be at least 1");
        }
        if self.memory.max_turns_per_session == 0 {
            anyhow::bail!("memory.max_turns_per_session must be at least 1");
        }
        if self.memory.session_ttl_seconds == 0 {
            anyhow::bail!("memory.session_ttl_seconds must be at least 1");
        }
        if self.chat.stream_buffer == 0 {
            anyhow::bail!("chat.stream_buffer must be at least 1");
        }
        Ok(())
    }
}
