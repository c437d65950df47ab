use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "ASSISTANT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "assistant.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How often to poll the inbox (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Extra lookback added to each poll window so messages arriving near a
    /// tick boundary are not skipped (seconds)
    #[serde(default = "default_lookback_slack")]
    pub lookback_slack_secs: u64,

    /// Upper bound for any single external call (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Zone used for relative times in emails and for calendar writes
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub mode: AssistantMode,

    /// How many processed message ids to remember
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,

    #[serde(default)]
    pub gmail: GmailConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

/// Which capabilities the assistant is allowed to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    /// Drafts replies and manages calendar entries
    #[default]
    Scheduling,
    /// Drafts replies only
    DraftOnly,
}

/// OAuth files for one Google account system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleAccountConfig {
    /// Path to Google OAuth client credentials JSON file
    pub credentials_path: PathBuf,

    /// Path to store the OAuth token cache
    pub token_cache_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    #[serde(default = "default_gmail_token_path")]
    pub token_cache_path: PathBuf,
}

impl GmailConfig {
    pub fn account(&self) -> GoogleAccountConfig {
        GoogleAccountConfig {
            credentials_path: self.credentials_path.clone(),
            token_cache_path: self.token_cache_path.clone(),
        }
    }
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            token_cache_path: default_gmail_token_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    #[serde(default = "default_calendar_token_path")]
    pub token_cache_path: PathBuf,

    /// Calendar to read and write
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

impl CalendarConfig {
    pub fn account(&self) -> GoogleAccountConfig {
        GoogleAccountConfig {
            credentials_path: self.credentials_path.clone(),
            token_cache_path: self.token_cache_path.clone(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            token_cache_path: default_calendar_token_path(),
            calendar_id: default_calendar_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum oracle round-trips per email
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Upper bound for one model request (seconds)
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,

    /// Falls back to GEMINI_API_KEY / GOOGLE_API_KEY
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_steps: default_max_steps(),
            temperature: default_temperature(),
            api_base: default_api_base(),
            timeout_secs: default_agent_timeout(),
            api_key: None,
        }
    }
}

fn default_poll_interval() -> u64 {
    600 // 10 minutes
}

fn default_lookback_slack() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_timezone() -> String {
    "Asia/Kolkata".to_string()
}

fn default_ledger_capacity() -> usize {
    1000
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_gmail_token_path() -> PathBuf {
    PathBuf::from("gmail_token.json")
}

fn default_calendar_token_path() -> PathBuf {
    PathBuf::from("calendar_token.json")
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_max_steps() -> u32 {
    15
}

fn default_temperature() -> f64 {
    0.2
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_agent_timeout() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Config {
            poll_interval_secs: default_poll_interval(),
            lookback_slack_secs: default_lookback_slack(),
            request_timeout_secs: default_request_timeout(),
            timezone: default_timezone(),
            mode: AssistantMode::default(),
            ledger_capacity: default_ledger_capacity(),
            gmail: GmailConfig::default(),
            calendar: CalendarConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `ASSISTANT_CONFIG` (default `assistant.toml`), falling back
    /// to defaults when the file does not exist.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            tracing::info!(path = %path.display(), "config_file_missing_using_defaults");
            let config = Config::default();
            config.validate()?;
            config
        };

        if config.agent.api_key.is_none() {
            config.agent.api_key = std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("GOOGLE_API_KEY"))
                .ok();
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.agent.timeout_secs == 0 {
            bail!("agent.timeout_secs must be greater than zero");
        }
        if self.agent.max_steps == 0 {
            bail!("agent.max_steps must be greater than zero");
        }
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("Unknown timezone '{}'", self.timezone))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lookback_slack(&self) -> Duration {
        Duration::from_secs(self.lookback_slack_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }
}
