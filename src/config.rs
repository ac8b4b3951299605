//! Configuration loading.
//!
//! Settings come from `~/.assistant-relay/settings.json` (or an explicit
//! path), then environment variables override individual fields.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

const REDACTED: &str = "***";

/// Get the relay home directory (~/.assistant-relay).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".assistant-relay"))
}

/// Get the default settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from `path` (or the default location), then apply
/// environment overrides.
///
/// A missing file is not an error: everything can be supplied through the
/// environment.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => get_settings_path()?,
    };

    let mut settings = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        tracing::debug!("Loaded settings from {}", path.display());
        settings
    } else {
        tracing::debug!("No settings file at {}, using defaults", path.display());
        Settings::default()
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

/// Overlay environment values on top of file settings.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(host) = non_empty("HOST") {
        settings.server.host = host;
    }
    if let Some(port) = non_empty("PORT") {
        settings.server.port = port
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("PORT '{}' is not a valid port", port)))?;
    }
    if let Some(channel) = non_empty("CHANNEL") {
        settings.channel.kind = ChannelKind::parse(&channel)?;
    }
    if let Some(provider) = non_empty("ASSISTANT_PROVIDER") {
        settings.assistant.provider = ProviderKind::parse(&provider)?;
    }
    if let Some(id) = non_empty("ASSISTANT_ID") {
        settings.assistant.assistant_id = id;
    }
    if let Some(key) = non_empty("OPENAI_API_KEY") {
        settings.assistant.api_key = Some(key);
    }
    if let Some(url) = non_empty("OPENAI_BASE_URL") {
        settings.assistant.openai_base_url = url;
    }
    if let Some(url) = non_empty("OLLAMA_BASE_URL") {
        settings.assistant.ollama_base_url = url;
    }
    if let Some(token) = non_empty("JWT_TOKEN") {
        settings.channel.meta.jwt_token = Some(token);
    }
    if let Some(number_id) = non_empty("NUMBER_ID") {
        settings.channel.meta.number_id = Some(number_id);
    }
    if let Some(token) = non_empty("VERIFY_TOKEN") {
        settings.channel.meta.verify_token = Some(token);
    }
    if let Some(version) = non_empty("META_VERSION") {
        settings.channel.meta.version = version;
    }
    if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
        settings.channel.telegram.bot_token = Some(token);
    }
    if let Some(path) = non_empty("DATABASE_PATH") {
        settings.storage.database_path = Some(PathBuf::from(path));
    }
    if let Some(dir) = non_empty("LOG_DIR") {
        settings.logging.dir = Some(PathBuf::from(dir));
    }
    if let Some(format) = non_empty("LOG_FORMAT") {
        settings.logging.json = format.trim().eq_ignore_ascii_case("json");
    }

    Ok(())
}

/// HTTP server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3008
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Assistant backend selection.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Openai,
    Ollama,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::Openai),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(Error::Config(format!("Unknown assistant provider '{}'", other))),
        }
    }
}

/// Assistant backend configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssistantConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// OpenAI assistant id, or the model name for Ollama.
    #[serde(default)]
    pub assistant_id: String,

    pub api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    /// Fallback model when the assistant id is empty (Ollama only).
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Per-request HTTP timeout. Unset means no cap.
    pub request_timeout_secs: Option<u64>,

    #[serde(default = "default_run_poll_interval_ms")]
    pub run_poll_interval_ms: u64,

    #[serde(default = "default_max_run_wait_secs")]
    pub max_run_wait_secs: u64,

    /// Messages of prior conversation replayed to stateless backends.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_run_poll_interval_ms() -> u64 {
    500
}

fn default_max_run_wait_secs() -> u64 {
    300
}

fn default_history_limit() -> usize {
    20
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            assistant_id: String::new(),
            api_key: None,
            openai_base_url: default_openai_base_url(),
            ollama_base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            request_timeout_secs: None,
            run_poll_interval_ms: default_run_poll_interval_ms(),
            max_run_wait_secs: default_max_run_wait_secs(),
            history_limit: default_history_limit(),
        }
    }
}

/// Which chat channel the relay serves.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Meta,
    Telegram,
}

impl ChannelKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "meta" | "whatsapp" => Ok(ChannelKind::Meta),
            "telegram" => Ok(ChannelKind::Telegram),
            other => Err(Error::Config(format!("Unknown channel '{}'", other))),
        }
    }
}

/// Meta (WhatsApp Cloud API) credentials.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MetaConfig {
    pub jwt_token: Option<String>,
    pub number_id: Option<String>,
    pub verify_token: Option<String>,
    #[serde(default = "default_meta_version")]
    pub version: String,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
}

fn default_meta_version() -> String {
    "v18.0".to_string()
}

fn default_graph_url() -> String {
    "https://graph.facebook.com".to_string()
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            jwt_token: None,
            number_id: None,
            verify_token: None,
            version: default_meta_version(),
            graph_url: default_graph_url(),
        }
    }
}

/// Telegram bot credentials.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
}

/// Channel configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ChannelConfig {
    #[serde(default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Conversation state storage.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StorageConfig {
    /// SQLite file; defaults to ~/.assistant-relay/state.db
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_home_dir()?.join("state.db")),
        }
    }
}

/// Log output.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoggingConfig {
    /// Directory for the daily log files; defaults to the platform data dir.
    pub dir: Option<PathBuf>,

    /// Filter directives used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Write the log file as JSON lines.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info,assistant_relay=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn resolved_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        let dirs = directories::ProjectDirs::from("com", "assistant-relay", "assistant-relay")
            .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
        Ok(dirs.data_dir().join("logs"))
    }
}

/// Relay settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Check what the assistant backend needs.
    pub fn validate_assistant(&self) -> Result<()> {
        if self.assistant.provider == ProviderKind::Openai {
            if self.assistant.assistant_id.trim().is_empty() {
                return Err(Error::Config(
                    "assistant.assistant_id (ASSISTANT_ID) is required for the openai provider"
                        .to_string(),
                ));
            }
            if is_blank(&self.assistant.api_key) {
                return Err(Error::Config(
                    "assistant.api_key (OPENAI_API_KEY) is required for the openai provider"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Check what the selected channel needs.
    pub fn validate_channel(&self) -> Result<()> {
        match self.channel.kind {
            ChannelKind::Meta => {
                let meta = &self.channel.meta;
                for (value, name) in [
                    (&meta.jwt_token, "channel.meta.jwt_token (JWT_TOKEN)"),
                    (&meta.number_id, "channel.meta.number_id (NUMBER_ID)"),
                    (&meta.verify_token, "channel.meta.verify_token (VERIFY_TOKEN)"),
                ] {
                    if is_blank(value) {
                        return Err(Error::Config(format!("{} is required", name)));
                    }
                }
            }
            ChannelKind::Telegram => {
                if is_blank(&self.channel.telegram.bot_token) {
                    return Err(Error::Config(
                        "channel.telegram.bot_token (TELEGRAM_BOT_TOKEN) is required".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Copy with every secret masked, for display.
    pub fn redacted(&self) -> Settings {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_string());
        let mut out = self.clone();
        out.assistant.api_key = mask(&self.assistant.api_key);
        out.channel.meta.jwt_token = mask(&self.channel.meta.jwt_token);
        out.channel.meta.verify_token = mask(&self.channel.meta.verify_token);
        out.channel.telegram.bot_token = mask(&self.channel.telegram.bot_token);
        out
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
