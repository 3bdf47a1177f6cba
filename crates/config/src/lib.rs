//! Configuration loading, validation, and management for ShopDesk.
//!
//! Loads configuration from `~/.shopdesk/config.toml` (or an explicit path)
//! and then applies environment variable overrides. Validates all settings
//! at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.shopdesk/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion and embedding endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion / embedding endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Vector store holding the knowledge base
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Order-operations sidecar
    #[serde(default)]
    pub sidecar: SidecarConfig,

    /// Inbound HTTP surface
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Turn orchestration behaviour
    #[serde(default)]
    pub assistant: AssistantConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("knowledge", &self.knowledge)
            .field("sidecar", &self.sidecar)
            .field("gateway", &self.gateway)
            .field("assistant", &self.assistant)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_url() -> String {
    "https://dashscope.aliyuncs.com/api/v1".into()
}
fn default_chat_model() -> String {
    "qwen-max".into()
}
fn default_embedding_model() -> String {
    "text-embedding-v2".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.8
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_host")]
    pub host: String,

    #[serde(default = "default_knowledge_port")]
    pub port: u16,

    #[serde(default = "default_tenant")]
    pub tenant: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Snippets fetched per chat turn
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_knowledge_host() -> String {
    "localhost".into()
}
fn default_knowledge_port() -> u16 {
    8000
}
fn default_tenant() -> String {
    "default_tenant".into()
}
fn default_database() -> String {
    "default_database".into()
}
fn default_collection() -> String {
    "shop_knowledge".into()
}
fn default_top_k() -> usize {
    3
}

impl KnowledgeConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            host: default_knowledge_host(),
            port: default_knowledge_port(),
            tenant: default_tenant(),
            database: default_database(),
            collection: default_collection(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// Interpreter or executable to launch
    #[serde(default = "default_sidecar_command")]
    pub command: String,

    /// Script passed as the first argument
    #[serde(default = "default_server_path")]
    pub server_path: String,

    /// Extra arguments after the script path
    #[serde(default)]
    pub args: Vec<String>,

    /// Shop backend base URL, exported to the sidecar as `JAVA_SHOP_URL`
    #[serde(default = "default_shop_url")]
    pub shop_url: String,

    /// Additional environment for the sidecar process
    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    #[serde(default = "default_client_name")]
    pub client_name: String,

    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// How long to wait for the sidecar to exit after its input is closed
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_sidecar_command() -> String {
    "python3".into()
}
fn default_server_path() -> String {
    "/root/mcp-server/server.py".into()
}
fn default_shop_url() -> String {
    "http://localhost:8080".into()
}
fn default_protocol_version() -> String {
    "2024-11-05".into()
}
fn default_client_name() -> String {
    "shopdesk".into()
}
fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}
fn default_shutdown_timeout() -> u64 {
    5
}

impl SidecarConfig {
    /// Full argument vector: script path followed by the extra args.
    pub fn program_args(&self) -> Vec<String> {
        std::iter::once(self.server_path.clone())
            .filter(|path| !path.is_empty())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            command: default_sidecar_command(),
            server_path: default_server_path(),
            args: Vec::new(),
            shop_url: default_shop_url(),
            env: HashMap::new(),
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    8081
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// How a chat turn reaches the tool sidecar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    /// One completion, at most one inline directive.
    #[default]
    Directive,
    /// Structured tool calls, repeated until the model stops asking.
    ToolLoop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub mode: AssistantMode,

    /// Round limit for [`AssistantMode::ToolLoop`]
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Match order intents by keyword when the model emitted no directive
    #[serde(default)]
    pub keyword_fallback: bool,

    /// Replaces the built-in system preamble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_tool_rounds() -> u32 {
    5
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            mode: AssistantMode::default(),
            max_tool_rounds: default_max_tool_rounds(),
            keyword_fallback: false,
            system_prompt: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or `~/.shopdesk/config.toml` when none
    /// is given, then apply the process environment.
    ///
    /// Recognised variables:
    /// - `SHOPDESK_API_KEY` / `DASHSCOPE_API_KEY`
    /// - `CHROMA_HOST`, `CHROMA_PORT`
    /// - `JAVA_SHOP_URL`, `MCP_SERVER_PATH`
    /// - `PORT`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path. No environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Non-empty values win over
    /// the file; the API key is only filled in when the file has none.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = var("SHOPDESK_API_KEY").or_else(|| var("DASHSCOPE_API_KEY"));
        }
        if let Some(host) = var("CHROMA_HOST") {
            self.knowledge.host = host;
        }
        if let Some(port) = var("CHROMA_PORT") {
            self.knowledge.port = parse_port("CHROMA_PORT", &port)?;
        }
        if let Some(url) = var("JAVA_SHOP_URL") {
            self.sidecar.shop_url = url;
        }
        if let Some(path) = var("MCP_SERVER_PATH") {
            self.sidecar.server_path = path;
        }
        if let Some(port) = var("PORT") {
            self.gateway.port = parse_port("PORT", &port)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".shopdesk")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.provider.top_p <= 0.0 || self.provider.top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "provider.top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.sidecar.command.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sidecar.command must not be empty".into(),
            ));
        }

        if self.assistant.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "assistant.max_tool_rounds must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// The API key, or an error naming the variables that can supply it.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderConfig::default(),
            knowledge: KnowledgeConfig::default(),
            sidecar: SidecarConfig::default(),
            gateway: GatewayConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} is not a valid port: {value}")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No API key configured: set api_key, SHOPDESK_API_KEY or DASHSCOPE_API_KEY")]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 8081);
        assert_eq!(config.knowledge.base_url(), "http://localhost:8000");
        assert_eq!(config.knowledge.collection, "shop_knowledge");
        assert_eq!(config.sidecar.protocol_version, "2024-11-05");
        assert_eq!(config.assistant.mode, AssistantMode::Directive);
        assert!(!config.assistant.keyword_fallback);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[provider]
chat_model = "qwen-plus"

[assistant]
mode = "tool_loop"
max_tool_rounds = 3
"#,
        )
        .unwrap();
        assert_eq!(config.provider.chat_model, "qwen-plus");
        assert_eq!(config.provider.embedding_model, "text-embedding-v2");
        assert_eq!(config.assistant.mode, AssistantMode::ToolLoop);
        assert_eq!(config.assistant.max_tool_rounds, 3);
        assert_eq!(config.knowledge.top_k, 3);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(env_of(&[
                ("DASHSCOPE_API_KEY", "sk-test"),
                ("CHROMA_HOST", "chroma"),
                ("CHROMA_PORT", "8001"),
                ("JAVA_SHOP_URL", "http://shop:8080"),
                ("MCP_SERVER_PATH", "/srv/server.py"),
                ("PORT", "9000"),
            ]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.knowledge.base_url(), "http://chroma:8001");
        assert_eq!(config.sidecar.shop_url, "http://shop:8080");
        assert_eq!(config.sidecar.program_args(), vec!["/srv/server.py".to_string()]);
        assert_eq!(config.gateway.port, 9000);
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config
            .apply_env_overrides(env_of(&[("DASHSCOPE_API_KEY", "from-env")]))
            .unwrap();
        assert_eq!(config.require_api_key().unwrap(), "from-file");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(env_of(&[("CHROMA_HOST", "  "), ("DASHSCOPE_API_KEY", "")]))
            .unwrap();
        assert_eq!(config.knowledge.host, "localhost");
        assert!(matches!(config.require_api_key(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(env_of(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn invalid_sampling_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 5.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.provider.top_p = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.assistant.max_tool_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.gateway.port, 8081);
    }

    #[test]
    fn load_from_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway]\nport = 7000\n[sidecar]\nargs = [\"--stdio\"]").unwrap();
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.gateway.port, 7000);
        assert_eq!(
            config.sidecar.program_args(),
            vec!["/root/mcp-server/server.py".to_string(), "--stdio".to_string()]
        );
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway\nport = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("qwen-max"));
        assert!(toml_str.contains("8081"));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sidecar.command, "python3");
    }
}
