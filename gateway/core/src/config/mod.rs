//! TOML Configuration File Support
//!
//! Centralized configuration loading for the gateway, supporting a TOML file
//! at `~/.config/agent-gateway/gateway.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/agent-gateway/gateway.toml` (typically `~/.config/agent-gateway/gateway.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [agent]
//! agent_id = "ABCDEFGHIJ"
//! agent_alias_id = "TSTALIASID"
//! region = "us-east-1"
//! request_timeout_secs = 120
//!
//! [rate_limit]
//! max_requests = 2
//! window_secs = 60
//! enabled = true
//!
//! [server]
//! bind = "0.0.0.0:8000"
//! request_log = "/var/log/agent-gateway/requests.jsonl"
//! static_dir = "static"
//! debug_env = false
//! max_prompt_length = 2000
//! trust_forwarded_for = false
//! session_idle_secs = 1800
//!
//! [presentation]
//! support_contact = "support@example.com"
//! example_prompts = "example_prompts.json"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rate_limit::RateLimitConfig;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Agent section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentToml {
    /// Agent identifier
    pub agent_id: Option<String>,

    /// Agent alias identifier
    pub agent_alias_id: Option<String>,

    /// AWS region of the agent runtime
    pub region: Option<String>,

    /// Endpoint base URL override
    pub endpoint: Option<String>,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Rate limiting section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitToml {
    /// Requests allowed per client per window
    pub max_requests: Option<u32>,

    /// Window length in seconds
    pub window_secs: Option<u64>,

    /// Whether rate limiting is enabled
    pub enabled: Option<bool>,
}

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Socket address to listen on
    pub bind: Option<String>,

    /// JSON lines request log path
    pub request_log: Option<PathBuf>,

    /// Directory served under `/static`
    pub static_dir: Option<PathBuf>,

    /// Whether to expose `/debug-env`
    pub debug_env: Option<bool>,

    /// Maximum accepted prompt length in characters
    pub max_prompt_length: Option<usize>,

    /// Whether `X-Forwarded-For` identifies the caller
    pub trust_forwarded_for: Option<bool>,

    /// Seconds without a turn before a session is evicted
    pub session_idle_secs: Option<u64>,
}

/// Presentation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationToml {
    /// Contact named in the "no references" notice
    pub support_contact: Option<String>,

    /// JSON file holding a list of example questions
    pub example_prompts: Option<PathBuf>,
}

/// Root TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayToml {
    /// Agent settings
    pub agent: AgentToml,

    /// Rate limiting settings
    pub rate_limit: RateLimitToml,

    /// HTTP server settings
    pub server: ServerToml,

    /// Answer rendering settings
    pub presentation: PresentationToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Default agent runtime region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

/// Default maximum prompt length
pub const DEFAULT_MAX_PROMPT_LENGTH: usize = 2000;

/// Default idle time before a server-side session is evicted
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 1800;

/// Default contact named in the "no references" notice
pub const DEFAULT_SUPPORT_CONTACT: &str = "our support team";

/// Which agent to invoke and how
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identifier
    pub agent_id: String,
    /// Agent alias identifier
    pub agent_alias_id: String,
    /// AWS region
    pub region: String,
    /// Endpoint base URL override (local proxies, tests)
    pub endpoint: Option<String>,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: String::new(),
            agent_alias_id: String::new(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl AgentConfig {
    /// Base URL of the agent runtime
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!("https://bedrock-agent-runtime.{}.amazonaws.com", self.region)
        })
    }
}

/// HTTP server settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
    /// JSON lines request log path; `None` logs through `tracing` only
    pub request_log: Option<PathBuf>,
    /// Directory served under `/static`
    pub static_dir: Option<PathBuf>,
    /// Whether `/debug-env` is routed
    pub debug_env: bool,
    /// Maximum accepted prompt length in characters
    pub max_prompt_length: usize,
    /// Take the caller identity from `X-Forwarded-For`; only safe behind a
    /// proxy that overwrites the header
    pub trust_forwarded_for: bool,
    /// Seconds without a turn before a session is evicted
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            request_log: None,
            static_dir: None,
            debug_env: false,
            max_prompt_length: DEFAULT_MAX_PROMPT_LENGTH,
            trust_forwarded_for: false,
            session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
        }
    }
}

/// Fully resolved gateway configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Agent settings
    pub agent: AgentConfig,

    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Contact named in the "no references" notice
    pub support_contact: String,

    /// JSON file holding a list of example questions
    pub example_prompts: Option<PathBuf>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            rate_limit: RateLimitConfig::default(),
            server: ServerConfig::default(),
            support_contact: DEFAULT_SUPPORT_CONTACT.to_string(),
            example_prompts: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check the values a running gateway needs
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.agent_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "agent_id is required (set AGENT_ID or [agent].agent_id)".into(),
            ));
        }
        if self.agent.agent_alias_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "agent_alias_id is required (set AGENT_ALIAS_ID or [agent].agent_alias_id)".into(),
            ));
        }
        if self.agent.region.trim().is_empty() {
            return Err(ConfigError::ValidationError("region must not be empty".into()));
        }
        if self.rate_limit.enabled && self.rate_limit.max_requests == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.max_requests must be at least 1".into(),
            ));
        }
        if self.rate_limit.enabled && self.rate_limit.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.window_secs must be at least 1".into(),
            ));
        }
        if self.server.max_prompt_length == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_prompt_length must be at least 1".into(),
            ));
        }
        if self.server.session_idle_secs == 0 {
            return Err(ConfigError::ValidationError(
                "server.session_idle_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/agent-gateway/gateway.toml` or
/// `~/.config/agent-gateway/gateway.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("agent-gateway").join("gateway.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<GatewayConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration reading environment values through `lookup`
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = GatewayConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: GatewayToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, lookup);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut GatewayConfig, toml: &GatewayToml) {
    // Agent settings
    if let Some(ref id) = toml.agent.agent_id {
        config.agent.agent_id.clone_from(id);
    }
    if let Some(ref alias) = toml.agent.agent_alias_id {
        config.agent.agent_alias_id.clone_from(alias);
    }
    if let Some(ref region) = toml.agent.region {
        config.agent.region.clone_from(region);
    }
    if toml.agent.endpoint.is_some() {
        config.agent.endpoint.clone_from(&toml.agent.endpoint);
    }
    if let Some(timeout) = toml.agent.request_timeout_secs {
        config.agent.request_timeout_secs = timeout;
    }

    // Rate limit settings
    if let Some(max) = toml.rate_limit.max_requests {
        config.rate_limit.max_requests = max;
    }
    if let Some(window) = toml.rate_limit.window_secs {
        config.rate_limit.window_secs = window;
    }
    if let Some(enabled) = toml.rate_limit.enabled {
        config.rate_limit.enabled = enabled;
    }

    // Server settings
    if let Some(ref bind) = toml.server.bind {
        config.server.bind.clone_from(bind);
    }
    if toml.server.request_log.is_some() {
        config.server.request_log.clone_from(&toml.server.request_log);
    }
    if toml.server.static_dir.is_some() {
        config.server.static_dir.clone_from(&toml.server.static_dir);
    }
    if let Some(debug_env) = toml.server.debug_env {
        config.server.debug_env = debug_env;
    }
    if let Some(length) = toml.server.max_prompt_length {
        config.server.max_prompt_length = length;
    }
    if let Some(trust) = toml.server.trust_forwarded_for {
        config.server.trust_forwarded_for = trust;
    }
    if let Some(idle) = toml.server.session_idle_secs {
        config.server.session_idle_secs = idle;
    }

    // Presentation settings
    if let Some(ref contact) = toml.presentation.support_contact {
        config.support_contact.clone_from(contact);
    }
    if toml.presentation.example_prompts.is_some() {
        config.example_prompts.clone_from(&toml.presentation.example_prompts);
    }
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Agent settings from environment
    if let Some(id) = lookup("AGENT_ID") {
        config.agent.agent_id = id;
        config.source = ConfigSource::Env;
    }
    if let Some(alias) = lookup("AGENT_ALIAS_ID") {
        config.agent.agent_alias_id = alias;
        config.source = ConfigSource::Env;
    }
    if let Some(region) = lookup("AWS_REGION") {
        config.agent.region = region;
        config.source = ConfigSource::Env;
    }

    // Rate limit settings from environment
    if let Some(max) = lookup("GATEWAY_RATE_LIMIT_MAX") {
        if let Ok(max) = max.parse::<u32>() {
            config.rate_limit.max_requests = max;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(window) = lookup("GATEWAY_RATE_LIMIT_WINDOW") {
        if let Ok(secs) = window.parse::<u64>() {
            config.rate_limit.window_secs = secs;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(enabled) = lookup("GATEWAY_RATE_LIMIT_ENABLED") {
        config.rate_limit.enabled = parse_flag(&enabled);
        config.source = ConfigSource::Env;
    }

    // Server settings from environment
    if let Some(bind) = lookup("GATEWAY_BIND") {
        config.server.bind = bind;
        config.source = ConfigSource::Env;
    }
    if let Some(path) = lookup("GATEWAY_REQUEST_LOG") {
        config.server.request_log = Some(PathBuf::from(path));
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = lookup("GATEWAY_STATIC_DIR") {
        config.server.static_dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = lookup("GATEWAY_DEBUG_ENV") {
        config.server.debug_env = parse_flag(&enabled);
        config.source = ConfigSource::Env;
    }
    if let Some(trust) = lookup("GATEWAY_TRUST_FORWARDED_FOR") {
        config.server.trust_forwarded_for = parse_flag(&trust);
        config.source = ConfigSource::Env;
    }
    if let Some(idle) = lookup("GATEWAY_SESSION_IDLE_SECS") {
        if let Ok(secs) = idle.parse::<u64>() {
            config.server.session_idle_secs = secs;
            config.source = ConfigSource::Env;
        }
    }

    // Presentation settings from environment
    if let Some(contact) = lookup("GATEWAY_SUPPORT_CONTACT") {
        config.support_contact = contact;
        config.source = ConfigSource::Env;
    }
    if let Some(path) = lookup("GATEWAY_EXAMPLE_PROMPTS") {
        config.example_prompts = Some(PathBuf::from(path));
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// CLI argument overrides for configuration
///
/// Applied after loading from file and environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Agent identifier override
    pub agent_id: Option<String>,

    /// Agent alias identifier override
    pub agent_alias_id: Option<String>,

    /// Region override
    pub region: Option<String>,

    /// Endpoint base URL override
    pub endpoint: Option<String>,

    /// Listen address override
    pub bind: Option<String>,

    /// Request log path override
    pub request_log: Option<PathBuf>,

    /// Rate limiting on/off override
    pub rate_limit_enabled: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set agent identifier override
    #[must_use]
    pub fn with_agent_id(mut self, id: String) -> Self {
        self.agent_id = Some(id);
        self
    }

    /// Set agent alias identifier override
    #[must_use]
    pub fn with_agent_alias_id(mut self, alias: String) -> Self {
        self.agent_alias_id = Some(alias);
        self
    }

    /// Set region override
    #[must_use]
    pub fn with_region(mut self, region: String) -> Self {
        self.region = Some(region);
        self
    }

    /// Set endpoint override
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set listen address override
    #[must_use]
    pub fn with_bind(mut self, bind: String) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Set request log path override
    #[must_use]
    pub fn with_request_log(mut self, path: PathBuf) -> Self {
        self.request_log = Some(path);
        self
    }

    /// Set rate limiting on/off override
    #[must_use]
    pub fn with_rate_limit_enabled(mut self, enabled: bool) -> Self {
        self.rate_limit_enabled = Some(enabled);
        self
    }

    fn is_empty(&self) -> bool {
        self.agent_id.is_none()
            && self.agent_alias_id.is_none()
            && self.region.is_none()
            && self.endpoint.is_none()
            && self.bind.is_none()
            && self.request_log.is_none()
            && self.rate_limit_enabled.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut GatewayConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref id) = self.agent_id {
            config.agent.agent_id.clone_from(id);
        }
        if let Some(ref alias) = self.agent_alias_id {
            config.agent.agent_alias_id.clone_from(alias);
        }
        if let Some(ref region) = self.region {
            config.agent.region.clone_from(region);
        }
        if self.endpoint.is_some() {
            config.agent.endpoint.clone_from(&self.endpoint);
        }
        if let Some(ref bind) = self.bind {
            config.server.bind.clone_from(bind);
        }
        if self.request_log.is_some() {
            config.server.request_log.clone_from(&self.request_log);
        }
        if let Some(enabled) = self.rate_limit_enabled {
            config.rate_limit.enabled = enabled;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();

        assert_eq!(config.agent.region, "us-east-1");
        assert_eq!(config.rate_limit.max_requests, 2);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.server.max_prompt_length, 2000);
        assert!(!config.server.debug_env);
        assert!(!config.server.trust_forwarded_for);
        assert_eq!(config.server.session_idle_secs, 1800);
        assert!(config.example_prompts.is_none());
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_default_endpoint_uses_region() {
        let mut agent = AgentConfig::default();
        agent.region = "eu-central-1".into();
        assert_eq!(
            agent.endpoint_url(),
            "https://bedrock-agent-runtime.eu-central-1.amazonaws.com"
        );
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("agent-gateway/gateway.toml"));
        }
    }

    // =========================================================================
    // Loading Tests
    // =========================================================================

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            load_config_with_env(Some(PathBuf::from("/nonexistent/gateway.toml")), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let file = write_toml(
            r#"
[agent]
agent_id = "AGENT"
agent_alias_id = "ALIAS"
region = "us-west-2"

[rate_limit]
max_requests = 5

[server]
debug_env = true
request_log = "/tmp/requests.jsonl"

[presentation]
support_contact = "help@example.com"
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.agent.agent_id, "AGENT");
        assert_eq!(config.agent.region, "us-west-2");
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert!(config.server.debug_env);
        assert_eq!(
            config.server.request_log,
            Some(PathBuf::from("/tmp/requests.jsonl"))
        );
        assert_eq!(config.support_contact, "help@example.com");
        assert_eq!(config.source(), ConfigSource::File);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_toml() {
        let file = write_toml("[agent]\nagent_id = \"FROM_FILE\"\n[rate_limit]\nwindow_secs = 30\n");
        let env = env_from(&[
            ("AGENT_ID", "FROM_ENV"),
            ("GATEWAY_RATE_LIMIT_WINDOW", "90"),
            ("GATEWAY_RATE_LIMIT_ENABLED", "false"),
            ("GATEWAY_DEBUG_ENV", "1"),
        ]);

        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();
        assert_eq!(config.agent.agent_id, "FROM_ENV");
        assert_eq!(config.rate_limit.window_secs, 90);
        assert!(!config.rate_limit.enabled);
        assert!(config.server.debug_env);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_forwarding_idle_and_examples_settings() {
        let file = write_toml(
            "[server]\ntrust_forwarded_for = true\nsession_idle_secs = 600\n\
             [presentation]\nexample_prompts = \"faq.json\"\n",
        );
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert!(config.server.trust_forwarded_for);
        assert_eq!(config.server.session_idle_secs, 600);
        assert_eq!(config.example_prompts, Some(PathBuf::from("faq.json")));

        let env = env_from(&[
            ("GATEWAY_TRUST_FORWARDED_FOR", "false"),
            ("GATEWAY_SESSION_IDLE_SECS", "60"),
            ("GATEWAY_EXAMPLE_PROMPTS", "/etc/gateway/faq.json"),
        ]);
        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();
        assert!(!config.server.trust_forwarded_for);
        assert_eq!(config.server.session_idle_secs, 60);
        assert_eq!(
            config.example_prompts,
            Some(PathBuf::from("/etc/gateway/faq.json"))
        );
    }

    #[test]
    fn test_unparseable_env_number_is_ignored() {
        let env = env_from(&[("GATEWAY_RATE_LIMIT_MAX", "lots")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.rate_limit.max_requests, 2);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let file = write_toml("[agent\nagent_id = ");
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    // =========================================================================
    // CLI Override Tests
    // =========================================================================

    #[test]
    fn test_cli_overrides_env() {
        let env = env_from(&[("AGENT_ID", "FROM_ENV"), ("GATEWAY_BIND", "127.0.0.1:9000")]);
        let mut config = load_config_with_env(None, env).unwrap();

        ConfigOverrides::new()
            .with_agent_id("FROM_CLI".into())
            .with_rate_limit_enabled(false)
            .apply(&mut config);

        assert_eq!(config.agent.agent_id, "FROM_CLI");
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = GatewayConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[test]
    fn test_validate_requires_agent_ids() {
        let config = GatewayConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("agent_id"));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = GatewayConfig::default();
        config.agent.agent_id = "A".into();
        config.agent.agent_alias_id = "B".into();
        config.rate_limit.window_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());

        config.server.session_idle_secs = 0;
        assert!(config.validate().is_err());
    }
}
