//! Configuration management for Chatline
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ChatlineError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Chatline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote store endpoints and timeouts
    #[serde(default)]
    pub backend: BackendConfig,
    /// Identity the client acts on behalf of
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Conversation behavior
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Backend endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// GraphQL endpoint for queries and mutations
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,

    /// WebSocket endpoint for live subscriptions
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Per-request timeout for queries and mutations (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Timeout for establishing a live subscription (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_graphql_url() -> String {
    "http://localhost:8080/v1/graphql".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:8080/v1/graphql".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            graphql_url: default_graphql_url(),
            ws_url: default_ws_url(),
            request_timeout_seconds: default_request_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Identity configuration
///
/// Sign-in happens outside this client; the resulting user id and token
/// are handed over here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// User identifier used to scope conversation queries
    #[serde(default)]
    pub user_id: Option<String>,

    /// Display name shown in the chat prompt
    #[serde(default)]
    pub display_name: Option<String>,

    /// Email address of the user
    #[serde(default)]
    pub email: Option<String>,

    /// Bearer token sent with every request
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Conversation behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Title given to newly created conversations
    #[serde(default = "default_title")]
    pub default_title: String,

    /// Keep the conversation list live through a subscription
    #[serde(default = "default_live_chat_list")]
    pub live_chat_list: bool,

    /// Ask before deleting a conversation in interactive mode
    #[serde(default = "default_confirm_delete")]
    pub confirm_delete: bool,
}

fn default_title() -> String {
    "New Chat".to_string()
}

fn default_live_chat_list() -> bool {
    true
}

fn default_confirm_delete() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_title: default_title(),
            live_chat_list: default_live_chat_list(),
            confirm_delete: default_confirm_delete(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Default location of the configuration file
    ///
    /// Uses the platform config directory when it can be determined,
    /// otherwise `config/config.yaml` relative to the working directory.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("dev", "chatline", "chatline")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config/config.yaml"))
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatlineError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatlineError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("CHATLINE_GRAPHQL_URL") {
            self.backend.graphql_url = url;
        }

        if let Ok(url) = std::env::var("CHATLINE_WS_URL") {
            self.backend.ws_url = url;
        }

        if let Ok(timeout) = std::env::var("CHATLINE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.backend.request_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CHATLINE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(user_id) = std::env::var("CHATLINE_USER_ID") {
            tracing::debug!(user_id = %user_id, "Env override: CHATLINE_USER_ID");
            self.identity.user_id = Some(user_id);
        }

        if let Ok(name) = std::env::var("CHATLINE_DISPLAY_NAME") {
            self.identity.display_name = Some(name);
        }

        if let Ok(token) = std::env::var("CHATLINE_ACCESS_TOKEN") {
            self.identity.access_token = Some(token);
        }

        if let Ok(title) = std::env::var("CHATLINE_DEFAULT_TITLE") {
            self.chat.default_title = title;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(user) = &cli.user {
            self.identity.user_id = Some(user.clone());
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        check_url(&self.backend.graphql_url, "backend.graphql_url", &["http", "https"])?;
        check_url(&self.backend.ws_url, "backend.ws_url", &["ws", "wss"])?;

        if self.backend.request_timeout_seconds == 0 {
            return Err(ChatlineError::Config(
                "backend.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.backend.connect_timeout_seconds == 0 {
            return Err(ChatlineError::Config(
                "backend.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.default_title.trim().is_empty() {
            return Err(
                ChatlineError::Config("chat.default_title cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}

fn check_url(raw: &str, field: &str, schemes: &[&str]) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ChatlineError::Config(format!("Invalid {}: {} ({})", field, raw, e)))?;

    if !schemes.contains(&parsed.scheme()) {
        return Err(ChatlineError::Config(format!(
            "Invalid {} scheme: {}. Must be one of: {}",
            field,
            parsed.scheme(),
            schemes.join(", ")
        ))
        .into());
    }

    Ok(())
}
