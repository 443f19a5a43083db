//! Client configuration.

use std::path::Path;
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Environment variable overriding the application namespace.
pub const NAMESPACE_ENV: &str = "TICTACTOE_NAMESPACE";

/// Settings shared by every game client in a process.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_", into)]
pub struct ClientConfig {
    /// Application namespace isolating this deployment's sessions.
    #[serde(default = "default_namespace")]
    namespace: String,

    /// Fixed client id; a random one is assigned at sign-in when absent.
    #[serde(default)]
    #[setters(strip_option)]
    client_id: Option<String>,

    /// Name used when the player leaves the name field empty.
    #[serde(default = "default_display_name")]
    default_display_name: String,

    /// How many times a lost join race is retried before giving up.
    #[serde(default = "default_join_retries")]
    join_retries: u32,

    /// Upper bound on any single store call, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    store_timeout_ms: u64,
}

#[instrument]
fn default_namespace() -> String {
    "default-app-id".to_string()
}

#[instrument]
fn default_display_name() -> String {
    "Anonymous".to_string()
}

#[instrument]
fn default_join_retries() -> u32 {
    3
}

#[instrument]
fn default_store_timeout_ms() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            client_id: None,
            default_display_name: default_display_name(),
            join_retries: default_join_retries(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(namespace = %config.namespace, "Config loaded successfully");
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise starts from defaults, then
    /// applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an existing file is invalid.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Applies `TICTACTOE_NAMESPACE` when set.
    #[instrument(skip(self))]
    pub fn with_env_overrides(self) -> Self {
        match std::env::var(NAMESPACE_ENV) {
            Ok(namespace) if !namespace.trim().is_empty() => {
                info!(namespace = %namespace, "Namespace overridden from environment");
                self.with_namespace(namespace.trim())
            }
            _ => self,
        }
    }

    /// Store call deadline.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Trims a typed name, falling back to the default display name.
    pub fn resolve_display_name(&self, input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            self.default_display_name.clone()
        } else {
            trimmed.to_string()
        }
    }

    /// Checks values that would make the client unusable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::new("namespace must not be empty".to_string()));
        }
        if self.namespace.contains('/') {
            return Err(ConfigError::new(format!(
                "namespace {:?} must not contain '/'",
                self.namespace
            )));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::new("store_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
