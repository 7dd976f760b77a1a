//! Configuration file loading.
//!
//! The format is chosen by file extension. Environment overrides are applied
//! after parsing and before validation.

use crate::error::{ConfigError, ConfigResult};
use crate::gateway::GatewayConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Overrides `logging.level`
pub const ENV_LOG_LEVEL: &str = "GATEWAY_LOG_LEVEL";
/// Overrides `logging.format`
pub const ENV_LOG_FORMAT: &str = "GATEWAY_LOG_FORMAT";

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    ///
    /// # Errors
    /// Returns an error for unknown or missing extensions.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Format name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    /// Deserialize configuration text
    ///
    /// # Errors
    /// Returns a parse error carrying the parser's message.
    pub fn parse(self, content: &str) -> ConfigResult<GatewayConfig> {
        let parse_err = |message: String| ConfigError::Parse {
            format: self.as_str(),
            message,
        };
        match self {
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string())),
            Self::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
            Self::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        }
    }
}

/// Loads [`GatewayConfig`] from a file plus environment overrides
#[derive(Debug, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
    skip_validation: bool,
}

impl ConfigLoader {
    /// Create a loader
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration file
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Read overrides from this map instead of the process environment
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Return the configuration even if it fails validation
    #[must_use]
    pub fn skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    fn lookup(&self, key: &str) -> Option<String> {
        match &self.env {
            Some(env) => env.get(key).cloned(),
            None => std::env::var(key).ok(),
        }
    }

    /// Apply environment overrides to a parsed configuration
    pub fn apply_env_overrides(&self, config: &mut GatewayConfig) {
        if let Some(level) = self.lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            debug!(level = %level, "Log level overridden from environment");
            config.logging.level = level;
        }
        if let Some(format) = self.lookup(ENV_LOG_FORMAT).filter(|v| !v.trim().is_empty()) {
            config.logging.format = format;
        }
    }

    /// Parse configuration text, apply overrides and validate
    ///
    /// # Errors
    /// Returns parse or validation errors.
    pub fn load_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
        let mut config = format.parse(content)?;
        self.apply_env_overrides(&mut config);
        if !self.skip_validation {
            config.validate()?;
        }
        Ok(config)
    }

    /// Load the configured file
    ///
    /// # Errors
    /// Returns an error if no file is set, or it cannot be read, parsed or
    /// validated.
    pub async fn load(&self) -> ConfigResult<GatewayConfig> {
        let path = self.file.as_ref().ok_or(ConfigError::NoFile)?;
        let format = ConfigFormat::from_path(path)?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;

        let config = self.load_str(&content, format)?;
        info!(
            path = %path.display(),
            format = format.as_str(),
            models = config.models.len(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// Load, override and validate a configuration file
///
/// # Errors
/// See [`ConfigLoader::load`].
pub async fn load_config(path: impl Into<PathBuf>) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().with_file(path).load().await
}
