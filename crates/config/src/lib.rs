//! Configuration loading, validation, and management for prodforge.
//!
//! Two kinds of configuration live here: job definition descriptors (see
//! [`definition`]) and the tool's own settings, loaded from
//! `~/.prodforge/config.toml` with environment variable overrides.

pub mod catalog;
pub mod definition;
pub mod jobmap;

pub use catalog::{CatalogSource, read_catalog};
pub use definition::{
    DefinitionFile, DefinitionQuery, load_definition, load_definitions,
    load_definitions_for_dsconf, select_definition,
};
pub use jobmap::{JobMap, JobMapEntry, index_from_env, index_token, parse_index_token};

use prodforge_core::location::DEFAULT_STASH_READ_ROOT;
use prodforge_core::{InputLocator, Location, Protocol};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tool settings.
///
/// Maps directly to `~/.prodforge/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Input location used when a command does not name one
    #[serde(default = "default_location")]
    pub default_location: String,

    /// Input access protocol (`file` or `root`)
    #[serde(default = "default_protocol")]
    pub default_protocol: String,

    /// CVMFS root for stash reads
    #[serde(default = "default_stash_read_root")]
    pub stash_read_root: String,

    /// Directory materialised configurations are written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Parallel sweep settings
    #[serde(default)]
    pub sweep: SweepConfig,
}

fn default_location() -> String {
    "none".into()
}
fn default_protocol() -> String {
    "file".into()
}
fn default_stash_read_root() -> String {
    DEFAULT_STASH_READ_ROOT.into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Blocking workers used by `usage` and `recovery`
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Job indices handed to a worker at a time
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

fn default_workers() -> usize {
    4
}
fn default_chunk_size() -> u64 {
    4096
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl ToolConfig {
    /// Load configuration from the default path (~/.prodforge/config.toml).
    ///
    /// Environment variables override the file:
    /// - `PRODFORGE_LOCATION`
    /// - `PRODFORGE_PROTOCOL`
    /// - `PRODFORGE_STASH_READ` (then `MU2E_STASH_READ`)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        if let Ok(location) = std::env::var("PRODFORGE_LOCATION") {
            config.default_location = location;
        }
        if let Ok(protocol) = std::env::var("PRODFORGE_PROTOCOL") {
            config.default_protocol = protocol;
        }
        if let Some(root) = std::env::var("PRODFORGE_STASH_READ")
            .ok()
            .or_else(|| std::env::var("MU2E_STASH_READ").ok())
        {
            config.stash_read_root = root;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".prodforge")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_location
            .parse::<Location>()
            .map_err(|e| ConfigError::ValidationError(format!("default_location: {e}")))?;
        self.default_protocol
            .parse::<Protocol>()
            .map_err(|e| ConfigError::ValidationError(format!("default_protocol: {e}")))?;

        if self.sweep.workers == 0 {
            return Err(ConfigError::ValidationError(
                "sweep.workers must be at least 1".into(),
            ));
        }
        if self.sweep.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "sweep.chunk_size must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Build an input locator, letting explicit choices win over the defaults.
    pub fn locator(
        &self,
        location: Option<&str>,
        protocol: Option<&str>,
    ) -> Result<InputLocator, ConfigError> {
        let location: Location = location
            .unwrap_or(&self.default_location)
            .parse()?;
        let protocol: Protocol = protocol
            .unwrap_or(&self.default_protocol)
            .parse()?;
        Ok(InputLocator::new(location, protocol).with_stash_root(&self.stash_read_root))
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            default_location: default_location(),
            default_protocol: default_protocol(),
            stash_read_root: default_stash_read_root(),
            output_dir: None,
            sweep: SweepConfig::default(),
        }
    }
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
    #[error("Failed to read {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Invalid(#[from] prodforge_core::Error),
}
