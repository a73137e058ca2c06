//! Campaign job maps and index tokens.
//!
//! A campaign runs several job definitions under one global index space.
//! The job map lists them in order with their job counts; a global index is
//! located by walking the cumulative counts. Each grid job learns its global
//! index from an index token filename such as `etc.mu2e.index.000.0000042.txt`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Environment variable carrying the index token on worker nodes.
pub const INDEX_TOKEN_ENV: &str = "fname";

/// One definition in a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMapEntry {
    /// Descriptor path, relative to the job map file.
    #[serde(alias = "tarball")]
    pub definition: PathBuf,

    pub njobs: u64,

    /// Input location for this definition (`none`, `tape`, `dir:/path`, ...).
    #[serde(default = "default_inloc")]
    pub inloc: String,

    #[serde(default)]
    pub outputs: Vec<OutputLocation>,
}

fn default_inloc() -> String {
    "none".into()
}

/// Where an output dataset is uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLocation {
    pub dataset: String,
    pub location: String,
}

/// An ordered list of job definitions sharing one index space.
#[derive(Debug, Clone, Default)]
pub struct JobMap {
    pub entries: Vec<JobMapEntry>,
    base_dir: PathBuf,
}

impl JobMap {
    pub fn new(entries: Vec<JobMapEntry>) -> Self {
        Self {
            entries,
            base_dir: PathBuf::from("."),
        }
    }

    /// Load a JSON job map (a top-level array of entries).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let entries: Vec<JobMapEntry> =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if entries.iter().any(|e| e.njobs == 0) {
            return Err(ConfigError::ValidationError(format!(
                "{}: every entry needs a positive njobs",
                path.display()
            )));
        }
        if entries.iter().try_fold(0u64, |sum, e| sum.checked_add(e.njobs)).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "{}: total njobs does not fit a 64-bit index",
                path.display()
            )));
        }
        tracing::debug!(entries = entries.len(), "loaded job map {}", path.display());
        Ok(Self {
            entries,
            base_dir: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        })
    }

    /// Saturates at `u64::MAX`; maps from [`JobMap::load`] never reach it.
    pub fn total_jobs(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |sum, e| sum.saturating_add(e.njobs))
    }

    /// The entry a global index falls into and the index local to it.
    pub fn locate(&self, global: u64) -> Option<(&JobMapEntry, u64)> {
        // first <= global throughout.
        let mut first = 0u64;
        for entry in &self.entries {
            let local = global - first;
            if local < entry.njobs {
                return Some((entry, local));
            }
            first += entry.njobs;
        }
        None
    }

    /// Descriptor path of an entry, resolved against the map's directory.
    pub fn definition_path(&self, entry: &JobMapEntry) -> PathBuf {
        self.base_dir.join(&entry.definition)
    }
}

/// Global index carried by an index token: its fifth dot-separated field.
pub fn parse_index_token(token: &str) -> Result<u64, ConfigError> {
    let field = token.split('.').nth(4).ok_or_else(|| {
        ConfigError::ValidationError(format!("index token '{token}' has fewer than 5 fields"))
    })?;
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::ValidationError(format!(
            "index token '{token}' has non-numeric index '{field}'"
        )));
    }
    field.parse().map_err(|e| {
        ConfigError::ValidationError(format!("index token '{token}': {e}"))
    })
}

/// Token naming global index `index`.
pub fn index_token(owner: &str, index: u64) -> String {
    format!("etc.{owner}.index.000.{index:07}.txt")
}

/// Read the index token from the environment.
pub fn index_from_env() -> Result<u64, ConfigError> {
    let token = std::env::var(INDEX_TOKEN_ENV).map_err(|_| {
        ConfigError::ValidationError(format!("{INDEX_TOKEN_ENV} environment variable is not set"))
    })?;
    parse_index_token(&token)
}
