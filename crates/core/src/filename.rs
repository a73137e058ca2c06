//! Data filename and dataset name grammar.
//!
//! Files are named `tier.owner.description.dsconf.sequencer.ext`; the
//! dataset they belong to drops the sequencer: `tier.owner.description.dsconf.ext`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::sequencer::Sequencer;

/// Storage-system prefixes some catalogs prepend to physical paths.
const STORAGE_PREFIXES: &[&str] = &["enstore:", "dcache:"];

/// A parsed data filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFilename {
    pub tier: String,
    pub owner: String,
    pub description: String,
    pub dsconf: String,
    pub sequencer: String,
    pub extension: String,
}

impl DataFilename {
    /// Split a filename into its six dot-separated fields.
    ///
    /// Extra trailing fields are folded into the extension (`x.tar.gz`).
    pub fn parse(name: &str) -> Result<Self> {
        let fields: Vec<&str> = name.splitn(6, '.').collect();
        if fields.len() < 6 {
            return Err(Error::Filename {
                name: name.to_string(),
                reason: format!("expected 6 dot-separated fields, found {}", fields.len()),
            });
        }
        if let Some(pos) = fields.iter().position(|f| f.is_empty()) {
            return Err(Error::Filename {
                name: name.to_string(),
                reason: format!("field {} is empty", pos + 1),
            });
        }
        Ok(Self {
            tier: fields[0].to_string(),
            owner: fields[1].to_string(),
            description: fields[2].to_string(),
            dsconf: fields[3].to_string(),
            sequencer: fields[4].to_string(),
            extension: fields[5].to_string(),
        })
    }

    /// The sequencer field decoded, if it is well formed.
    pub fn sequencer(&self) -> Result<Sequencer> {
        Sequencer::parse(&self.sequencer)
    }

    pub fn dataset(&self) -> DatasetName {
        DatasetName {
            tier: self.tier.clone(),
            owner: self.owner.clone(),
            description: self.description.clone(),
            dsconf: self.dsconf.clone(),
            extension: self.extension.clone(),
        }
    }

    /// Hash-spread relative path `hh/hh/<filename>`.
    pub fn relpathname(&self) -> String {
        relpathname(&self.to_string())
    }
}

impl fmt::Display for DataFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}.{}",
            self.tier, self.owner, self.description, self.dsconf, self.sequencer, self.extension
        )
    }
}

/// `tier.owner.description.dsconf.ext`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetName {
    pub tier: String,
    pub owner: String,
    pub description: String,
    pub dsconf: String,
    pub extension: String,
}

impl DatasetName {
    pub fn parse(name: &str) -> Result<Self> {
        let fields: Vec<&str> = name.split('.').collect();
        if fields.len() != 5 || fields.iter().any(|f| f.is_empty()) {
            return Err(Error::Filename {
                name: name.to_string(),
                reason: "dataset names have exactly 5 non-empty dot-separated fields".into(),
            });
        }
        Ok(Self {
            tier: fields[0].to_string(),
            owner: fields[1].to_string(),
            description: fields[2].to_string(),
            dsconf: fields[3].to_string(),
            extension: fields[4].to_string(),
        })
    }

    /// Physics area the tier is filed under.
    pub fn area(&self) -> &'static str {
        match self.tier.as_str() {
            "sim" | "dts" | "mcs" => "phy-sim",
            "nts" => "phy-nts",
            _ => "phy-etc",
        }
    }

    /// `tier/owner/description/dsconf/ext`.
    pub fn relative_dir(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.tier, self.owner, self.description, self.dsconf, self.extension
        )
    }

    /// Absolute dataset directory for a storage location, or `None` when the
    /// location has no dCache layout.
    pub fn absdsdir(&self, location: &str) -> Option<String> {
        let root = match location {
            "tape" => "/pnfs/mu2e/tape",
            "disk" => "/pnfs/mu2e/persistent/datasets",
            "scratch" => "/pnfs/mu2e/scratch/datasets",
            _ => return None,
        };
        Some(format!("{root}/{}/{}", self.area(), self.relative_dir()))
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.tier, self.owner, self.description, self.dsconf, self.extension
        )
    }
}

/// `h[0..2]/h[2..4]/<name>` where `h` is the hex SHA-256 of `name`.
pub fn relpathname(name: &str) -> String {
    let h = hex::encode(Sha256::digest(name.as_bytes()));
    format!("{}/{}/{name}", &h[..2], &h[2..4])
}

/// Strip an `enstore:` or `dcache:` prefix from a catalog path.
pub fn remove_storage_prefix(path: &str) -> &str {
    STORAGE_PREFIXES
        .iter()
        .find_map(|p| path.strip_prefix(p))
        .unwrap_or(path)
}
