//! Input file location and access protocol formatting.
//!
//! Catalogs list bare file names. Before they are written into a job's
//! configuration they are turned into the path (or URL) the job will read
//! them from, according to where the dataset lives and how it is accessed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filename::{DataFilename, remove_storage_prefix};

/// Default CVMFS root under which stash-cached datasets are readable.
pub const DEFAULT_STASH_READ_ROOT: &str =
    "/cvmfs/mu2e.osgstorage.org/pnfs/fnal.gov/usr/mu2e/persistent/stash";

const PNFS_PREFIX: &str = "/pnfs/";
const XROOT_PREFIX: &str = "xroot://fndcadoor.fnal.gov//pnfs/fnal.gov/usr/";

/// Where the input files of a job live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Location {
    /// Bare file names, resolved by the job itself.
    #[default]
    None,
    /// All files in one flat directory.
    Dir(String),
    Tape,
    Disk,
    Scratch,
    Stash,
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(dir) = s.strip_prefix("dir:") {
            let dir = dir.trim_end_matches('/');
            if dir.is_empty() {
                return Err(Error::Location {
                    file: s.to_string(),
                    reason: "dir: location needs a path".into(),
                });
            }
            return Ok(Location::Dir(dir.to_string()));
        }
        match s {
            "none" | "" => Ok(Location::None),
            "tape" => Ok(Location::Tape),
            "disk" => Ok(Location::Disk),
            "scratch" => Ok(Location::Scratch),
            "stash" => Ok(Location::Stash),
            other => Err(Error::Location {
                file: other.to_string(),
                reason: "expected none, tape, disk, scratch, stash or dir:<path>".into(),
            }),
        }
    }
}

impl TryFrom<String> for Location {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Location> for String {
    fn from(l: Location) -> Self {
        l.to_string()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::None => f.write_str("none"),
            Location::Dir(d) => write!(f, "dir:{d}"),
            Location::Tape => f.write_str("tape"),
            Location::Disk => f.write_str("disk"),
            Location::Scratch => f.write_str("scratch"),
            Location::Stash => f.write_str("stash"),
        }
    }
}

/// How a job opens its input files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain POSIX path.
    #[default]
    File,
    /// XRootD URL through the dCache door.
    Root,
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Protocol::File),
            "root" => Ok(Protocol::Root),
            other => Err(Error::Location {
                file: other.to_string(),
                reason: "protocol must be 'file' or 'root'".into(),
            }),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::File => "file",
            Protocol::Root => "root",
        })
    }
}

/// Formats catalog entries into readable paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLocator {
    pub location: Location,
    pub protocol: Protocol,
    pub stash_read_root: String,
}

impl Default for InputLocator {
    fn default() -> Self {
        Self::new(Location::None, Protocol::File)
    }
}

impl InputLocator {
    pub fn new(location: Location, protocol: Protocol) -> Self {
        Self {
            location,
            protocol,
            stash_read_root: DEFAULT_STASH_READ_ROOT.to_string(),
        }
    }

    pub fn with_stash_root(mut self, root: impl Into<String>) -> Self {
        self.stash_read_root = root.into().trim_end_matches('/').to_string();
        self
    }

    /// Path (or URL) the job reads `file` from.
    pub fn format(&self, file: &str) -> Result<String> {
        let file = remove_storage_prefix(file);

        let physical = match &self.location {
            // Stash reads go through CVMFS; the protocol does not apply.
            Location::Stash => return self.stash_path(file),
            _ if file.starts_with('/') => file.to_string(),
            Location::None => return Ok(file.to_string()),
            Location::Dir(dir) => format!("{dir}/{file}"),
            Location::Tape | Location::Disk | Location::Scratch => {
                let name = DataFilename::parse(file)?;
                let area = self.location.to_string();
                let dsdir = name.dataset().absdsdir(&area).ok_or_else(|| Error::Location {
                    file: file.to_string(),
                    reason: format!("no dataset directory for location '{area}'"),
                })?;
                format!("{dsdir}/{}", name.relpathname())
            }
        };

        match self.protocol {
            Protocol::File => Ok(physical),
            Protocol::Root => to_xroot(&physical),
        }
    }

    fn stash_path(&self, file: &str) -> Result<String> {
        let name = DataFilename::parse(basename(file))?;
        Ok(format!(
            "{}/datasets/{}/{}",
            self.stash_read_root,
            name.dataset().relative_dir(),
            name
        ))
    }

    pub fn format_all(&self, files: &[String]) -> Result<Vec<String>> {
        files.iter().map(|f| self.format(f)).collect()
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn to_xroot(path: &str) -> Result<String> {
    let rest = path.strip_prefix(PNFS_PREFIX).ok_or_else(|| Error::Location {
        file: path.to_string(),
        reason: "root protocol requires a /pnfs/ path".into(),
    })?;
    Ok(format!("{XROOT_PREFIX}{rest}"))
}
