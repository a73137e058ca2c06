//! Command implementations and the argument groups they share.

pub mod config_cmd;
pub mod describe;
pub mod job;
pub mod recovery;
pub mod run_index;
pub mod template;
pub mod usage;

use std::path::PathBuf;

use clap::Args;
use prodforge_config::{DefinitionQuery, ToolConfig};
use prodforge_core::{ComputedJobParameters, JobDefinition, resolve, resolve_target};

/// A descriptor and, when it expands to several definitions, which one.
#[derive(Args, Debug, Clone)]
pub struct DefinitionArgs {
    /// Job definition descriptor (.toml or .json)
    #[arg(short, long)]
    pub definition: PathBuf,

    /// Position of the definition in the expanded descriptor
    #[arg(long)]
    pub entry: Option<usize>,

    /// Select the definition with this desc
    #[arg(long)]
    pub desc: Option<String>,

    /// Select the definition with this dsconf
    #[arg(long)]
    pub dsconf: Option<String>,
}

impl DefinitionArgs {
    pub fn query(&self) -> DefinitionQuery {
        DefinitionQuery {
            index: self.entry,
            desc: self.desc.clone(),
            dsconf: self.dsconf.clone(),
        }
    }

    pub fn load(&self) -> Result<JobDefinition, prodforge_config::ConfigError> {
        prodforge_config::select_definition(&self.definition, &self.query())
    }
}

/// Which job to act on: an index or an output filename.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct JobSelector {
    /// Job index in [0, njobs)
    #[arg(short, long)]
    pub index: Option<u64>,

    /// Output filename to resolve back to its job
    #[arg(short, long)]
    pub target: Option<String>,
}

impl JobSelector {
    pub fn resolve(&self, def: &JobDefinition) -> prodforge_core::Result<ComputedJobParameters> {
        match (&self.index, &self.target) {
            (_, Some(target)) => resolve_target(def, target),
            (Some(index), None) => resolve(def, *index),
            // clap's argument group guarantees one of the two.
            (None, None) => resolve(def, 0),
        }
    }
}

/// Input location overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct LocationArgs {
    /// Input location: none, tape, disk, scratch, stash or dir:<path>
    #[arg(short, long)]
    pub location: Option<String>,

    /// Input access protocol: file or root
    #[arg(short, long)]
    pub protocol: Option<String>,
}

/// Load tool settings and a descriptor together.
pub fn load(definition: &DefinitionArgs) -> Result<(ToolConfig, JobDefinition), Box<dyn std::error::Error>> {
    let config = ToolConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let def = definition.load()?;
    Ok((config, def))
}
