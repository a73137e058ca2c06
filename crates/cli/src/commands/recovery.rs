//! `prodforge recovery` — find jobs whose output never arrived.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use prodforge::{SweepOptions, missing_outputs};
use prodforge_config::{index_token, read_catalog};

use super::{DefinitionArgs, load};

pub async fn run(
    definition: &DefinitionArgs,
    present: &Path,
    key: Option<String>,
    owner: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, def) = load(definition)?;

    let key = match key {
        Some(k) => k,
        None => def
            .outputs
            .first()
            .map(|o| o.key.clone())
            .ok_or("definition declares no outputs")?,
    };
    if !def.outputs.iter().any(|o| o.key == key) {
        return Err(format!("no output named '{key}' in {}", def.name).into());
    }

    let present: HashSet<String> = read_catalog(present)?
        .into_iter()
        .map(|line| {
            // Accept full paths as well as bare filenames.
            line.rsplit('/').next().unwrap_or(&line).to_string()
        })
        .collect();

    let opts = SweepOptions {
        workers: config.sweep.workers,
        chunk_size: config.sweep.chunk_size,
    };
    let njobs = def.njobs;
    let missing = missing_outputs(Arc::new(def), key.clone(), present, opts).await?;

    eprintln!("🔍 {} of {njobs} jobs missing '{key}'", missing.len());
    for (index, name) in &missing {
        println!("{}\t{name}", index_token(owner, *index));
    }
    Ok(())
}
