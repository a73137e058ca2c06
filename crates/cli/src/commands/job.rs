//! `prodforge fcl | inputs | outputs` — single-job commands.

use std::path::PathBuf;

use prodforge_core::Materializer;
use tracing::info;

use super::{DefinitionArgs, JobSelector, LocationArgs, load};

/// Materialise one job's configuration to stdout or a file.
pub async fn fcl(
    definition: &DefinitionArgs,
    job: &JobSelector,
    location: &LocationArgs,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, def) = load(definition)?;
    let locator = config.locator(location.location.as_deref(), location.protocol.as_deref())?;
    let params = job.resolve(&def)?;
    let text = Materializer::for_definition(&def, locator).render(&params)?;

    let target = output.or_else(|| {
        config
            .output_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{:07}.fcl", def.name, params.job_index)))
    });
    match target {
        Some(path) => {
            std::fs::write(&path, &text)?;
            info!(job = params.job_index, path = %path.display(), "configuration written");
            eprintln!("✅ Job {} written to {}", params.job_index, path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Print one job's inputs as readable paths, one per line.
pub async fn inputs(
    definition: &DefinitionArgs,
    job: &JobSelector,
    location: &LocationArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, def) = load(definition)?;
    let locator = config.locator(location.location.as_deref(), location.protocol.as_deref())?;
    let params = job.resolve(&def)?;
    let located = Materializer::for_definition(&def, locator).locate(&params)?;
    for file in located.all_inputs() {
        println!("{file}");
    }
    Ok(())
}

/// Print one job's output filenames, one per line.
pub async fn outputs(definition: &DefinitionArgs, job: &JobSelector) -> Result<(), Box<dyn std::error::Error>> {
    let (_, def) = load(definition)?;
    let params = job.resolve(&def)?;
    for stream in &def.outputs {
        if let Some(name) = params.output(&stream.key) {
            println!("{name}");
        }
    }
    Ok(())
}
