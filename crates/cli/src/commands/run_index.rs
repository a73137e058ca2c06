//! `prodforge run-index` — materialise the job a global index points to.
//!
//! A worker node is handed an index token (directly or through the `fname`
//! environment variable). The job map turns the global index into a
//! definition and a local job index.

use std::path::{Path, PathBuf};

use prodforge_config::{JobMap, ToolConfig, index_from_env, parse_index_token};
use prodforge_core::{DataFilename, Materializer, resolve};
use tracing::{info, warn};

pub async fn run(
    map: &Path,
    token: Option<String>,
    protocol: Option<String>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ToolConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let jobmap = JobMap::load(map)?;

    let global = match token {
        Some(t) => parse_index_token(&t)?,
        None => index_from_env()?,
    };
    let (entry, local) = jobmap.locate(global).ok_or_else(|| {
        format!(
            "index {global} is outside the job map ({} jobs)",
            jobmap.total_jobs()
        )
    })?;
    info!(global, local, definition = %entry.definition.display(), "index located");

    let def = prodforge_config::load_definition(&jobmap.definition_path(entry))?;
    let locator = config.locator(Some(entry.inloc.as_str()), protocol.as_deref())?;
    let params = resolve(&def, local)?;
    let text = Materializer::for_definition(&def, locator).render(&params)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &text)?;
            eprintln!("✅ Index {global} → {} job {local}", def.name);
        }
        None => print!("{text}"),
    }

    // Report where each output is destined, when the map says.
    for name in params.outputs.values() {
        let Ok(file) = DataFilename::parse(name) else {
            continue;
        };
        let dataset = file.dataset().to_string();
        let Some(dest) = entry.outputs.iter().find(|o| o.dataset == dataset) else {
            continue;
        };
        match file.dataset().absdsdir(&dest.location) {
            Some(dir) => eprintln!("   {name} → {dir}/{}", file.relpathname()),
            None => warn!(dataset = %dataset, location = %dest.location, "unknown output location"),
        }
    }

    Ok(())
}
