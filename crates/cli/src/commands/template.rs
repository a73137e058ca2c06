//! `prodforge template` — configure a job from its input file alone.
//!
//! Template mode has no definition: the template's output filename
//! patterns are filled from the fields of the one input the job reads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use prodforge_config::ToolConfig;
use prodforge_core::{Template, render_for_input};
use tracing::info;

pub async fn run(
    template: &Path,
    input: &str,
    overrides: Vec<(String, String)>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ToolConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let text = std::fs::read_to_string(template)
        .map_err(|e| format!("Failed to read template {}: {e}", template.display()))?;
    let overrides: BTreeMap<String, String> = overrides.into_iter().collect();
    let rendered = render_for_input(&Template::from_text(text), input, &overrides)?;

    let target = output.or_else(|| {
        let name = input.rsplit('/').next().unwrap_or(input);
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        config
            .output_dir
            .as_ref()
            .map(|dir| dir.join(format!("{stem}.fcl")))
    });
    match target {
        Some(path) => {
            std::fs::write(&path, &rendered)?;
            info!(input, path = %path.display(), "configuration written");
            eprintln!("✅ {input} → {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

/// `name=value` placeholder override.
pub fn parse_override(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{arg}'")),
    }
}
