//! `prodforge usage` — auxiliary file usage over every job.

use std::sync::Arc;

use prodforge::{SweepOptions, usage_report};

use super::{DefinitionArgs, load};

pub async fn run(
    definition: &DefinitionArgs,
    workers: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, def) = load(definition)?;
    let opts = SweepOptions {
        workers: workers.unwrap_or(config.sweep.workers),
        chunk_size: config.sweep.chunk_size,
    };
    let report = usage_report(Arc::new(def), opts).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("📊 Auxiliary usage over {} jobs", report.njobs);
    println!("─────────────────────────────────────────────────────");
    if report.roles.is_empty() {
        println!("  (no auxiliary inputs)");
        return Ok(());
    }
    for (role, usage) in &report.roles {
        println!("  {role}");
        println!("    Files:   {}", usage.files);
        println!("    Picks:   {}", usage.picks);
        println!(
            "    Per file: min {} / mean {:.2} / max {}",
            usage.min, usage.mean, usage.max
        );
        if usage.unused > 0 {
            println!("    ⚠️  {} files never used", usage.unused);
        }
    }
    Ok(())
}
