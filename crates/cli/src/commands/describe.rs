//! `prodforge describe` — summarise job definitions.
//!
//! With no selection every definition the descriptor expands to is shown.

use prodforge_core::{DataFilename, JobDefinition, SequencerCodec};

use super::DefinitionArgs;

pub async fn run(definition: &DefinitionArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let defs = if definition.query().is_empty() {
        prodforge_config::load_definitions(&definition.definition)?
    } else {
        vec![definition.load()?]
    };

    if json {
        match defs.as_slice() {
            [one] => println!("{}", serde_json::to_string_pretty(one)?),
            all => println!("{}", serde_json::to_string_pretty(all)?),
        }
        return Ok(());
    }

    for (i, def) in defs.iter().enumerate() {
        if i > 0 {
            println!();
        }
        summary(def);
    }
    Ok(())
}

fn summary(def: &JobDefinition) {
    let codec: SequencerCodec = def.codec();
    let first = codec.encode(0);
    let last = codec.encode(def.njobs.saturating_sub(1));

    println!("📦 {}", def.name);
    println!("─────────────────────────────────────");
    println!("  Jobs:           {}", def.njobs);
    println!("  Events/job:     {}", def.events_per_job);
    println!("  Sequencers:     {first} … {last}");
    println!("  Selection:      {}", def.selection.as_str());

    if let Some(primary) = &def.primary {
        println!(
            "  Primary:        {} files, {} per job ({} jobs)",
            primary.files.len(),
            primary.merge_factor,
            primary.njobs()
        );
    }
    if let Some(resampling) = &def.resampling {
        println!(
            "  Resampling:     {} events per input file",
            resampling.events_per_input_file
        );
    }

    if !def.aux.is_empty() {
        println!("  Aux files/job:  {}", def.aux_files_per_job());
        println!();
        println!("  Auxiliary inputs:");
        for (role, catalog) in &def.aux {
            match catalog.max_events_to_skip {
                Some(bound) => println!(
                    "    {role}: {} of {} files, skip ≤ {bound}",
                    catalog.per_job,
                    catalog.len()
                ),
                None => println!("    {role}: {} of {} files", catalog.per_job, catalog.len()),
            }
        }
    }

    println!();
    println!("  Outputs:");
    for stream in &def.outputs {
        let sample = stream.pattern.render(first);
        let dataset = DataFilename::parse(&sample)
            .map(|f| f.dataset().to_string())
            .unwrap_or_else(|_| "-".into());
        println!("    {}: {}  [{}]", stream.key, stream.pattern, dataset);
    }
}
