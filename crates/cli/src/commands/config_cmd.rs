//! `prodforge config` — tool settings commands.

use prodforge_config::ToolConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match ToolConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if config.sweep.workers > 256 {
                warnings.push("More than 256 sweep workers");
            }
            if let Some(dir) = &config.output_dir {
                if !dir.is_dir() {
                    warnings.push("output_dir does not exist");
                }
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Location:  {}", config.default_location);
            println!("   Protocol:  {}", config.default_protocol);
            println!("   Stash:     {}", config.stash_read_root);
            println!(
                "   Sweep:     {} workers × {} jobs",
                config.sweep.workers, config.sweep.chunk_size
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = ToolConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", ToolConfig::config_path().display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = ToolConfig::config_path();
    if path.exists() {
        println!("⚠️  {} already exists", path.display());
        return Ok(());
    }
    std::fs::create_dir_all(ToolConfig::config_dir())?;
    std::fs::write(&path, ToolConfig::default_toml())?;
    println!("✅ Wrote {}", path.display());
    Ok(())
}
