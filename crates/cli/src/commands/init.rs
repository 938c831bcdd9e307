//! `dandiclaw init`: Write a default config file.

use dandiclaw_config::AppConfig;
use std::path::Path;

pub fn run(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let default_path = AppConfig::config_path();
    let path = path.unwrap_or(default_path.as_path());

    if path.exists() {
        println!("Config already exists at: {}", path.display());
        println!("Edit it manually or delete it and re-run init.");
        return Ok(());
    }

    AppConfig::write_default(path)?;
    println!("Created {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set api_key (or DANDICLAW_API_KEY) and gateway.url");
    println!("  2. Run: dandiclaw chat --file dandiset.json --dandiset 000123");
    Ok(())
}
