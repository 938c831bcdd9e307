//! Subcommand implementations.

pub mod chat;
pub mod diff;
pub mod init;
pub mod propose;
pub mod review;

use dandiclaw_config::AppConfig;
use dandiclaw_telemetry::{ModelPricing, PricingTable};
use serde_json::Value;
use std::path::Path;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_file(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Read and parse a JSON document.
pub fn read_json(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&text).map_err(|e| format!("{} is not valid JSON: {e}", path.display()))?)
}

/// Write `value` as pretty JSON with a trailing newline.
pub fn write_json(path: &Path, value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    std::fs::write(path, text).map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
    Ok(())
}

/// Built-in prices with the config's overrides on top.
pub fn pricing_table(config: &AppConfig) -> PricingTable {
    let table = PricingTable::with_defaults();
    for (model, price) in &config.pricing {
        table.set(model.clone(), ModelPricing::new(price.input_per_m, price.output_per_m));
    }
    table
}
