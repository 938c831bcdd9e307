//! `dandiclaw diff`: Summarize the changes between two metadata files.

use super::read_json;
use dandiclaw_patch::{changes, diff};
use std::path::Path;

pub fn run(original: &Path, modified: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let original = read_json(original)?;
    let modified = read_json(modified)?;
    let listed = diff(&original, &modified).map(|d| changes(&d)).unwrap_or_default();

    if json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
    } else if listed.is_empty() {
        println!("No changes.");
    } else {
        for change in &listed {
            println!("{change}");
        }
    }
    Ok(())
}
