//! `dandiclaw propose`: Build a review link from two metadata files.

use super::read_json;
use dandiclaw_config::AppConfig;
use dandiclaw_proposal::{Proposal, build_link};
use std::path::Path;

pub fn run(
    config: &AppConfig,
    original: &Path,
    modified: &Path,
    dandiset: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let archive = config
        .active_archive()
        .ok_or_else(|| format!("Unknown archive `{}`", config.archive))?;
    let original = read_json(original)?;
    let modified = read_json(modified)?;

    let Some(proposal) = Proposal::new(&original, &modified) else {
        eprintln!("No changes to propose.");
        return Ok(());
    };
    println!("{}", build_link(&archive.web_url, dandiset, &proposal)?);
    Ok(())
}
