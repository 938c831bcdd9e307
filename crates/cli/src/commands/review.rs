//! `dandiclaw review`: Check a proposal against a file and apply it.

use super::{read_json, write_json};
use dandiclaw_patch::changes;
use dandiclaw_proposal::{Proposal, decode, parse_link, validate};
use std::path::Path;
use tracing::info;

pub fn run(link: &str, file: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let proposal = read_proposal(link).ok_or("No proposal found in the link")?;
    let current = read_json(file)?;

    eprintln!("Proposed changes:");
    for change in changes(&proposal.delta) {
        eprintln!("  {change}");
    }

    let updated = validate(&proposal, &current).map_err(|e| format!("Proposal rejected: {e}"))?;
    match output {
        Some(path) => {
            write_json(path, &updated)?;
            info!(path = %path.display(), "Proposal applied");
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&updated)?),
    }
    Ok(())
}

/// Accept a full review link or a bare token.
pub(super) fn read_proposal(input: &str) -> Option<Proposal> {
    match parse_link(input) {
        Some(link) => Some(link.proposal),
        None => decode(input),
    }
}
