use dandiclaw_patch::DeltaError;
use thiserror::Error;

/// Why a proposal was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProposalRejection {
    /// The recipient's document is not the version the proposal was made for.
    #[error(
        "This proposal was made against a different version of the metadata \
         (expected {}, found {}). Reload the latest version and ask for a new proposal.",
        short(.expected),
        short(.actual)
    )]
    Conflict { expected: String, actual: String },

    #[error("The proposal could not be applied: {0}")]
    ApplyFailed(#[from] DeltaError),
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Invalid base URL: {0}")]
    InvalidBase(#[from] url::ParseError),

    #[error("Could not encode proposal: {0}")]
    Encoding(#[from] serde_json::Error),
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
