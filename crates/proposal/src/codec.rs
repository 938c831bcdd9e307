//! Proposal encoding, decoding and validation.
//!
//! Wire format: base64url without padding of the JSON object
//! `{"h": <hash of the original>, "d": <delta>}`.

use crate::error::ProposalRejection;
use crate::hash::compute_hash;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dandiclaw_patch::{Delta, apply, diff};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Hash of the document the delta was computed against.
    #[serde(rename = "h")]
    pub hash: String,

    #[serde(rename = "d")]
    pub delta: Delta,
}

impl Proposal {
    /// Build a proposal, or `None` when the documents are identical.
    pub fn new(original: &Value, modified: &Value) -> Option<Self> {
        let delta = diff(original, modified)?;
        Some(Self {
            hash: compute_hash(original),
            delta,
        })
    }

    /// The transport-safe token.
    pub fn to_token(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }
}

/// Encode the change from `original` to `modified` as a token.
///
/// Returns `None` when there is nothing to propose.
pub fn encode(original: &Value, modified: &Value) -> Option<String> {
    let proposal = Proposal::new(original, modified)?;
    match proposal.to_token() {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(error = %e, "Failed to serialize proposal");
            None
        }
    }
}

/// Decode a token produced by [`encode`]. Never panics.
///
/// Trailing padding and the standard base64 alphabet are tolerated, since
/// links are sometimes re-encoded by mail clients and chat tools.
pub fn decode(token: &str) -> Option<Proposal> {
    let normalized: String = token
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    if normalized.is_empty() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .inspect_err(|e| debug!(error = %e, "Proposal token is not base64url"))
        .ok()?;
    serde_json::from_slice(&bytes)
        .inspect_err(|e| debug!(error = %e, "Proposal token is not a proposal"))
        .ok()
}

/// Check `proposal` against the recipient's `current` document and, if it
/// was made for exactly this version, return the patched document.
///
/// `current` is never modified.
pub fn validate(proposal: &Proposal, current: &Value) -> Result<Value, ProposalRejection> {
    let actual = compute_hash(current);
    if actual != proposal.hash {
        return Err(ProposalRejection::Conflict {
            expected: proposal.hash.clone(),
            actual,
        });
    }
    Ok(apply(current, &proposal.delta)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn original() -> Value {
        json!({
            "name": "Mouse V1",
            "keywords": ["a", "b"],
            "contributor": [{"identifier": "0000-0001", "name": "Doe, Jane"}]
        })
    }

    fn modified() -> Value {
        json!({
            "name": "Mouse V1 two-photon",
            "keywords": ["a", "b", "calcium"],
            "contributor": [{"identifier": "0000-0001", "name": "Doe, Jane", "email": "jd@example.org"}]
        })
    }

    #[test]
    fn identical_documents_encode_to_nothing() {
        assert_eq!(encode(&original(), &original()), None);
    }

    #[test]
    fn decode_round_trips() {
        let token = encode(&original(), &modified()).unwrap();
        assert!(!token.contains('='));
        assert!(!token.contains('+') && !token.contains('/'));

        let proposal = decode(&token).unwrap();
        assert_eq!(proposal.hash, compute_hash(&original()));
        assert_eq!(Some(proposal.delta), diff(&original(), &modified()));
    }

    #[test]
    fn decode_tolerates_padding() {
        let token = encode(&original(), &modified()).unwrap();
        let padded = format!("{token}==");
        assert!(decode(&padded).is_some());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("").is_none());
        assert!(decode("not base64!").is_none());
        assert!(decode(&URL_SAFE_NO_PAD.encode(b"{\"x\": 1}")).is_none());
        assert!(decode(&URL_SAFE_NO_PAD.encode(b"\xff\xfe")).is_none());
    }

    #[test]
    fn validate_applies_on_matching_hash() {
        let proposal = decode(&encode(&original(), &modified()).unwrap()).unwrap();
        assert_eq!(validate(&proposal, &original()).unwrap(), modified());
    }

    #[test]
    fn validate_rejects_stale_document_without_touching_it() {
        let proposal = Proposal::new(&original(), &modified()).unwrap();
        let mut stale = original();
        stale["name"] = json!("Renamed meanwhile");
        let before = stale.clone();

        let err = validate(&proposal, &stale).unwrap_err();
        assert!(matches!(err, ProposalRejection::Conflict { .. }));
        assert_eq!(stale, before);
    }

    #[test]
    fn validate_surfaces_apply_failure() {
        // Hash matches but the delta was tampered with.
        let mut proposal = Proposal::new(&original(), &modified()).unwrap();
        proposal.delta = Delta::Replaced {
            old: json!("something else"),
            new: json!(1),
        };
        let err = validate(&proposal, &original()).unwrap_err();
        assert!(matches!(err, ProposalRejection::ApplyFailed(_)));
    }
}
