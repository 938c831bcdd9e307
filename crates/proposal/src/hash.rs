//! Content hashing of document snapshots.

use dandiclaw_patch::to_canonical_string;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of the document's canonical serialization.
///
/// Key order does not affect the result.
pub fn compute_hash(doc: &Value) -> String {
    let canonical = to_canonical_string(doc);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
