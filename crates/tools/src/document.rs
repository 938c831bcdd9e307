//! The metadata document the tools operate on.
//!
//! Holds the snapshot the session started from next to the working copy, so
//! the pending edits can be summarized or turned into a proposal at any
//! point.

use dandiclaw_core::tool::ToolContext;
use dandiclaw_patch::{Change, Delta, Operation, PatchError, apply_operation, changes, diff};
use dandiclaw_proposal::Proposal;
use serde_json::Value;
use tracing::debug;

/// A dandiset metadata document under edit.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDocument {
    original: Value,
    current: Value,
}

impl MetadataDocument {
    pub fn new(original: Value) -> Self {
        Self {
            current: original.clone(),
            original,
        }
    }

    /// The snapshot edits are measured against.
    pub fn original(&self) -> &Value {
        &self.original
    }

    pub fn current(&self) -> &Value {
        &self.current
    }

    /// Replace the working copy wholesale, e.g. with a reviewed proposal.
    pub fn replace(&mut self, current: Value) {
        self.current = current;
    }

    pub fn is_modified(&self) -> bool {
        self.original != self.current
    }

    /// Throw away all edits.
    pub fn reset(&mut self) {
        self.current = self.original.clone();
    }

    pub fn delta(&self) -> Option<Delta> {
        diff(&self.original, &self.current)
    }

    pub fn changes(&self) -> Vec<Change> {
        self.delta().map(|d| changes(&d)).unwrap_or_default()
    }

    /// A proposal carrying the pending edits, or `None` when there are none.
    pub fn proposal(&self) -> Option<Proposal> {
        Proposal::new(&self.original, &self.current)
    }
}

impl ToolContext for MetadataDocument {
    fn document(&self) -> &Value {
        &self.current
    }

    fn modify(&mut self, operation: Operation, path: &str, value: Option<Value>) -> Result<(), PatchError> {
        self.current = apply_operation(&self.current, operation, path, value)?;
        debug!(%operation, path, "Document modified");
        Ok(())
    }
}
