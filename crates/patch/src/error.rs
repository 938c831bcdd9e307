//! Error types for document operations and delta application.

use thiserror::Error;

/// Why a path operation was refused.
///
/// These are reported back to callers (and ultimately to the model) as
/// corrective feedback, so the messages name the offending path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("Path must not be empty")]
    EmptyPath,

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Value at '{path}' is not an array")]
    NotAnArray { path: String },

    #[error("Final segment of '{path}' must be an array index")]
    IndexRequired { path: String },

    #[error("Index {index} out of bounds for '{path}' (length {len})")]
    IndexOutOfBounds { path: String, index: usize, len: usize },

    #[error("Cannot descend into {kind} at '{path}'")]
    NotAContainer { path: String, kind: &'static str },

    #[error("Operation '{operation}' requires a value")]
    MissingValue { operation: &'static str },
}

/// Why a delta could not be applied to a document.
///
/// A delta only applies cleanly to the document it was computed against.
/// Any mismatch is reported instead of producing a half-patched document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    #[error("Delta expects {expected} at '{path}', found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Base value at '{path}' does not match the delta")]
    ValueMismatch { path: String },

    #[error("Key '{path}' already exists")]
    KeyExists { path: String },

    #[error("Key '{path}' is missing")]
    KeyMissing { path: String },

    #[error("Array delta at '{path}' is inconsistent: {reason}")]
    InvalidArrayDelta { path: String, reason: String },

    #[error("Added/removed entries are only valid inside an object delta (at '{path}')")]
    Misplaced { path: String },
}

/// Human readable name of a JSON value's type.
pub(crate) fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
