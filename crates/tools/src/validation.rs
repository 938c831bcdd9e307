//! Metadata validation.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// One problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending field; empty for the document itself.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Checks a metadata document. An empty result means the document is valid.
pub trait MetadataValidator: Send + Sync {
    fn validate(&self, document: &Value) -> Vec<ValidationIssue>;
}

/// Requires a fixed set of top-level fields to be present and non-empty.
#[derive(Debug, Clone)]
pub struct RequiredFieldsValidator {
    fields: Vec<String>,
}

impl RequiredFieldsValidator {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl MetadataValidator for RequiredFieldsValidator {
    fn validate(&self, document: &Value) -> Vec<ValidationIssue> {
        let Some(object) = document.as_object() else {
            return vec![ValidationIssue::new("", "metadata must be a JSON object")];
        };

        self.fields
            .iter()
            .filter_map(|field| match object.get(field) {
                None => Some(ValidationIssue::new(field.as_str(), "is required")),
                Some(value) if is_blank(value) => Some(ValidationIssue::new(field.as_str(), "must not be empty")),
                Some(_) => None,
            })
            .collect()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
