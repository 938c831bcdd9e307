//! Flat, human-readable listing of what a [`Delta`] does.
//!
//! Used to summarize a proposal for a reviewer without showing the full
//! before and after documents.

use crate::delta::Delta;
use crate::path::{Path, Segment};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// One leaf-level change.
///
/// Paths of removed array elements use their index in the original array;
/// every other path uses indices of the modified document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub path: String,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Added { value: Value },
    Removed { value: Value },
    Modified { old: Value, new: Value },
    Moved { from: usize, to: usize },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "(root)" } else { self.path.as_str() };
        match &self.kind {
            ChangeKind::Added { value } => write!(f, "+ {path}: {value}"),
            ChangeKind::Removed { value } => write!(f, "- {path}: {value}"),
            ChangeKind::Modified { old, new } => write!(f, "~ {path}: {old} -> {new}"),
            ChangeKind::Moved { from, to } => write!(f, "> {path}: moved {from} -> {to}"),
        }
    }
}

/// Flatten `delta` into leaf changes, depth first.
pub fn changes(delta: &Delta) -> Vec<Change> {
    let mut out = Vec::new();
    collect(delta, &Path::root(), &mut out);
    out
}

fn collect(delta: &Delta, path: &Path, out: &mut Vec<Change>) {
    let push = |out: &mut Vec<Change>, path: &Path, kind: ChangeKind| {
        out.push(Change {
            path: path.to_string(),
            kind,
        })
    };

    match delta {
        Delta::Added(value) => push(out, path, ChangeKind::Added { value: value.clone() }),
        Delta::Removed(value) => push(out, path, ChangeKind::Removed { value: value.clone() }),
        Delta::Replaced { old, new } => push(
            out,
            path,
            ChangeKind::Modified {
                old: old.clone(),
                new: new.clone(),
            },
        ),
        Delta::Object(entries) => {
            for (key, child) in entries {
                collect(child, &path.child(Segment::Key(key.clone())), out);
            }
        }
        Delta::Array(array) => {
            for (index, value) in &array.removed {
                push(
                    out,
                    &path.child(Segment::Index(*index)),
                    ChangeKind::Removed { value: value.clone() },
                );
            }
            for (index, value) in &array.inserted {
                push(
                    out,
                    &path.child(Segment::Index(*index)),
                    ChangeKind::Added { value: value.clone() },
                );
            }
            for &(from, to) in &array.moved {
                push(out, path, ChangeKind::Moved { from, to });
            }
            for (_, to, child) in &array.changed {
                collect(child, &path.child(Segment::Index(*to)), out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::diff;
    use serde_json::json;

    #[test]
    fn lists_leaf_changes_with_paths() {
        let original = json!({"name": "A", "keywords": ["x", "y"], "contributor": [{"name": "Doe"}]});
        let modified = json!({"name": "B", "keywords": ["x"], "contributor": [{"name": "Doe", "email": "d@x.org"}]});
        let delta = diff(&original, &modified).unwrap();
        let listed = changes(&delta);

        assert!(listed.contains(&Change {
            path: "name".into(),
            kind: ChangeKind::Modified {
                old: json!("A"),
                new: json!("B")
            }
        }));
        assert!(listed.contains(&Change {
            path: "keywords.1".into(),
            kind: ChangeKind::Removed { value: json!("y") }
        }));
        assert!(listed.contains(&Change {
            path: "contributor.0.email".into(),
            kind: ChangeKind::Added {
                value: json!("d@x.org")
            }
        }));
        assert_eq!(listed.len(), 3);
    }

    #[test]
    fn moves_are_reported_on_the_array() {
        let delta = diff(&json!([{"id": 1}, {"id": 2}]), &json!([{"id": 2}, {"id": 1}])).unwrap();
        let listed = changes(&delta);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].to_string(), "> (root): moved 0 -> 1");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let change = Change {
            path: "name".into(),
            kind: ChangeKind::Added { value: json!(1) },
        };
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({"path": "name", "kind": "added", "value": 1})
        );
    }
}
