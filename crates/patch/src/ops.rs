//! Path-addressed document operations.
//!
//! `set`, `delete`, `insert` and `append` take the document by reference and
//! return a new document. A refused operation leaves nothing behind: the
//! caller still holds the untouched original.

use crate::error::{PatchError, kind_of};
use crate::path::{Path, Segment, render};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// The mutation kinds the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Write a value, creating missing intermediate containers.
    Set,
    /// Remove an array element.
    Delete,
    /// Insert an array element, shifting later elements right.
    Insert,
    /// Push onto the end of an existing array.
    Append,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Set => "set",
            Operation::Delete => "delete",
            Operation::Insert => "insert",
            Operation::Append => "append",
        }
    }

    /// Whether the operation needs a value argument.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Operation::Delete)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read the value at `path`. The empty path addresses the whole document.
///
/// Returns `None` for unparseable paths and for paths that do not resolve.
pub fn get<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let path = Path::parse(path).ok()?;
    get_at(doc, &path)
}

/// [`get`] for an already-parsed path.
pub fn get_at<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(doc, |current, segment| match (current, segment) {
            (Value::Object(map), segment) => map.get(segment.as_key().as_ref()),
            (Value::Array(items), Segment::Index(i)) => items.get(*i),
            _ => None,
        })
}

/// Write `value` at `path`.
///
/// Missing (or `null`) intermediate values are created as `[]` when the next
/// segment is numeric and `{}` otherwise. On an array the final index may
/// equal the array length, which appends.
pub fn set(doc: &Value, path: &str, value: Value) -> Result<Value, PatchError> {
    let path = parse_target(path)?;
    let mut out = doc.clone();
    let Some((parent, last)) = path.split_last() else {
        return Err(PatchError::EmptyPath);
    };

    let container = resolve_or_create(&mut out, path.segments())?;
    match container {
        Value::Object(map) => {
            map.insert(last.as_key().into_owned(), value);
        }
        Value::Array(items) => {
            let Segment::Index(index) = *last else {
                return Err(PatchError::IndexRequired {
                    path: path.to_string(),
                });
            };
            if index < items.len() {
                items[index] = value;
            } else if index == items.len() {
                items.push(value);
            } else {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
        }
        other => {
            return Err(PatchError::NotAContainer {
                path: render(parent),
                kind: kind_of(other),
            });
        }
    }

    trace!(path = %path, "set");
    Ok(out)
}

/// Remove the array element addressed by `path`.
pub fn delete(doc: &Value, path: &str) -> Result<Value, PatchError> {
    let path = parse_target(path)?;
    let mut out = doc.clone();
    let (items, index) = array_slot(&mut out, &path)?;
    if index >= items.len() {
        return Err(PatchError::IndexOutOfBounds {
            path: path.to_string(),
            index,
            len: items.len(),
        });
    }
    items.remove(index);

    trace!(path = %path, "delete");
    Ok(out)
}

/// Insert `value` at the array position addressed by `path`.
///
/// The index may equal the array length, which appends.
pub fn insert(doc: &Value, path: &str, value: Value) -> Result<Value, PatchError> {
    let path = parse_target(path)?;
    let mut out = doc.clone();
    let (items, index) = array_slot(&mut out, &path)?;
    if index > items.len() {
        return Err(PatchError::IndexOutOfBounds {
            path: path.to_string(),
            index,
            len: items.len(),
        });
    }
    items.insert(index, value);

    trace!(path = %path, "insert");
    Ok(out)
}

/// Push `value` onto the array at `path`.
pub fn append(doc: &Value, path: &str, value: Value) -> Result<Value, PatchError> {
    let path = parse_target(path)?;
    let mut out = doc.clone();
    match resolve_mut(&mut out, path.segments()) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            return Err(PatchError::NotAnArray {
                path: path.to_string(),
            });
        }
    }

    trace!(path = %path, "append");
    Ok(out)
}

/// Dispatch an [`Operation`] by kind.
pub fn apply_operation(
    doc: &Value,
    operation: Operation,
    path: &str,
    value: Option<Value>,
) -> Result<Value, PatchError> {
    let require = |value: Option<Value>| {
        value.ok_or(PatchError::MissingValue {
            operation: operation.as_str(),
        })
    };
    match operation {
        Operation::Set => set(doc, path, require(value)?),
        Operation::Delete => delete(doc, path),
        Operation::Insert => insert(doc, path, require(value)?),
        Operation::Append => append(doc, path, require(value)?),
    }
}

fn parse_target(raw: &str) -> Result<Path, PatchError> {
    let path = Path::parse(raw)?;
    if path.is_empty() {
        return Err(PatchError::EmptyPath);
    }
    Ok(path)
}

/// Navigate without creating anything.
fn resolve_mut<'a>(root: &'a mut Value, segments: &[Segment]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in segments {
        current = match (current, segment) {
            (Value::Object(map), segment) => map.get_mut(segment.as_key().as_ref())?,
            (Value::Array(items), Segment::Index(i)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Navigate to the parent of the final segment, creating missing containers.
fn resolve_or_create<'a>(
    root: &'a mut Value,
    segments: &[Segment],
) -> Result<&'a mut Value, PatchError> {
    if root.is_null() {
        *root = empty_container_for(&segments[0]);
    }

    let mut current = root;
    for (depth, window) in segments.windows(2).enumerate() {
        let (segment, next) = (&window[0], &window[1]);
        current = match current {
            Value::Object(map) => {
                let slot = map
                    .entry(segment.as_key().into_owned())
                    .or_insert(Value::Null);
                if slot.is_null() {
                    *slot = empty_container_for(next);
                }
                slot
            }
            Value::Array(items) => {
                let Segment::Index(index) = *segment else {
                    return Err(PatchError::InvalidPath {
                        path: render(&segments[..=depth]),
                        reason: "arrays are addressed by numeric index".into(),
                    });
                };
                if index == items.len() {
                    items.push(empty_container_for(next));
                } else if index > items.len() {
                    return Err(PatchError::IndexOutOfBounds {
                        path: render(&segments[..=depth]),
                        index,
                        len: items.len(),
                    });
                }
                let slot = &mut items[index];
                if slot.is_null() {
                    *slot = empty_container_for(next);
                }
                slot
            }
            other => {
                return Err(PatchError::NotAContainer {
                    path: render(&segments[..depth]),
                    kind: kind_of(other),
                });
            }
        };
    }
    Ok(current)
}

/// Resolve the parent array of `path` and its final index.
fn array_slot<'a>(
    root: &'a mut Value,
    path: &Path,
) -> Result<(&'a mut Vec<Value>, usize), PatchError> {
    let Some((parent, last)) = path.split_last() else {
        return Err(PatchError::EmptyPath);
    };
    let Segment::Index(index) = *last else {
        return Err(PatchError::IndexRequired {
            path: path.to_string(),
        });
    };
    match resolve_mut(root, parent) {
        Some(Value::Array(items)) => Ok((items, index)),
        _ => Err(PatchError::NotAnArray {
            path: render(parent),
        }),
    }
}

fn empty_container_for(next: &Segment) -> Value {
    match next {
        Segment::Index(_) => Value::Array(Vec::new()),
        Segment::Key(_) => Value::Object(serde_json::Map::new()),
    }
}
