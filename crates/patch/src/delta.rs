//! Structural deltas between two document snapshots.
//!
//! [`diff`] walks both trees and records only what changed. Objects are
//! compared key by key. Array elements are matched by identity before they
//! are compared, in three passes:
//!
//! 1. an explicit identity field (`id`, `@id`, `identifier`),
//! 2. identical canonical content,
//! 3. the same position, for elements that carry no identity field.
//!
//! Matched elements whose relative order changed are recorded as moves, so
//! reordering a contributor list does not rewrite every contributor.
//!
//! [`apply`] checks every value the delta removes or replaces against the
//! base document and fails with a [`DeltaError`] on the first disagreement.
//! A delta computed against another version of the document therefore cannot
//! silently corrupt this one.

use crate::canonical::to_canonical_string;
use crate::error::{DeltaError, kind_of};
use crate::path::{Path, Segment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Fields that identify an array element independent of its content.
const IDENTITY_FIELDS: [&str; 3] = ["id", "@id", "identifier"];

/// A change to one value in the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Delta {
    /// An object key that only exists in the modified document.
    #[serde(rename = "+")]
    Added(Value),

    /// An object key that only exists in the original document.
    #[serde(rename = "-")]
    Removed(Value),

    /// A value replaced wholesale (type change or scalar edit).
    #[serde(rename = "~")]
    Replaced { old: Value, new: Value },

    /// Per-key changes inside an object.
    #[serde(rename = "o")]
    Object(BTreeMap<String, Delta>),

    /// Element changes inside an array.
    #[serde(rename = "a")]
    Array(ArrayDelta),
}

/// Element-level changes to an array.
///
/// Indices in `removed` refer to the original array; indices in `inserted`
/// refer to the modified array. `moved` and `changed` carry both. Elements
/// that are neither removed nor moved keep their relative order and fill the
/// remaining slots of the modified array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayDelta {
    #[serde(rename = "rm", default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<(usize, Value)>,

    #[serde(rename = "in", default, skip_serializing_if = "Vec::is_empty")]
    pub inserted: Vec<(usize, Value)>,

    #[serde(rename = "mv", default, skip_serializing_if = "Vec::is_empty")]
    pub moved: Vec<(usize, usize)>,

    #[serde(rename = "ch", default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<(usize, usize, Delta)>,
}

impl ArrayDelta {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.inserted.is_empty()
            && self.moved.is_empty()
            && self.changed.is_empty()
    }
}

impl Delta {
    /// The inverse delta, see [`reverse`].
    pub fn reversed(&self) -> Delta {
        reverse(self)
    }
}

/// Compute the delta that turns `original` into `modified`.
///
/// Returns `None` when the documents are equal.
pub fn diff(original: &Value, modified: &Value) -> Option<Delta> {
    diff_values(original, modified)
}

/// Apply `delta` to `doc`, returning the patched document.
pub fn apply(doc: &Value, delta: &Delta) -> Result<Value, DeltaError> {
    apply_at(doc, delta, &Path::root())
}

/// Invert a delta: `apply(modified, &reverse(&d)) == original`.
pub fn reverse(delta: &Delta) -> Delta {
    match delta {
        Delta::Added(value) => Delta::Removed(value.clone()),
        Delta::Removed(value) => Delta::Added(value.clone()),
        Delta::Replaced { old, new } => Delta::Replaced {
            old: new.clone(),
            new: old.clone(),
        },
        Delta::Object(entries) => Delta::Object(
            entries
                .iter()
                .map(|(key, child)| (key.clone(), reverse(child)))
                .collect(),
        ),
        Delta::Array(array) => Delta::Array(ArrayDelta {
            removed: array.inserted.clone(),
            inserted: array.removed.clone(),
            moved: array.moved.iter().map(|&(from, to)| (to, from)).collect(),
            changed: array
                .changed
                .iter()
                .map(|(from, to, child)| (*to, *from, reverse(child)))
                .collect(),
        }),
    }
}

// ── Diff ────────────────────────────────────────────────────────────────────

fn diff_values(original: &Value, modified: &Value) -> Option<Delta> {
    if original == modified {
        return None;
    }
    match (original, modified) {
        (Value::Object(a), Value::Object(b)) => Some(Delta::Object(diff_objects(a, b))),
        (Value::Array(a), Value::Array(b)) => {
            let array = diff_arrays(a, b);
            (!array.is_empty()).then_some(Delta::Array(array))
        }
        _ => Some(Delta::Replaced {
            old: original.clone(),
            new: modified.clone(),
        }),
    }
}

fn diff_objects(original: &Map<String, Value>, modified: &Map<String, Value>) -> BTreeMap<String, Delta> {
    let mut entries = BTreeMap::new();
    for (key, old) in original {
        match modified.get(key) {
            None => {
                entries.insert(key.clone(), Delta::Removed(old.clone()));
            }
            Some(new) => {
                if let Some(child) = diff_values(old, new) {
                    entries.insert(key.clone(), child);
                }
            }
        }
    }
    for (key, new) in modified {
        if !original.contains_key(key) {
            entries.insert(key.clone(), Delta::Added(new.clone()));
        }
    }
    entries
}

fn diff_arrays(original: &[Value], modified: &[Value]) -> ArrayDelta {
    let original_ids: Vec<Option<String>> = original.iter().map(explicit_identity).collect();
    let modified_ids: Vec<Option<String>> = modified.iter().map(explicit_identity).collect();

    let mut original_match: Vec<Option<usize>> = vec![None; original.len()];
    let mut modified_match: Vec<Option<usize>> = vec![None; modified.len()];

    // Pass 1: explicit identity.
    let mut by_id: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (i, id) in original_ids.iter().enumerate() {
        if let Some(id) = id {
            by_id.entry(id.as_str()).or_default().push_back(i);
        }
    }
    for (j, id) in modified_ids.iter().enumerate() {
        let Some(id) = id else { continue };
        if let Some(i) = by_id.get_mut(id.as_str()).and_then(VecDeque::pop_front) {
            original_match[i] = Some(j);
            modified_match[j] = Some(i);
        }
    }

    // Pass 2: identical content.
    let mut by_content: HashMap<String, VecDeque<usize>> = HashMap::new();
    for (i, value) in original.iter().enumerate() {
        if original_match[i].is_none() {
            by_content
                .entry(to_canonical_string(value))
                .or_default()
                .push_back(i);
        }
    }
    for (j, value) in modified.iter().enumerate() {
        if modified_match[j].is_some() {
            continue;
        }
        let found = by_content
            .get_mut(&to_canonical_string(value))
            .and_then(VecDeque::pop_front);
        if let Some(i) = found {
            original_match[i] = Some(j);
            modified_match[j] = Some(i);
        }
    }

    // Pass 3: same position, only for elements without an identity.
    for j in 0..modified.len().min(original.len()) {
        if modified_match[j].is_none()
            && original_match[j].is_none()
            && original_ids[j].is_none()
            && modified_ids[j].is_none()
        {
            original_match[j] = Some(j);
            modified_match[j] = Some(j);
        }
    }

    let pairs: Vec<(usize, usize)> = original_match
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.map(|j| (i, j)))
        .collect();
    let targets: Vec<usize> = pairs.iter().map(|&(_, j)| j).collect();
    let stationary = longest_increasing(&targets);

    let mut delta = ArrayDelta::default();
    for (k, &(i, j)) in pairs.iter().enumerate() {
        if !stationary[k] {
            delta.moved.push((i, j));
        }
        if let Some(child) = diff_values(&original[i], &modified[j]) {
            delta.changed.push((i, j, child));
        }
    }
    for (i, m) in original_match.iter().enumerate() {
        if m.is_none() {
            delta.removed.push((i, original[i].clone()));
        }
    }
    for (j, m) in modified_match.iter().enumerate() {
        if m.is_none() {
            delta.inserted.push((j, modified[j].clone()));
        }
    }
    delta
}

/// The identity of an array element, if it carries one.
fn explicit_identity(value: &Value) -> Option<String> {
    let Value::Object(map) = value else {
        return None;
    };
    IDENTITY_FIELDS.iter().find_map(|field| match map.get(*field) {
        Some(Value::String(s)) if !s.is_empty() => Some(format!("{field}={s}")),
        Some(Value::Number(n)) => Some(format!("{field}={n}")),
        _ => None,
    })
}

/// Mark the members of one longest strictly increasing subsequence.
fn longest_increasing(values: &[usize]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];
    for (i, &value) in values.iter().enumerate() {
        let pos = tails.partition_point(|&t| values[t] < value);
        if pos > 0 {
            previous[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut keep = vec![false; values.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        keep[i] = true;
        cursor = previous[i];
    }
    keep
}

// ── Apply ───────────────────────────────────────────────────────────────────

fn apply_at(base: &Value, delta: &Delta, path: &Path) -> Result<Value, DeltaError> {
    match delta {
        Delta::Replaced { old, new } => {
            if base == old {
                Ok(new.clone())
            } else {
                Err(DeltaError::ValueMismatch {
                    path: path.to_string(),
                })
            }
        }
        Delta::Object(entries) => {
            let Value::Object(map) = base else {
                return Err(type_mismatch(path, "object", base));
            };
            let mut out = map.clone();
            for (key, child) in entries {
                let child_path = path.child(Segment::Key(key.clone()));
                match child {
                    Delta::Added(value) => {
                        if out.contains_key(key) {
                            return Err(DeltaError::KeyExists {
                                path: child_path.to_string(),
                            });
                        }
                        out.insert(key.clone(), value.clone());
                    }
                    Delta::Removed(value) => match out.remove(key) {
                        Some(existing) if &existing == value => {}
                        Some(_) => {
                            return Err(DeltaError::ValueMismatch {
                                path: child_path.to_string(),
                            });
                        }
                        None => {
                            return Err(DeltaError::KeyMissing {
                                path: child_path.to_string(),
                            });
                        }
                    },
                    nested => {
                        let Some(existing) = out.get(key) else {
                            return Err(DeltaError::KeyMissing {
                                path: child_path.to_string(),
                            });
                        };
                        let updated = apply_at(existing, nested, &child_path)?;
                        out.insert(key.clone(), updated);
                    }
                }
            }
            Ok(Value::Object(out))
        }
        Delta::Array(array) => {
            let Value::Array(items) = base else {
                return Err(type_mismatch(path, "array", base));
            };
            apply_array(items, array, path).map(Value::Array)
        }
        Delta::Added(_) | Delta::Removed(_) => Err(DeltaError::Misplaced {
            path: path.to_string(),
        }),
    }
}

fn apply_array(base: &[Value], delta: &ArrayDelta, path: &Path) -> Result<Vec<Value>, DeltaError> {
    let invalid = |reason: String| DeltaError::InvalidArrayDelta {
        path: path.to_string(),
        reason,
    };
    let len = base.len();
    let mut consumed = vec![false; len];

    for (index, value) in &delta.removed {
        let Some(existing) = base.get(*index) else {
            return Err(invalid(format!(
                "removed index {index} out of bounds (length {len})"
            )));
        };
        if consumed[*index] {
            return Err(invalid(format!("index {index} removed twice")));
        }
        if existing != value {
            return Err(DeltaError::ValueMismatch {
                path: path.child(Segment::Index(*index)).to_string(),
            });
        }
        consumed[*index] = true;
    }

    let out_len = len - delta.removed.len() + delta.inserted.len();
    // Each slot remembers which base element it came from (None = inserted).
    let mut slots: Vec<Option<(Option<usize>, Value)>> = vec![None; out_len];

    for (index, value) in &delta.inserted {
        match slots.get_mut(*index) {
            Some(slot) if slot.is_none() => *slot = Some((None, value.clone())),
            _ => {
                return Err(invalid(format!("cannot insert at index {index}")));
            }
        }
    }

    for &(from, to) in &delta.moved {
        if from >= len || consumed[from] {
            return Err(invalid(format!("cannot move base index {from}")));
        }
        match slots.get_mut(to) {
            Some(slot) if slot.is_none() => *slot = Some((Some(from), base[from].clone())),
            _ => {
                return Err(invalid(format!("cannot move to index {to}")));
            }
        }
        consumed[from] = true;
    }

    let mut remaining = (0..len).filter(|i| !consumed[*i]);
    for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
        let Some(from) = remaining.next() else {
            return Err(invalid("not enough base elements to fill the result".into()));
        };
        *slot = Some((Some(from), base[from].clone()));
    }
    if remaining.next().is_some() {
        return Err(invalid("base has elements the delta does not account for".into()));
    }

    for (from, to, child) in &delta.changed {
        let Some(Some((origin, value))) = slots.get_mut(*to) else {
            return Err(invalid(format!("changed index {to} out of bounds")));
        };
        if *origin != Some(*from) {
            return Err(invalid(format!(
                "element {to} does not originate from base index {from}"
            )));
        }
        *value = apply_at(value, child, &path.child(Segment::Index(*to)))?;
    }

    Ok(slots.into_iter().flatten().map(|(_, value)| value).collect())
}

fn type_mismatch(path: &Path, expected: &'static str, found: &Value) -> DeltaError {
    DeltaError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: kind_of(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(original: Value, modified: Value) -> Delta {
        let delta = diff(&original, &modified).expect("documents differ");
        assert_eq!(apply(&original, &delta).unwrap(), modified);
        assert_eq!(apply(&modified, &reverse(&delta)).unwrap(), original);
        delta
    }

    #[test]
    fn equal_documents_have_no_delta() {
        let doc = json!({"name": "x", "keywords": ["a"]});
        assert!(diff(&doc, &doc.clone()).is_none());
    }

    #[test]
    fn object_keys_added_removed_replaced() {
        let delta = round_trip(
            json!({"name": "old", "license": ["spdx:CC-BY-4.0"], "gone": 1}),
            json!({"name": "new", "license": ["spdx:CC-BY-4.0"], "fresh": true}),
        );
        let Delta::Object(entries) = delta else {
            panic!("expected object delta");
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries["gone"], Delta::Removed(json!(1)));
        assert_eq!(entries["fresh"], Delta::Added(json!(true)));
        assert!(matches!(entries["name"], Delta::Replaced { .. }));
    }

    #[test]
    fn scalar_edit_in_list_is_positional() {
        let delta = round_trip(json!(["a", "b"]), json!(["a", "c"]));
        let Delta::Array(array) = delta else {
            panic!("expected array delta");
        };
        assert!(array.removed.is_empty());
        assert!(array.inserted.is_empty());
        assert_eq!(array.changed.len(), 1);
        assert_eq!(array.changed[0].0, 1);
    }

    #[test]
    fn reorder_by_identifier_is_a_move() {
        let original = json!([
            {"identifier": "0000-0001", "name": "A"},
            {"identifier": "0000-0002", "name": "B"},
            {"identifier": "0000-0003", "name": "C"}
        ]);
        let modified = json!([
            {"identifier": "0000-0003", "name": "C"},
            {"identifier": "0000-0001", "name": "A"},
            {"identifier": "0000-0002", "name": "B"}
        ]);
        let delta = round_trip(original, modified);
        let Delta::Array(array) = delta else {
            panic!("expected array delta");
        };
        assert!(array.removed.is_empty());
        assert!(array.inserted.is_empty());
        assert_eq!(array.moved, vec![(2, 0)]);
    }

    #[test]
    fn reorder_and_edit_by_identifier() {
        let original = json!({"contributor": [
            {"identifier": "x", "name": "Doe, J"},
            {"identifier": "y", "name": "Roe, R"}
        ]});
        let modified = json!({"contributor": [
            {"identifier": "y", "name": "Roe, Richard"},
            {"identifier": "x", "name": "Doe, J"}
        ]});
        round_trip(original, modified);
    }

    #[test]
    fn content_match_survives_insertions() {
        let delta = round_trip(json!(["a", "b", "c"]), json!(["z", "a", "b", "c"]));
        let Delta::Array(array) = delta else {
            panic!("expected array delta");
        };
        assert_eq!(array.inserted, vec![(0, json!("z"))]);
        assert!(array.moved.is_empty());
        assert!(array.changed.is_empty());
    }

    #[test]
    fn removal_and_insertion_with_distinct_ids() {
        round_trip(
            json!([{"id": 1}, {"id": 2}]),
            json!([{"id": 3}, {"id": 2}, {"id": 4}]),
        );
    }

    #[test]
    fn type_change_is_replacement() {
        let delta = round_trip(json!({"about": "V1"}), json!({"about": [{"name": "V1"}]}));
        let Delta::Object(entries) = delta else {
            panic!("expected object delta");
        };
        assert!(matches!(entries["about"], Delta::Replaced { .. }));
    }

    #[test]
    fn nested_arrays_of_arrays() {
        round_trip(json!([[1, 2], [3]]), json!([[3], [1, 2, 5], []]));
    }

    #[test]
    fn duplicate_values_are_matched_in_order() {
        round_trip(json!(["a", "a", "b"]), json!(["b", "a", "a", "a"]));
    }

    #[test]
    fn applying_to_a_diverged_base_fails() {
        let original = json!({"name": "A", "keywords": ["a", "b"]});
        let modified = json!({"name": "B", "keywords": ["a", "c"]});
        let delta = diff(&original, &modified).unwrap();

        let diverged = json!({"name": "Z", "keywords": ["a", "b"]});
        assert!(matches!(
            apply(&diverged, &delta),
            Err(DeltaError::ValueMismatch { .. })
        ));

        let shorter = json!({"name": "A", "keywords": []});
        assert!(apply(&shorter, &delta).is_err());

        let wrong_type = json!({"name": "A", "keywords": "a,b"});
        assert!(matches!(
            apply(&wrong_type, &delta),
            Err(DeltaError::TypeMismatch { expected: "array", .. })
        ));
    }

    #[test]
    fn added_key_collision_fails() {
        let delta = diff(&json!({}), &json!({"a": 1})).unwrap();
        assert!(matches!(
            apply(&json!({"a": 2}), &delta),
            Err(DeltaError::KeyExists { .. })
        ));
    }

    #[test]
    fn misplaced_entry_fails() {
        assert!(matches!(
            apply(&json!(1), &Delta::Added(json!(2))),
            Err(DeltaError::Misplaced { .. })
        ));
    }

    #[test]
    fn delta_serializes_compactly() {
        let delta = diff(&json!({"k": ["a"]}), &json!({"k": ["a", "b"], "n": 1})).unwrap();
        let encoded = serde_json::to_value(&delta).unwrap();
        assert_eq!(
            encoded,
            json!({"o": {"k": {"a": {"in": [[1, "b"]]}}, "n": {"+": 1}}})
        );
        let decoded: Delta = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn longest_increasing_marks_stationary_elements() {
        assert_eq!(longest_increasing(&[1, 2, 0]), vec![true, true, false]);
        assert_eq!(longest_increasing(&[]), Vec::<bool>::new());
        assert_eq!(longest_increasing(&[0, 1, 2]), vec![true, true, true]);
    }
}
