//! Property-based tests for the delta engine and path operations.
//!
//! Invariants: a delta applied to its base reproduces the target, the
//! reversed delta restores the base, and equal documents produce no delta.

use dandiclaw_patch::{apply, diff, get, reverse, set};
use proptest::prelude::*;
use serde_json::{Value, json};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-50i64..50).prop_map(|n| json!(n)),
        "[a-c]{0,3}".prop_map(Value::String),
    ]
}

fn document() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::btree_map("[a-e]", inner, 0..5)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Records with an `identifier`, the shape contributor lists take.
fn records() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec((0u8..6, "[A-D][a-z]{0,2}"), 0..6).prop_map(|rows| {
        let mut seen = std::collections::HashSet::new();
        rows.into_iter()
            .filter(|(id, _)| seen.insert(*id))
            .map(|(id, name)| json!({"identifier": format!("orcid-{id}"), "name": name}))
            .collect()
    })
}

proptest! {
    /// Property: apply(a, diff(a, b)) == b
    #[test]
    fn delta_reproduces_target(a in document(), b in document()) {
        match diff(&a, &b) {
            None => prop_assert_eq!(&a, &b),
            Some(delta) => {
                let patched = apply(&a, &delta);
                prop_assert!(patched.is_ok(), "apply failed: {:?}", patched);
                prop_assert_eq!(patched.unwrap(), b);
            }
        }
    }

    /// Property: the reversed delta restores the base
    #[test]
    fn reversed_delta_restores_base(a in document(), b in document()) {
        if let Some(delta) = diff(&a, &b) {
            let restored = apply(&b, &reverse(&delta));
            prop_assert!(restored.is_ok(), "reverse apply failed: {:?}", restored);
            prop_assert_eq!(restored.unwrap(), a);
        }
    }

    /// Property: a document never differs from itself
    #[test]
    fn self_diff_is_empty(a in document()) {
        prop_assert!(diff(&a, &a.clone()).is_none());
    }

    /// Property: shuffling identified records only ever produces moves
    #[test]
    fn shuffled_records_are_moved_not_rewritten(
        rows in records(),
        seed in any::<u64>(),
    ) {
        let mut shuffled = rows.clone();
        // Deterministic Fisher-Yates over the seed.
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let j = (state % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }

        let original = json!({"contributor": rows});
        let modified = json!({"contributor": shuffled});
        if let Some(delta) = diff(&original, &modified) {
            let encoded = serde_json::to_value(&delta).unwrap();
            let array = &encoded["o"]["contributor"]["a"];
            prop_assert!(array.get("rm").is_none());
            prop_assert!(array.get("in").is_none());
            prop_assert!(array.get("ch").is_none());
            prop_assert_eq!(apply(&original, &delta).unwrap(), modified);
        }
    }

    /// Property: get after set returns the written value
    #[test]
    fn get_after_set(key in "[a-e]", inner in "[f-j]", value in leaf()) {
        let doc = json!({"name": "dandiset"});
        let path = format!("{key}.{inner}");
        let out = set(&doc, &path, value.clone()).unwrap();
        prop_assert_eq!(get(&out, &path), Some(&value));
        prop_assert_eq!(doc, json!({"name": "dandiset"}));
    }
}
