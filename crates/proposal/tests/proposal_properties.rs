//! Property-based tests for proposal tokens.

use dandiclaw_proposal::{ProposalRejection, compute_hash, decode, encode, validate};
use proptest::prelude::*;
use serde_json::{Value, json};

fn document() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (0i64..20).prop_map(|n| json!(n)),
        "[a-z ]{0,6}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-d]", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    /// Property: a decoded token validates against the original and yields the modified document
    #[test]
    fn token_round_trip_reconstructs_modified(a in document(), b in document()) {
        match encode(&a, &b) {
            None => prop_assert_eq!(&a, &b),
            Some(token) => {
                let proposal = decode(&token);
                prop_assert!(proposal.is_some());
                let proposal = proposal.unwrap();
                prop_assert_eq!(&proposal.hash, &compute_hash(&a));
                prop_assert_eq!(validate(&proposal, &a).unwrap(), b);
            }
        }
    }

    /// Property: a proposal never applies to a document with a different hash
    #[test]
    fn different_base_is_a_conflict(a in document(), b in document(), c in document()) {
        prop_assume!(compute_hash(&a) != compute_hash(&c));
        if let Some(token) = encode(&a, &b) {
            let proposal = decode(&token).unwrap();
            let is_conflict = matches!(
                validate(&proposal, &c),
                Err(ProposalRejection::Conflict { .. })
            );
            prop_assert!(is_conflict);
        }
    }

    /// Property: decoding arbitrary text never panics
    #[test]
    fn decode_never_panics(token in "\\PC{0,64}") {
        let _ = decode(&token);
    }
}
