//! Property-based tests for content addressing.
//!
//! These verify the determinism contract the rest of the engine stands on:
//!  - hash(o) == hash(o) for any object o
//!  - derive(o).id == hash(o)
//!  - key insertion order never changes the CID

use evees_cas::{canonical_bytes, derive_entity, CidConfig};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Generate small JSON objects with string/number/array/nested-object fields.
fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        "[a-z]{0,8}".prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| json!(m)),
        ]
    })
}

proptest! {
    #[test]
    fn hash_deterministic(value in value_strategy()) {
        let config = CidConfig::default();
        prop_assert_eq!(
            config.hash(&canonical_bytes(&value)),
            config.hash(&canonical_bytes(&value))
        );
    }

    #[test]
    fn derive_id_matches_hash(value in value_strategy()) {
        let config = CidConfig::default();
        let entity = derive_entity(value.clone(), &config);
        prop_assert_eq!(entity.id, config.hash(&canonical_bytes(&value)));
        prop_assert!(entity.verify(&config));
    }

    #[test]
    fn distinct_objects_distinct_ids(a in value_strategy(), b in value_strategy()) {
        prop_assume!(a != b);
        let config = CidConfig::default();
        prop_assert_ne!(
            derive_entity(a, &config).id,
            derive_entity(b, &config).id
        );
    }
}
