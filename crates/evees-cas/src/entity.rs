//! Content-addressed entities and canonical encoding.
//!
//! An [`Entity`] pairs an object with its CID. The invariant enforced
//! everywhere downstream is `entity.id == hash(canonical(entity.object))`;
//! a violation means the store is corrupt and is always fatal.

use crate::cid::{Cid, CidConfig};
use crate::store::CasError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical byte encoding of a JSON value.
///
/// `serde_json`'s default `Map` is BTreeMap-backed, so object keys come out
/// sorted; together with compact separators this makes the encoding
/// deterministic. The `preserve_order` feature must stay off.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("json value serialization is infallible")
}

/// A content-addressed object: its CID plus the raw JSON payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Cid,
    pub object: Value,
}

impl Entity {
    /// Check that the claimed id matches the object's hash.
    pub fn verify(&self, config: &CidConfig) -> bool {
        config.hash(&canonical_bytes(&self.object)) == self.id
    }

    /// Deserialize the payload into a typed object.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CasError> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| CasError::Serialization(e.to_string()))
    }
}

/// Hash an object under `config` and wrap it as an [`Entity`].
pub fn derive_entity(object: Value, config: &CidConfig) -> Entity {
    let id = config.hash(&canonical_bytes(&object));
    Entity { id, object }
}

/// Serialize a typed object and derive its entity.
pub fn derive_typed<T: Serialize>(object: &T, config: &CidConfig) -> Result<Entity, CasError> {
    let value =
        serde_json::to_value(object).map_err(|e| CasError::Serialization(e.to_string()))?;
    Ok(derive_entity(value, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_matches_hash() {
        let config = CidConfig::default();
        let object = json!({"text": "hello", "links": []});
        let entity = derive_entity(object.clone(), &config);
        assert_eq!(entity.id, config.hash(&canonical_bytes(&object)));
        assert!(entity.verify(&config));
    }

    #[test]
    fn test_key_order_irrelevant() {
        let config = CidConfig::default();
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": 2, "b": 1}"#).unwrap();
        assert_eq!(derive_entity(a, &config).id, derive_entity(b, &config).id);
    }

    #[test]
    fn test_tampered_entity_fails_verify() {
        let config = CidConfig::default();
        let mut entity = derive_entity(json!({"text": "x"}), &config);
        entity.object = json!({"text": "y"});
        assert!(!entity.verify(&config));
    }

    #[test]
    fn test_nested_canonical() {
        let config = CidConfig::default();
        let a: Value = serde_json::from_str(r#"{"outer": {"b": 1, "a": [1, 2]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"outer": {"a": [1, 2], "b": 1}}"#).unwrap();
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
    }
}
