//! CAS store contract and in-memory implementation.
//!
//! Entities are immutable and addressed by content hash, so a store-wide
//! overwrite of the same hash is idempotent and never a conflict.

use crate::cid::{Cid, CidConfig};
use crate::entity::{derive_entity, Entity};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from content-addressed storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CasError {
    /// An entity's computed hash does not match its claimed id. Fatal:
    /// indicates a corrupt store or a protocol violation, never retried.
    #[error("integrity violation for entity {0}")]
    Integrity(Cid),

    /// A required entity could not be resolved.
    #[error("entity not found: {0}")]
    EntityNotFound(Cid),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend failure (network, disk) from a concrete store.
    #[error("store error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, CasError>;

/// Content-addressed entity storage.
///
/// `get_entities` may return partial results; callers detect what is missing.
/// `get_entity` of a missing hash is an error.
#[async_trait]
pub trait CasStore: Send + Sync {
    /// Resolve a single entity. Missing entity is `EntityNotFound`.
    async fn get_entity(&self, hash: &Cid) -> Result<Entity>;

    /// Resolve a batch of entities. Partial results are allowed.
    async fn get_entities(&self, hashes: &[Cid]) -> Result<Vec<Entity>>;

    /// Hash an object without storing it. Pure, no I/O.
    fn hash_entity(&self, object: &Value) -> Result<Entity>;

    /// Store an object, returning its hash. Idempotent.
    async fn store_entity(&self, object: Value) -> Result<Cid>;

    /// Store a batch of pre-derived entities. Each is verified first.
    async fn store_entities(&self, entities: Vec<Entity>) -> Result<()>;

    /// Push any buffered writes to the backing medium.
    async fn flush(&self) -> Result<()>;

    /// The CID configuration this store hashes under.
    fn cid_config(&self) -> CidConfig;
}

/// In-memory CAS store.
#[derive(Debug, Default)]
pub struct MemoryCas {
    config: CidConfig,
    entities: RwLock<HashMap<Cid, Entity>>,
}

impl MemoryCas {
    pub fn new() -> Self {
        MemoryCas {
            config: CidConfig::default(),
            entities: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_config(config: CidConfig) -> Self {
        MemoryCas {
            config,
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

#[async_trait]
impl CasStore for MemoryCas {
    async fn get_entity(&self, hash: &Cid) -> Result<Entity> {
        let entities = self.entities.read();
        let entity = entities
            .get(hash)
            .cloned()
            .ok_or(CasError::EntityNotFound(*hash))?;
        if !entity.verify(&self.config) {
            return Err(CasError::Integrity(entity.id));
        }
        Ok(entity)
    }

    async fn get_entities(&self, hashes: &[Cid]) -> Result<Vec<Entity>> {
        let entities = self.entities.read();
        let mut found = Vec::new();
        for hash in hashes {
            if let Some(entity) = entities.get(hash) {
                if !entity.verify(&self.config) {
                    return Err(CasError::Integrity(entity.id));
                }
                found.push(entity.clone());
            }
        }
        Ok(found)
    }

    fn hash_entity(&self, object: &Value) -> Result<Entity> {
        Ok(derive_entity(object.clone(), &self.config))
    }

    async fn store_entity(&self, object: Value) -> Result<Cid> {
        let entity = derive_entity(object, &self.config);
        let id = entity.id;
        self.entities.write().insert(id, entity);
        Ok(id)
    }

    async fn store_entities(&self, entities: Vec<Entity>) -> Result<()> {
        let mut map = self.entities.write();
        for entity in entities {
            if !entity.verify(&self.config) {
                return Err(CasError::Integrity(entity.id));
            }
            map.insert(entity.id, entity);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn cid_config(&self) -> CidConfig {
        self.config
    }
}
