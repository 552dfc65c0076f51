//! Read-through cache layer.
//!
//! Caches perspective details and entities fetched from the base. Writes
//! are not buffered here (that is the overlay's job); they pass straight
//! through, updating the cache on the way so later reads stay coherent.

use crate::client::Client;
use async_trait::async_trait;
use evees_cas::{Cid, CidConfig, Entity};
use evees_core::{
    EveesMutation, PerspectiveDetails, PerspectiveGetResult, Result, Slice,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Caching client layer.
pub struct CacheClient {
    base: Arc<dyn Client>,
    details: RwLock<HashMap<Cid, PerspectiveDetails>>,
    entities: RwLock<HashMap<Cid, Entity>>,
}

impl CacheClient {
    pub fn new(base: Arc<dyn Client>) -> Self {
        CacheClient {
            base,
            details: RwLock::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached perspective details, for tests.
    pub fn cached_details(&self) -> usize {
        self.details.read().len()
    }

    fn absorb_slice(&self, slice: &Slice) {
        let mut entities = self.entities.write();
        for entity in &slice.entities {
            entities.insert(entity.id, entity.clone());
        }
        drop(entities);
        let mut details = self.details.write();
        for perspective in &slice.perspectives {
            details.insert(perspective.id, perspective.details.clone());
        }
    }
}

#[async_trait]
impl Client for CacheClient {
    async fn get_perspective(&self, perspective_id: &Cid) -> Result<PerspectiveGetResult> {
        if let Some(details) = self.details.read().get(perspective_id) {
            return Ok(PerspectiveGetResult::of(details.clone()));
        }
        let result = self.base.get_perspective(perspective_id).await?;
        self.details
            .write()
            .insert(*perspective_id, result.details.clone());
        if let Some(slice) = &result.slice {
            self.absorb_slice(slice);
        }
        Ok(result)
    }

    async fn update(&self, mutation: EveesMutation) -> Result<()> {
        // Pass through, then keep the cache coherent with what was written.
        self.base.update(mutation.clone()).await?;
        let mut details = self.details.write();
        for new_perspective in &mutation.new_perspectives {
            details.insert(
                new_perspective.perspective.id,
                new_perspective.details.clone(),
            );
        }
        for update in &mutation.updates {
            let entry = details.entry(update.perspective_id).or_default();
            entry.head_id = Some(update.new_head_id);
        }
        for deleted in &mutation.deleted_perspectives {
            details.remove(deleted);
        }
        Ok(())
    }

    async fn diff(&self) -> Result<EveesMutation> {
        self.base.diff().await
    }

    async fn flush(&self) -> Result<()> {
        self.base.flush().await
    }

    async fn refresh(&self) -> Result<()> {
        self.details.write().clear();
        self.entities.write().clear();
        self.base.refresh().await
    }

    async fn get_user_perspectives(&self, perspective_id: &Cid) -> Result<Vec<Cid>> {
        self.base.get_user_perspectives(perspective_id).await
    }

    async fn can_update(&self, perspective_id: &Cid, user_id: Option<&str>) -> Result<bool> {
        self.base.can_update(perspective_id, user_id).await
    }

    async fn get_entity(&self, hash: &Cid) -> Result<Entity> {
        if let Some(entity) = self.entities.read().get(hash) {
            return Ok(entity.clone());
        }
        let entity = self.base.get_entity(hash).await?;
        self.entities.write().insert(*hash, entity.clone());
        Ok(entity)
    }

    async fn get_entities(&self, hashes: &[Cid]) -> Result<Vec<Entity>> {
        // Split-read: serve cached, batch-fetch the remainder.
        let mut found = Vec::new();
        let mut missing = Vec::new();
        {
            let entities = self.entities.read();
            for hash in hashes {
                match entities.get(hash) {
                    Some(entity) => found.push(entity.clone()),
                    None => missing.push(*hash),
                }
            }
        }
        if !missing.is_empty() {
            let fetched = self.base.get_entities(&missing).await?;
            let mut entities = self.entities.write();
            for entity in &fetched {
                entities.insert(entity.id, entity.clone());
            }
            found.extend(fetched);
        }
        Ok(found)
    }

    async fn store_entities(&self, entities: Vec<Entity>) -> Result<()> {
        self.base.store_entities(entities.clone()).await?;
        let mut cache = self.entities.write();
        for entity in entities {
            cache.insert(entity.id, entity);
        }
        Ok(())
    }

    fn hash_entity(&self, object: &Value) -> Result<Entity> {
        self.base.hash_entity(object)
    }

    fn cid_config(&self) -> CidConfig {
        self.base.cid_config()
    }
}
