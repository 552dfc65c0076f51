//! The `Client` contract shared by every layer of the chain.
//!
//! Three composable layers each implement this trait while wrapping a base:
//! the remote router at the bottom, a read-through cache above it, and the
//! on-memory staging overlay on top. The merge engine only ever talks to the
//! outermost layer.

use async_trait::async_trait;
use evees_cas::{Cid, CidConfig, Entity};
use evees_core::{
    EveesMutation, NewPerspectiveData, PerspectiveGetResult, Result, UpdateRequest,
};
use serde_json::Value;

/// A perspective/entity client layer.
#[async_trait]
pub trait Client: Send + Sync {
    /// Read a perspective's details, possibly with a pre-fetched slice.
    async fn get_perspective(&self, perspective_id: &Cid) -> Result<PerspectiveGetResult>;

    /// Apply a mutation to this layer. Staging layers buffer it; backing
    /// layers persist it.
    async fn update(&self, mutation: EveesMutation) -> Result<()>;

    /// The currently staged mutation, without side effects.
    async fn diff(&self) -> Result<EveesMutation>;

    /// Forward staged changes to the base. All-or-nothing: on failure the
    /// staged state is left intact so a retry is safe.
    async fn flush(&self) -> Result<()>;

    /// Invalidate layer-local caches so the next read hits the base.
    async fn refresh(&self) -> Result<()>;

    /// Other perspectives of the same context owned by the calling user.
    async fn get_user_perspectives(&self, perspective_id: &Cid) -> Result<Vec<Cid>>;

    /// Whether the user may move the perspective's head. Never assumed
    /// true: layers without a cached answer defer to their base.
    async fn can_update(&self, perspective_id: &Cid, user_id: Option<&str>) -> Result<bool>;

    /// Resolve a single entity. Missing entity is an error.
    async fn get_entity(&self, hash: &Cid) -> Result<Entity>;

    /// Resolve a batch of entities. Partial results allowed.
    async fn get_entities(&self, hashes: &[Cid]) -> Result<Vec<Entity>>;

    /// Store pre-derived entities into this layer.
    async fn store_entities(&self, entities: Vec<Entity>) -> Result<()>;

    /// Hash an object without storing it. Pure.
    fn hash_entity(&self, object: &Value) -> Result<Entity>;

    /// The CID configuration in effect along this chain.
    fn cid_config(&self) -> CidConfig;

    /// Stage a single new perspective.
    async fn new_perspective(&self, new_perspective: NewPerspectiveData) -> Result<()> {
        self.update(EveesMutation::of_new_perspective(new_perspective))
            .await
    }

    /// Stage a single head update.
    async fn update_perspective(&self, update: UpdateRequest) -> Result<()> {
        self.update(EveesMutation::of_update(update)).await
    }

    /// Stage a perspective deletion.
    async fn delete_perspective(&self, perspective_id: &Cid) -> Result<()> {
        self.update(EveesMutation {
            deleted_perspectives: vec![*perspective_id],
            ..Default::default()
        })
        .await
    }

    /// Derive and store a batch of raw objects, returning their entities.
    async fn store_objects(&self, objects: Vec<Value>) -> Result<Vec<Entity>> {
        let entities = objects
            .iter()
            .map(|object| self.hash_entity(object))
            .collect::<Result<Vec<_>>>()?;
        self.store_entities(entities.clone()).await?;
        Ok(entities)
    }
}
