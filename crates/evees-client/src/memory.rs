//! On-memory staging overlay.
//!
//! The outermost client layer, used by the merge engine. Mutations are
//! buffered in staging maps (last-write-wins per perspective id within one
//! buffer lifetime) and only reach the base on an explicit `flush`, which is
//! all-or-nothing: a failure leaves the staging maps untouched so retrying
//! the whole flush is safe. Retry is idempotent because staged entities are
//! content-addressed and head updates are last-write-wins.
//!
//! A buffer instance is exclusively owned by the caller that created it;
//! it is not designed for sharing across independent logical sessions.

use crate::client::Client;
use async_trait::async_trait;
use evees_cas::{Cid, CidConfig, Entity};
use evees_core::{
    EveesMutation, NewPerspectiveData, PerspectiveDetails, PerspectiveGetResult, Result, Slice,
    UpdateRequest,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// In-memory mutation overlay over a base client.
pub struct OnMemoryClient {
    base: Arc<dyn Client>,

    // Staged writes, drained on flush.
    new_perspectives: RwLock<HashMap<Cid, NewPerspectiveData>>,
    updates: RwLock<HashMap<Cid, UpdateRequest>>,
    entities: RwLock<HashMap<Cid, Entity>>,
    deleted: RwLock<HashSet<Cid>>,

    // Layer-local read caches, invalidated by refresh.
    can_updates: RwLock<HashMap<Cid, bool>>,
    user_perspectives: RwLock<HashMap<Cid, Vec<Cid>>>,
    cached_details: RwLock<HashMap<Cid, PerspectiveDetails>>,
    cached_entities: RwLock<HashMap<Cid, Entity>>,
}

impl OnMemoryClient {
    pub fn new(base: Arc<dyn Client>) -> Self {
        OnMemoryClient {
            base,
            new_perspectives: RwLock::new(HashMap::new()),
            updates: RwLock::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
            deleted: RwLock::new(HashSet::new()),
            can_updates: RwLock::new(HashMap::new()),
            user_perspectives: RwLock::new(HashMap::new()),
            cached_details: RwLock::new(HashMap::new()),
            cached_entities: RwLock::new(HashMap::new()),
        }
    }

    fn absorb_slice(&self, slice: &Slice) {
        let mut entities = self.cached_entities.write();
        for entity in &slice.entities {
            entities.insert(entity.id, entity.clone());
        }
        drop(entities);
        let mut details = self.cached_details.write();
        for perspective in &slice.perspectives {
            details.insert(perspective.id, perspective.details.clone());
        }
    }

    fn staged_mutation(&self) -> EveesMutation {
        let mut new_perspectives: Vec<NewPerspectiveData> =
            self.new_perspectives.read().values().cloned().collect();
        new_perspectives.sort_by_key(|np| np.perspective.id);

        let mut updates: Vec<UpdateRequest> = self.updates.read().values().cloned().collect();
        updates.sort_by_key(|up| up.perspective_id);

        let mut deleted_perspectives: Vec<Cid> = self.deleted.read().iter().copied().collect();
        deleted_perspectives.sort();

        EveesMutation {
            new_perspectives,
            updates,
            deleted_perspectives,
        }
    }

    fn clear_staged(&self) {
        self.new_perspectives.write().clear();
        self.updates.write().clear();
        self.entities.write().clear();
        self.deleted.write().clear();
    }
}

#[async_trait]
impl Client for OnMemoryClient {
    async fn get_perspective(&self, perspective_id: &Cid) -> Result<PerspectiveGetResult> {
        if self.deleted.read().contains(perspective_id) {
            return Ok(PerspectiveGetResult::of(PerspectiveDetails::default()));
        }
        // A just-created perspective's staged head wins over everything.
        if let Some(new_perspective) = self.new_perspectives.read().get(perspective_id) {
            return Ok(PerspectiveGetResult::of(new_perspective.details.clone()));
        }
        if let Some(update) = self.updates.read().get(perspective_id) {
            return Ok(PerspectiveGetResult::of(PerspectiveDetails {
                head_id: Some(update.new_head_id),
                can_update: self.can_updates.read().get(perspective_id).copied(),
            }));
        }
        if let Some(details) = self.cached_details.read().get(perspective_id) {
            return Ok(PerspectiveGetResult::of(details.clone()));
        }
        let result = self.base.get_perspective(perspective_id).await?;
        self.cached_details
            .write()
            .insert(*perspective_id, result.details.clone());
        if let Some(slice) = &result.slice {
            self.absorb_slice(slice);
        }
        Ok(result)
    }

    async fn update(&self, mutation: EveesMutation) -> Result<()> {
        // No conflict detection here: reconciliation is the merge engine's
        // job and has already happened by the time mutations are staged.
        {
            let mut new_perspectives = self.new_perspectives.write();
            for new_perspective in mutation.new_perspectives {
                new_perspectives.insert(new_perspective.perspective.id, new_perspective);
            }
        }
        {
            let mut new_perspectives = self.new_perspectives.write();
            let mut updates = self.updates.write();
            for update in mutation.updates {
                // A head update on a perspective still staged as new folds
                // into its creation entry; that entry shadows `updates` on
                // reads, so a separate update record would be invisible.
                if let Some(staged) = new_perspectives.get_mut(&update.perspective_id) {
                    staged.details.head_id = Some(update.new_head_id);
                } else {
                    updates.insert(update.perspective_id, update);
                }
            }
        }
        {
            let mut deleted = self.deleted.write();
            for id in mutation.deleted_perspectives {
                deleted.insert(id);
                self.new_perspectives.write().remove(&id);
                self.updates.write().remove(&id);
            }
        }
        Ok(())
    }

    async fn diff(&self) -> Result<EveesMutation> {
        Ok(self.staged_mutation())
    }

    async fn flush(&self) -> Result<()> {
        let mut staged_entities: Vec<Entity> = self.entities.read().values().cloned().collect();
        staged_entities.sort_by_key(|entity| entity.id);
        let mutation = self.staged_mutation();

        tracing::debug!(
            entities = staged_entities.len(),
            new = mutation.new_perspectives.len(),
            updates = mutation.updates.len(),
            deleted = mutation.deleted_perspectives.len(),
            "flushing staged mutation"
        );

        // Any failure below returns before the staging maps are cleared,
        // so the whole flush can be retried.
        self.base.store_entities(staged_entities).await?;
        self.base.update(mutation.clone()).await?;
        self.base.flush().await?;

        // Fold the flushed heads into the read cache before the staging
        // maps stop shadowing it, so reads stay coherent.
        {
            let mut details = self.cached_details.write();
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
        }
        self.clear_staged();
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        // Invalidates layer-local caches only; staged writes survive. A
        // forced re-read from the remotes is a known gap carried over from
        // the reference behavior.
        self.cached_details.write().clear();
        self.cached_entities.write().clear();
        self.can_updates.write().clear();
        self.user_perspectives.write().clear();
        self.base.refresh().await
    }

    async fn get_user_perspectives(&self, perspective_id: &Cid) -> Result<Vec<Cid>> {
        if let Some(ids) = self.user_perspectives.read().get(perspective_id) {
            return Ok(ids.clone());
        }
        let ids = self.base.get_user_perspectives(perspective_id).await?;
        self.user_perspectives
            .write()
            .insert(*perspective_id, ids.clone());
        Ok(ids)
    }

    async fn can_update(&self, perspective_id: &Cid, user_id: Option<&str>) -> Result<bool> {
        if let Some(allowed) = self.can_updates.read().get(perspective_id) {
            return Ok(*allowed);
        }
        // Never assumed true: defer to the base permission check.
        let allowed = self.base.can_update(perspective_id, user_id).await?;
        self.can_updates.write().insert(*perspective_id, allowed);
        Ok(allowed)
    }

    async fn get_entity(&self, hash: &Cid) -> Result<Entity> {
        if let Some(entity) = self.entities.read().get(hash) {
            return Ok(entity.clone());
        }
        if let Some(entity) = self.cached_entities.read().get(hash) {
            return Ok(entity.clone());
        }
        let entity = self.base.get_entity(hash).await?;
        self.cached_entities.write().insert(*hash, entity.clone());
        Ok(entity)
    }

    async fn get_entities(&self, hashes: &[Cid]) -> Result<Vec<Entity>> {
        // Split-read: staged and cached first, batch the rest from base.
        let mut found = Vec::new();
        let mut missing = Vec::new();
        {
            let staged = self.entities.read();
            let cached = self.cached_entities.read();
            for hash in hashes {
                if let Some(entity) = staged.get(hash).or_else(|| cached.get(hash)) {
                    found.push(entity.clone());
                } else {
                    missing.push(*hash);
                }
            }
        }
        if !missing.is_empty() {
            let fetched = self.base.get_entities(&missing).await?;
            let mut cached = self.cached_entities.write();
            for entity in &fetched {
                cached.insert(entity.id, entity.clone());
            }
            found.extend(fetched);
        }
        Ok(found)
    }

    async fn store_entities(&self, entities: Vec<Entity>) -> Result<()> {
        // Write-through-stage: held locally, persisted on flush.
        let mut staged = self.entities.write();
        for entity in entities {
            staged.insert(entity.id, entity);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use crate::router::RouterClient;
    use evees_cas::{CasStore, MemoryCas};
    use evees_core::{now_timestamp, EveesError, Perspective};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn perspective(context: &str) -> Perspective {
        Perspective {
            remote: "memory".to_string(),
            path: None,
            creator_id: "alice".to_string(),
            context: context.to_string(),
            timestamp: now_timestamp(),
            meta: None,
        }
    }

    fn setup() -> (Arc<MemoryCas>, Arc<MemoryRemote>, OnMemoryClient) {
        let store = Arc::new(MemoryCas::new());
        let remote = Arc::new(MemoryRemote::new("memory", "alice", store.clone()));
        let router = Arc::new(RouterClient::new(vec![remote.clone()], store.clone()));
        (store, remote, OnMemoryClient::new(router))
    }

    fn new_perspective_data(store: &MemoryCas, context: &str) -> NewPerspectiveData {
        let entity = perspective(context).derive(&store.cid_config()).unwrap();
        NewPerspectiveData {
            perspective: entity,
            details: PerspectiveDetails::with_head(store.cid_config().hash(context.as_bytes())),
            links: None,
        }
    }

    #[tokio::test]
    async fn test_staged_head_visible_before_flush() {
        let (store, remote, overlay) = setup();
        let data = new_perspective_data(&store, "ctx");
        let id = data.perspective.id;
        let head = data.details.head_id.unwrap();

        overlay.new_perspective(data).await.unwrap();

        // Visible through the overlay, not yet on the remote.
        let read = overlay.get_perspective(&id).await.unwrap();
        assert_eq!(read.details.head_id, Some(head));
        assert_eq!(remote.head_of(&id), None);
    }

    #[tokio::test]
    async fn test_staged_update_on_unflushed_perspective_wins() {
        let (store, _, overlay) = setup();
        let data = new_perspective_data(&store, "ctx");
        let id = data.perspective.id;
        overlay.new_perspective(data).await.unwrap();

        let new_head = store.cid_config().hash(b"edited");
        overlay
            .update_perspective(UpdateRequest {
                perspective_id: id,
                new_head_id: new_head,
                old_head_id: None,
                from_perspective_id: None,
            })
            .await
            .unwrap();

        // The edit is visible through the overlay, not lost behind the
        // staged creation.
        let read = overlay.get_perspective(&id).await.unwrap();
        assert_eq!(read.details.head_id, Some(new_head));

        // And the staged creation itself carries the final head.
        let diff = overlay.diff().await.unwrap();
        assert!(diff.updates.is_empty());
        assert_eq!(diff.new_perspectives[0].details.head_id, Some(new_head));
    }

    #[tokio::test]
    async fn test_diff_and_flush() {
        let (store, remote, overlay) = setup();
        let data = new_perspective_data(&store, "ctx");
        let id = data.perspective.id;
        overlay
            .store_entities(vec![data.perspective.clone()])
            .await
            .unwrap();
        overlay.new_perspective(data).await.unwrap();

        let diff = overlay.diff().await.unwrap();
        assert_eq!(diff.new_perspectives.len(), 1);

        overlay.flush().await.unwrap();
        assert!(overlay.diff().await.unwrap().is_empty());
        assert!(remote.head_of(&id).is_some());
    }

    #[tokio::test]
    async fn test_last_write_wins_per_perspective() {
        let (store, _, overlay) = setup();
        let id = store.cid_config().hash(b"p");
        for label in [b"h1".as_slice(), b"h2".as_slice()] {
            overlay
                .update_perspective(UpdateRequest {
                    perspective_id: id,
                    new_head_id: store.cid_config().hash(label),
                    old_head_id: None,
                    from_perspective_id: None,
                })
                .await
                .unwrap();
        }
        let diff = overlay.diff().await.unwrap();
        assert_eq!(diff.updates.len(), 1);
        assert_eq!(diff.updates[0].new_head_id, store.cid_config().hash(b"h2"));
    }

    #[tokio::test]
    async fn test_deleted_perspective_reads_empty() {
        let (store, _, overlay) = setup();
        let data = new_perspective_data(&store, "ctx");
        let id = data.perspective.id;
        overlay.new_perspective(data).await.unwrap();
        overlay.delete_perspective(&id).await.unwrap();

        let read = overlay.get_perspective(&id).await.unwrap();
        assert_eq!(read.details.head_id, None);
        // The staged creation was superseded by the delete.
        assert!(overlay.diff().await.unwrap().new_perspectives.is_empty());
    }

    /// Base client whose `update` can be made to fail, for the flush
    /// atomicity contract.
    struct FailingBase {
        inner: Arc<dyn Client>,
        fail_update: AtomicBool,
    }

    #[async_trait]
    impl Client for FailingBase {
        async fn get_perspective(&self, id: &Cid) -> Result<PerspectiveGetResult> {
            self.inner.get_perspective(id).await
        }
        async fn update(&self, mutation: EveesMutation) -> Result<()> {
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(EveesError::Flush("injected failure".to_string()));
            }
            self.inner.update(mutation).await
        }
        async fn diff(&self) -> Result<EveesMutation> {
            self.inner.diff().await
        }
        async fn flush(&self) -> Result<()> {
            self.inner.flush().await
        }
        async fn refresh(&self) -> Result<()> {
            self.inner.refresh().await
        }
        async fn get_user_perspectives(&self, id: &Cid) -> Result<Vec<Cid>> {
            self.inner.get_user_perspectives(id).await
        }
        async fn can_update(&self, id: &Cid, user_id: Option<&str>) -> Result<bool> {
            self.inner.can_update(id, user_id).await
        }
        async fn get_entity(&self, hash: &Cid) -> Result<Entity> {
            self.inner.get_entity(hash).await
        }
        async fn get_entities(&self, hashes: &[Cid]) -> Result<Vec<Entity>> {
            self.inner.get_entities(hashes).await
        }
        async fn store_entities(&self, entities: Vec<Entity>) -> Result<()> {
            self.inner.store_entities(entities).await
        }
        fn hash_entity(&self, object: &Value) -> Result<Entity> {
            self.inner.hash_entity(object)
        }
        fn cid_config(&self) -> CidConfig {
            self.inner.cid_config()
        }
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_staging_intact() {
        let store = Arc::new(MemoryCas::new());
        let remote = Arc::new(MemoryRemote::new("memory", "alice", store.clone()));
        let router = Arc::new(RouterClient::new(vec![remote], store.clone()));
        let failing = Arc::new(FailingBase {
            inner: router,
            fail_update: AtomicBool::new(true),
        });
        let overlay = OnMemoryClient::new(failing.clone());

        let data = new_perspective_data(&store, "ctx");
        overlay
            .store_entities(vec![data.perspective.clone()])
            .await
            .unwrap();
        overlay.new_perspective(data).await.unwrap();
        let before = overlay.diff().await.unwrap();

        assert!(overlay.flush().await.is_err());
        assert_eq!(overlay.diff().await.unwrap(), before);

        // Retry after the fault clears drains the buffer.
        failing.fail_update.store(false, Ordering::SeqCst);
        overlay.flush().await.unwrap();
        assert!(overlay.diff().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entity_staging_split_read() {
        let (store, _, overlay) = setup();
        let staged = overlay.store_objects(vec![json!({"a": 1})]).await.unwrap()[0].id;
        let persisted = store.store_entity(json!({"b": 2})).await.unwrap();

        let found = overlay.get_entities(&[staged, persisted]).await.unwrap();
        assert_eq!(found.len(), 2);
        // The staged entity never reached the base.
        assert!(store.get_entities(&[staged]).await.unwrap().is_empty());
    }
}
