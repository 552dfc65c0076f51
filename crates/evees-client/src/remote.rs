//! Perspective backends.
//!
//! A `Remote` owns the mutable `perspective id -> head` association for the
//! perspectives declared under its id. Concrete transports (HTTP, chain,
//! p2p logs) live outside this crate; the in-memory remote here backs tests
//! and single-process use.

use async_trait::async_trait;
use evees_cas::{CasStore, Cid, MemoryCas};
use evees_core::{
    EveesMutation, Perspective, PerspectiveDetails, PerspectiveGetResult, Result,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A perspective head backend.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Stable id perspectives use to declare this remote.
    fn id(&self) -> &str;

    /// The logged-in user on this remote, if any.
    fn user_id(&self) -> Option<&str>;

    /// Read a perspective's details, possibly with a pre-fetched slice.
    async fn get_perspective(&self, perspective_id: &Cid) -> Result<PerspectiveGetResult>;

    /// Persist a mutation (already scoped to this remote).
    async fn update(&self, mutation: EveesMutation) -> Result<()>;

    /// Permission check for a head update.
    async fn can_update(&self, perspective_id: &Cid, user_id: Option<&str>) -> Result<bool>;

    /// The logged user's perspectives sharing the context of the given one.
    async fn get_user_perspectives(&self, perspective_id: &Cid) -> Result<Vec<Cid>>;
}

/// In-memory remote for tests and single-process use.
pub struct MemoryRemote {
    id: String,
    user_id: String,
    store: Arc<MemoryCas>,
    details: RwLock<HashMap<Cid, PerspectiveDetails>>,
    /// context -> perspective ids, for `get_user_perspectives`.
    contexts: RwLock<HashMap<String, Vec<Cid>>>,
    /// Explicit permission overrides; absent means allowed.
    acl: RwLock<HashMap<Cid, bool>>,
}

impl MemoryRemote {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, store: Arc<MemoryCas>) -> Self {
        MemoryRemote {
            id: id.into(),
            user_id: user_id.into(),
            store,
            details: RwLock::new(HashMap::new()),
            contexts: RwLock::new(HashMap::new()),
            acl: RwLock::new(HashMap::new()),
        }
    }

    /// The CAS store backing this remote.
    pub fn store(&self) -> &Arc<MemoryCas> {
        &self.store
    }

    /// Deny or allow updates on one perspective.
    pub fn set_can_update(&self, perspective_id: Cid, allowed: bool) {
        self.acl.write().insert(perspective_id, allowed);
    }

    /// Direct read of the persisted head, for assertions.
    pub fn head_of(&self, perspective_id: &Cid) -> Option<Cid> {
        self.details
            .read()
            .get(perspective_id)
            .and_then(|d| d.head_id)
    }

    fn index_context(&self, perspective_id: Cid, perspective: &Perspective) {
        let mut contexts = self.contexts.write();
        let ids = contexts.entry(perspective.context.clone()).or_default();
        if !ids.contains(&perspective_id) {
            ids.push(perspective_id);
        }
    }
}

#[async_trait]
impl Remote for MemoryRemote {
    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    async fn get_perspective(&self, perspective_id: &Cid) -> Result<PerspectiveGetResult> {
        let details = self
            .details
            .read()
            .get(perspective_id)
            .cloned()
            .unwrap_or_default();
        Ok(PerspectiveGetResult::of(details))
    }

    async fn update(&self, mutation: EveesMutation) -> Result<()> {
        for new_perspective in mutation.new_perspectives {
            let id = new_perspective.perspective.id;
            let perspective: Perspective = new_perspective.perspective.decode()?;
            self.store
                .store_entities(vec![new_perspective.perspective])
                .await?;
            self.index_context(id, &perspective);
            self.details.write().insert(id, new_perspective.details);
        }
        for update in mutation.updates {
            let mut details = self.details.write();
            let entry = details.entry(update.perspective_id).or_default();
            entry.head_id = Some(update.new_head_id);
        }
        for deleted in mutation.deleted_perspectives {
            self.details.write().remove(&deleted);
        }
        Ok(())
    }

    async fn can_update(&self, perspective_id: &Cid, _user_id: Option<&str>) -> Result<bool> {
        Ok(self
            .acl
            .read()
            .get(perspective_id)
            .copied()
            .unwrap_or(true))
    }

    async fn get_user_perspectives(&self, perspective_id: &Cid) -> Result<Vec<Cid>> {
        let entity = self.store.get_entity(perspective_id).await?;
        let perspective: Perspective = entity.decode()?;
        let candidates = self
            .contexts
            .read()
            .get(&perspective.context)
            .cloned()
            .unwrap_or_default();
        let mut owned = Vec::new();
        for id in candidates {
            let candidate: Perspective = self.store.get_entity(&id).await?.decode()?;
            if candidate.creator_id == self.user_id {
                owned.push(id);
            }
        }
        Ok(owned)
    }
}
