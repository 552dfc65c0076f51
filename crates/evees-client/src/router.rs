//! Base client layer: dispatch by declared remote.
//!
//! Every perspective object names the remote that owns its head. The router
//! resolves the perspective entity from the CAS, then forwards the call to
//! the matching registered remote. A mutation touching several remotes is
//! split into one scoped mutation per remote.

use crate::client::Client;
use crate::remote::Remote;
use async_trait::async_trait;
use evees_cas::{CasStore, Cid, CidConfig, Entity};
use evees_core::{
    EveesError, EveesMutation, Perspective, PerspectiveGetResult, Result,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes perspective operations to the correct backend remote.
pub struct RouterClient {
    remotes: HashMap<String, Arc<dyn Remote>>,
    store: Arc<dyn CasStore>,
}

impl RouterClient {
    pub fn new(remotes: Vec<Arc<dyn Remote>>, store: Arc<dyn CasStore>) -> Self {
        let remotes = remotes
            .into_iter()
            .map(|remote| (remote.id().to_string(), remote))
            .collect();
        RouterClient { remotes, store }
    }

    fn remote(&self, remote_id: &str) -> Result<&Arc<dyn Remote>> {
        self.remotes
            .get(remote_id)
            .ok_or_else(|| EveesError::RemoteNotFound(remote_id.to_string()))
    }

    /// Resolve the remote owning a perspective, via its structural object.
    async fn remote_of(&self, perspective_id: &Cid) -> Result<&Arc<dyn Remote>> {
        let entity = self.store.get_entity(perspective_id).await?;
        let perspective: Perspective = entity.decode()?;
        self.remote(&perspective.remote)
    }

    /// Split a mutation into per-remote scoped mutations.
    async fn split_by_remote(
        &self,
        mutation: EveesMutation,
    ) -> Result<HashMap<String, EveesMutation>> {
        let mut split: HashMap<String, EveesMutation> = HashMap::new();

        for new_perspective in mutation.new_perspectives {
            let perspective: Perspective = new_perspective.perspective.decode()?;
            self.remote(&perspective.remote)?;
            split
                .entry(perspective.remote)
                .or_default()
                .new_perspectives
                .push(new_perspective);
        }
        for update in mutation.updates {
            let remote = self.remote_of(&update.perspective_id).await?;
            split
                .entry(remote.id().to_string())
                .or_default()
                .updates
                .push(update);
        }
        for deleted in mutation.deleted_perspectives {
            let remote = self.remote_of(&deleted).await?;
            split
                .entry(remote.id().to_string())
                .or_default()
                .deleted_perspectives
                .push(deleted);
        }
        Ok(split)
    }
}

#[async_trait]
impl Client for RouterClient {
    async fn get_perspective(&self, perspective_id: &Cid) -> Result<PerspectiveGetResult> {
        let remote = self.remote_of(perspective_id).await?;
        remote.get_perspective(perspective_id).await
    }

    async fn update(&self, mutation: EveesMutation) -> Result<()> {
        let split = self.split_by_remote(mutation).await?;
        for (remote_id, scoped) in split {
            tracing::debug!(
                remote = %remote_id,
                new = scoped.new_perspectives.len(),
                updates = scoped.updates.len(),
                deleted = scoped.deleted_perspectives.len(),
                "routing mutation"
            );
            self.remote(&remote_id)?.update(scoped).await?;
        }
        Ok(())
    }

    async fn diff(&self) -> Result<EveesMutation> {
        // The router stages nothing.
        Ok(EveesMutation::new())
    }

    async fn flush(&self) -> Result<()> {
        self.store.flush().await?;
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn get_user_perspectives(&self, perspective_id: &Cid) -> Result<Vec<Cid>> {
        let remote = self.remote_of(perspective_id).await?;
        remote.get_user_perspectives(perspective_id).await
    }

    async fn can_update(&self, perspective_id: &Cid, user_id: Option<&str>) -> Result<bool> {
        let remote = self.remote_of(perspective_id).await?;
        remote.can_update(perspective_id, user_id).await
    }

    async fn get_entity(&self, hash: &Cid) -> Result<Entity> {
        Ok(self.store.get_entity(hash).await?)
    }

    async fn get_entities(&self, hashes: &[Cid]) -> Result<Vec<Entity>> {
        Ok(self.store.get_entities(hashes).await?)
    }

    async fn store_entities(&self, entities: Vec<Entity>) -> Result<()> {
        Ok(self.store.store_entities(entities).await?)
    }

    fn hash_entity(&self, object: &Value) -> Result<Entity> {
        Ok(self.store.hash_entity(object)?)
    }

    fn cid_config(&self) -> CidConfig {
        self.store.cid_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use evees_cas::MemoryCas;
    use evees_core::{now_timestamp, NewPerspectiveData, PerspectiveDetails};

    fn perspective_on(remote: &str) -> Perspective {
        Perspective {
            remote: remote.to_string(),
            path: None,
            creator_id: "alice".to_string(),
            context: "ctx".to_string(),
            timestamp: now_timestamp(),
            meta: None,
        }
    }

    fn setup() -> (Arc<MemoryCas>, Arc<MemoryRemote>, Arc<MemoryRemote>, RouterClient) {
        let store = Arc::new(MemoryCas::new());
        let remote_a = Arc::new(MemoryRemote::new("remote-a", "alice", store.clone()));
        let remote_b = Arc::new(MemoryRemote::new("remote-b", "alice", store.clone()));
        let router = RouterClient::new(
            vec![remote_a.clone(), remote_b.clone()],
            store.clone(),
        );
        (store, remote_a, remote_b, router)
    }

    #[tokio::test]
    async fn test_dispatch_by_declared_remote() {
        let (store, remote_a, remote_b, router) = setup();

        let on_a = perspective_on("remote-a").derive(&store.cid_config()).unwrap();
        let on_b = perspective_on("remote-b").derive(&store.cid_config()).unwrap();

        let mut mutation = EveesMutation::new();
        for entity in [on_a.clone(), on_b.clone()] {
            mutation.new_perspectives.push(NewPerspectiveData {
                perspective: entity,
                details: PerspectiveDetails::with_head(store.cid_config().hash(b"h")),
                links: None,
            });
        }
        router.update(mutation).await.unwrap();

        assert!(remote_a.head_of(&on_a.id).is_some());
        assert!(remote_a.head_of(&on_b.id).is_none());
        assert!(remote_b.head_of(&on_b.id).is_some());
    }

    #[tokio::test]
    async fn test_unknown_remote() {
        let (store, _, _, router) = setup();
        let entity = perspective_on("nowhere").derive(&store.cid_config()).unwrap();
        let mutation = EveesMutation::of_new_perspective(NewPerspectiveData {
            perspective: entity,
            details: PerspectiveDetails::default(),
            links: None,
        });
        let err = router.update(mutation).await.unwrap_err();
        assert!(matches!(err, EveesError::RemoteNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_perspective_resolves_remote() {
        let (store, remote_a, _, router) = setup();
        let entity = perspective_on("remote-a").derive(&store.cid_config()).unwrap();
        let id = entity.id;
        store.store_entities(vec![entity.clone()]).await.unwrap();

        remote_a
            .update(EveesMutation::of_new_perspective(NewPerspectiveData {
                perspective: entity,
                details: PerspectiveDetails::with_head(store.cid_config().hash(b"head")),
                links: None,
            }))
            .await
            .unwrap();

        let result = router.get_perspective(&id).await.unwrap();
        assert_eq!(result.details.head_id, Some(store.cid_config().hash(b"head")));
    }
}
