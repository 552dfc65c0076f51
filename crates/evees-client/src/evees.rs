//! The `Evees` service facade.
//!
//! Bundles the client chain, the behavior registry and the calling user so
//! the merge strategies receive every collaborator explicitly. Also hosts
//! the fork helpers: forking a perspective creates a new perspective with
//! the same context whose initial head is a fork commit carrying a
//! `forking` back-reference to the source head.

use crate::client::Client;
use evees_cas::{Cid, Entity};
use futures::future::{BoxFuture, FutureExt};
use evees_core::{
    now_timestamp, BehaviorRegistry, Commit, CommitBuilder, EveesMutation, NewPerspectiveData,
    Perspective, PerspectiveDetails, PerspectiveLinks, Result, UpdateRequest,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Explicitly wired service handle used by the merge strategies.
#[derive(Clone)]
pub struct Evees {
    client: Arc<dyn Client>,
    registry: Arc<BehaviorRegistry>,
    user_id: String,
}

impl Evees {
    pub fn new(
        client: Arc<dyn Client>,
        registry: Arc<BehaviorRegistry>,
        user_id: impl Into<String>,
    ) -> Self {
        Evees {
            client,
            registry,
            user_id: user_id.into(),
        }
    }

    pub fn client(&self) -> &Arc<dyn Client> {
        &self.client
    }

    pub fn registry(&self) -> &Arc<BehaviorRegistry> {
        &self.registry
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Decode the perspective structural object.
    pub async fn perspective(&self, perspective_id: &Cid) -> Result<Perspective> {
        let entity = self.client.get_entity(perspective_id).await?;
        Ok(entity.decode()?)
    }

    /// Decode a commit.
    pub async fn commit(&self, commit_id: &Cid) -> Result<Commit> {
        let entity = self.client.get_entity(commit_id).await?;
        Ok(entity.decode()?)
    }

    /// The current head commit id of a perspective, if any.
    pub async fn head_of(&self, perspective_id: &Cid) -> Result<Option<Cid>> {
        let result = self.client.get_perspective(perspective_id).await?;
        Ok(result.details.head_id)
    }

    /// The data entity a commit points at.
    pub async fn data_of_commit(&self, commit_id: &Cid) -> Result<Entity> {
        let commit = self.commit(commit_id).await?;
        Ok(self.client.get_entity(&commit.data_id).await?)
    }

    /// The data entity at a perspective's head, if it has one.
    pub async fn perspective_data(&self, perspective_id: &Cid) -> Result<Option<Entity>> {
        match self.head_of(perspective_id).await? {
            Some(head) => Ok(Some(self.data_of_commit(&head).await?)),
            None => Ok(None),
        }
    }

    /// Ordered child links of a data object, per its registered behavior.
    /// Empty when the type has no children behavior.
    pub fn children_of(&self, data: &serde_json::Value) -> Vec<String> {
        self.registry
            .children_behavior(data)
            .map(|behavior| behavior.children_links(data))
            .unwrap_or_default()
    }

    /// Store a commit built over existing data, returning its id.
    pub async fn store_commit(&self, commit: &Commit) -> Result<Cid> {
        let value = serde_json::to_value(commit)?;
        let entity = self.client.hash_entity(&value)?;
        let id = entity.id;
        self.client.store_entities(vec![entity]).await?;
        Ok(id)
    }

    /// Create a brand-new perspective over `context` on `remote`, with an
    /// optional initial head, staged through the client.
    pub async fn create_perspective(
        &self,
        context: impl Into<String>,
        remote: impl Into<String>,
        head_id: Option<Cid>,
        links: Option<PerspectiveLinks>,
    ) -> Result<Cid> {
        let perspective = Perspective {
            remote: remote.into(),
            path: None,
            creator_id: self.user_id.clone(),
            context: context.into(),
            timestamp: now_timestamp(),
            meta: None,
        };
        let entity = perspective.derive(&self.client.cid_config())?;
        let id = entity.id;
        self.client.store_entities(vec![entity.clone()]).await?;
        self.client
            .new_perspective(NewPerspectiveData {
                perspective: entity,
                details: PerspectiveDetails {
                    head_id,
                    can_update: None,
                },
                links,
            })
            .await?;
        Ok(id)
    }

    /// Fork a commit: empty parents, `forking` back-reference. Nested
    /// perspectives among the data's children fork too, so the forked tree
    /// is fully independent while sharing every context with its source.
    pub async fn fork_commit(&self, commit_id: &Cid) -> Result<Cid> {
        let forked = RwLock::new(HashMap::new());
        self.fork_commit_on(commit_id, None, &forked).await
    }

    fn fork_commit_on<'a>(
        &'a self,
        commit_id: &'a Cid,
        owner_remote: Option<&'a str>,
        forked: &'a RwLock<HashMap<Cid, Cid>>,
    ) -> BoxFuture<'a, Result<Cid>> {
        async move {
            let source = self.commit(commit_id).await?;
            let data = self.client.get_entity(&source.data_id).await?;

            let links = self.children_of(&data.object);
            let mut forked_links = links.clone();
            let mut any_forked = false;
            for (index, link) in links.iter().enumerate() {
                let Some(child_id) = Cid::from_hex(link) else {
                    continue;
                };
                let found = self.client.get_entities(&[child_id]).await?;
                match found.first() {
                    Some(entity) if Perspective::matches(&entity.object) => {
                        let forked_child = self
                            .fork_perspective_on(&child_id, owner_remote, None, forked)
                            .await?;
                        forked_links[index] = forked_child.to_hex();
                        any_forked = true;
                    }
                    // Plain data links stay shared between the trees.
                    _ => {}
                }
            }

            let data_id = if any_forked {
                let object = match self.registry.children_behavior(&data.object) {
                    Some(behavior) => behavior.replace_children_links(&data.object, forked_links),
                    None => data.object.clone(),
                };
                let entity = self.client.hash_entity(&object)?;
                let id = entity.id;
                self.client.store_entities(vec![entity]).await?;
                id
            } else {
                source.data_id
            };

            let fork = CommitBuilder::new()
                .with_creator(self.user_id.clone())
                .with_timestamp(now_timestamp())
                .with_message(format!("fork of {}", commit_id.short()))
                .with_data(data_id)
                .with_forking(*commit_id)
                .build();
            self.store_commit(&fork).await
        }
        .boxed()
    }

    /// Fork a perspective under a new owner remote and parent. The new
    /// perspective keeps the source's context so later merges match them,
    /// and nested perspectives fork along with it.
    pub fn fork_perspective<'a>(
        &'a self,
        perspective_id: &'a Cid,
        owner_remote: Option<&'a str>,
        parent_id: Option<&'a Cid>,
    ) -> BoxFuture<'a, Result<Cid>> {
        async move {
            let forked = RwLock::new(HashMap::new());
            self.fork_perspective_on(perspective_id, owner_remote, parent_id, &forked)
                .await
        }
        .boxed()
    }

    fn fork_perspective_on<'a>(
        &'a self,
        perspective_id: &'a Cid,
        owner_remote: Option<&'a str>,
        parent_id: Option<&'a Cid>,
        forked: &'a RwLock<HashMap<Cid, Cid>>,
    ) -> BoxFuture<'a, Result<Cid>> {
        async move {
            // Heads are mutable, so a descendant's data can legally link
            // back to an ancestor perspective. A perspective already forked
            // in this walk maps to its fork instead of recursing again.
            if let Some(existing) = forked.read().get(perspective_id) {
                return Ok(*existing);
            }
            let source = self.perspective(perspective_id).await?;
            let remote = owner_remote.unwrap_or(&source.remote).to_string();
            let perspective = Perspective {
                remote: remote.clone(),
                path: None,
                creator_id: self.user_id.clone(),
                context: source.context.clone(),
                timestamp: now_timestamp(),
                meta: None,
            };
            let entity = perspective.derive(&self.client.cid_config())?;
            let fork_id = entity.id;
            // Registered before the head forks, so cyclic links inside the
            // source tree close onto the forked counterpart.
            forked.write().insert(*perspective_id, fork_id);

            let forked_head = match self.head_of(perspective_id).await? {
                Some(head) => Some(self.fork_commit_on(&head, Some(&remote), forked).await?),
                None => None,
            };
            let links = parent_id.map(|parent| PerspectiveLinks {
                parent_id: Some(*parent),
                children: None,
                links_to: None,
            });
            tracing::debug!(source = %perspective_id.short(), remote = %remote, "forking perspective");
            self.client.store_entities(vec![entity.clone()]).await?;
            self.client
                .new_perspective(NewPerspectiveData {
                    perspective: entity,
                    details: PerspectiveDetails {
                        head_id: forked_head,
                        can_update: None,
                    },
                    links,
                })
                .await?;
            Ok(fork_id)
        }
        .boxed()
    }

    /// Stage a single head update.
    pub async fn update_head(&self, update: UpdateRequest) -> Result<()> {
        self.client.update(EveesMutation::of_update(update)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::OnMemoryClient;
    use crate::remote::MemoryRemote;
    use crate::router::RouterClient;
    use evees_cas::MemoryCas;
    use evees_core::default_registry;
    use serde_json::json;

    fn setup() -> Evees {
        let store = Arc::new(MemoryCas::new());
        let remote = Arc::new(MemoryRemote::new("memory", "alice", store.clone()));
        let router = Arc::new(RouterClient::new(vec![remote], store));
        let overlay = Arc::new(OnMemoryClient::new(router));
        Evees::new(overlay, Arc::new(default_registry()), "alice")
    }

    #[tokio::test]
    async fn test_create_perspective_with_head() {
        let evees = setup();
        let data = evees
            .client()
            .store_objects(vec![json!({"text": "hello", "links": []})])
            .await
            .unwrap();
        let commit = CommitBuilder::new()
            .with_creator("alice")
            .with_timestamp(1)
            .with_data(data[0].id)
            .build();
        let head = evees.store_commit(&commit).await.unwrap();

        let id = evees
            .create_perspective("root", "memory", Some(head), None)
            .await
            .unwrap();
        assert_eq!(evees.head_of(&id).await.unwrap(), Some(head));
        let read = evees.perspective_data(&id).await.unwrap().unwrap();
        assert_eq!(read.object["text"], "hello");
    }

    #[tokio::test]
    async fn test_fork_keeps_context_and_links_back() {
        let evees = setup();
        let data = evees
            .client()
            .store_objects(vec![json!({"text": "doc", "links": []})])
            .await
            .unwrap();
        let commit = CommitBuilder::new()
            .with_creator("alice")
            .with_timestamp(1)
            .with_data(data[0].id)
            .build();
        let head = evees.store_commit(&commit).await.unwrap();
        let source = evees
            .create_perspective("page1", "memory", Some(head), None)
            .await
            .unwrap();

        let fork = evees
            .fork_perspective(&source, None, None)
            .await
            .unwrap();
        assert_ne!(fork, source);

        let forked = evees.perspective(&fork).await.unwrap();
        assert_eq!(forked.context, "page1");

        let fork_head = evees.head_of(&fork).await.unwrap().unwrap();
        let fork_commit = evees.commit(&fork_head).await.unwrap();
        assert_eq!(fork_commit.forking, Some(head));
        assert_eq!(fork_commit.data_id, data[0].id);
    }

    async fn node_perspective(
        evees: &Evees,
        context: &str,
        text: &str,
        links: Vec<String>,
    ) -> Cid {
        let data = evees
            .client()
            .store_objects(vec![json!({ "text": text, "links": links })])
            .await
            .unwrap();
        let commit = CommitBuilder::new()
            .with_creator("alice")
            .with_timestamp(1)
            .with_data(data[0].id)
            .build();
        let head = evees.store_commit(&commit).await.unwrap();
        evees
            .create_perspective(context, "memory", Some(head), None)
            .await
            .unwrap()
    }

    async fn commit_on(evees: &Evees, perspective_id: &Cid, text: &str, links: Vec<String>) -> Cid {
        let data = evees
            .client()
            .store_objects(vec![json!({ "text": text, "links": links })])
            .await
            .unwrap();
        let old_head = evees.head_of(perspective_id).await.unwrap();
        let commit = CommitBuilder::new()
            .with_creator("alice")
            .with_timestamp(now_timestamp())
            .with_parents(old_head.into_iter().collect())
            .with_data(data[0].id)
            .build();
        let new_head = evees.store_commit(&commit).await.unwrap();
        evees
            .update_head(UpdateRequest {
                perspective_id: *perspective_id,
                new_head_id: new_head,
                old_head_id: old_head,
                from_perspective_id: None,
            })
            .await
            .unwrap();
        new_head
    }

    #[tokio::test]
    async fn test_fork_resolves_cyclic_children_to_the_forked_tree() {
        let evees = setup();
        let root = node_perspective(&evees, "root", "root", vec![]).await;
        let child = node_perspective(&evees, "page1", "child", vec![root.to_hex()]).await;
        commit_on(&evees, &root, "root", vec![child.to_hex()]).await;

        let fork = evees.fork_perspective(&root, None, None).await.unwrap();

        let fork_data = evees.perspective_data(&fork).await.unwrap().unwrap();
        let forked_child = Cid::from_hex(&evees.children_of(&fork_data.object)[0]).unwrap();
        assert_ne!(forked_child, child);

        // The child's back-link closes onto the forked root, not the source.
        let child_data = evees.perspective_data(&forked_child).await.unwrap().unwrap();
        let back = evees.children_of(&child_data.object);
        assert_eq!(back, vec![fork.to_hex()]);
    }

    #[tokio::test]
    async fn test_fork_perspective_forks_children() {
        let evees = setup();
        let child = node_perspective(&evees, "page1", "child", vec![]).await;
        let root = node_perspective(&evees, "root", "root", vec![child.to_hex()]).await;

        let fork = evees.fork_perspective(&root, None, None).await.unwrap();

        let fork_data = evees.perspective_data(&fork).await.unwrap().unwrap();
        let links = evees.children_of(&fork_data.object);
        assert_eq!(links.len(), 1);
        let forked_child = Cid::from_hex(&links[0]).unwrap();
        assert_ne!(forked_child, child);

        let forked = evees.perspective(&forked_child).await.unwrap();
        assert_eq!(forked.context, "page1");
    }
}
