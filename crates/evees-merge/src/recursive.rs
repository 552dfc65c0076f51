//! Recursive-context merge strategy.
//!
//! Wraps the simple strategy to merge whole trees of nested perspectives.
//! Perspectives representing "the same" logical node across independent
//! forks have different ids but share a stable `context`; this strategy
//! translates perspective links to contexts before the positional link
//! merge, so matched sub-perspectives merge as one list entry, and resolves
//! each surviving context back to a concrete id afterwards (recursively
//! merging matched pairs bottom-up).
//!
//! Every top-level call builds a fresh [`MergeSession`]; the bookkeeping
//! maps never leak across unrelated merges.

use crate::config::{FromOnlyPolicy, MergeConfig};
use crate::links::merge_links;
use crate::simple::SimpleMerge;
use async_trait::async_trait;
use evees_cas::Cid;
use evees_client::Evees;
use evees_core::{LinkMerger, Perspective, Result};
use futures::future::{BoxFuture, FutureExt};
use futures::try_join;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Which perspective tree a discovered node belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Side {
    To,
    From,
}

/// The to/from perspectives registered for one context.
#[derive(Clone, Copy, Debug, Default)]
struct SideRefs {
    to: Option<Cid>,
    from: Option<Cid>,
}

/// Per-invocation bookkeeping, owned by one top-level merge call.
#[derive(Default)]
struct MergeSession {
    by_context: RwLock<HashMap<String, SideRefs>>,
    by_perspective: RwLock<HashMap<Cid, String>>,
    visited: RwLock<HashSet<(Side, Cid)>>,
    merging: RwLock<HashSet<(Cid, Cid)>>,
}

impl MergeSession {
    fn new() -> Self {
        Self::default()
    }

    /// True the first time a perspective is seen on a side. Heads are
    /// mutable, so a tree can link back to an ancestor; the walk stops
    /// where it has already been.
    fn mark_visited(&self, side: Side, perspective_id: Cid) -> bool {
        self.visited.write().insert((side, perspective_id))
    }

    /// True the first time a to/from pair enters the merge. A pair seen
    /// again (a cycle, or the same pair linked twice) keeps to's id, which
    /// the first entry already merges toward.
    fn begin_merge(&self, to_id: Cid, from_id: Cid) -> bool {
        self.merging.write().insert((to_id, from_id))
    }

    fn register(&self, context: &str, side: Side, perspective_id: Cid) {
        let mut by_context = self.by_context.write();
        let refs = by_context.entry(context.to_string()).or_default();
        // First registration wins within one tree.
        match side {
            Side::To => refs.to = refs.to.or(Some(perspective_id)),
            Side::From => refs.from = refs.from.or(Some(perspective_id)),
        }
        drop(by_context);
        self.by_perspective
            .write()
            .entry(perspective_id)
            .or_insert_with(|| context.to_string());
    }

    fn context_of(&self, perspective_id: &Cid) -> Option<String> {
        self.by_perspective.read().get(perspective_id).cloned()
    }

    fn sides(&self, context: &str) -> Option<SideRefs> {
        self.by_context.read().get(context).copied()
    }
}

/// Merge strategy that recursively reconciles nested perspectives by
/// context.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecursiveContextMerge;

impl RecursiveContextMerge {
    pub fn new() -> Self {
        RecursiveContextMerge
    }

    /// Merge the `from` perspective tree into `to`'s. All descendant
    /// updates are staged before the root's head update, so a `diff()`
    /// observing the root update sees the whole merge.
    pub async fn merge_perspectives(
        &self,
        to_id: &Cid,
        from_id: &Cid,
        evees: &Evees,
        config: &MergeConfig,
    ) -> Result<Cid> {
        let session = MergeSession::new();
        try_join!(
            self.read_perspective(*to_id, Side::To, evees, &session),
            self.read_perspective(*from_id, Side::From, evees, &session)
        )?;
        self.merge_with_session(*to_id, *from_id, evees, config.clone(), &session)
            .await
    }

    /// Discover a perspective tree, registering every nested perspective
    /// under its context.
    fn read_perspective<'a>(
        &'a self,
        perspective_id: Cid,
        side: Side,
        evees: &'a Evees,
        session: &'a MergeSession,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if !session.mark_visited(side, perspective_id) {
                return Ok(());
            }
            let perspective = evees.perspective(&perspective_id).await?;
            session.register(&perspective.context, side, perspective_id);

            let Some(data) = evees.perspective_data(&perspective_id).await? else {
                return Ok(());
            };
            for link in evees.children_of(&data.object) {
                let Some(child_id) = Cid::from_hex(&link) else {
                    continue;
                };
                // Only recurse into links that resolve to perspectives;
                // plain data links pass through merges untouched.
                let entities = evees.client().get_entities(&[child_id]).await?;
                match entities.first() {
                    Some(entity) if Perspective::matches(&entity.object) => {
                        self.read_perspective(child_id, side, evees, session)
                            .await?;
                    }
                    _ => {}
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn merge_with_session<'a>(
        &'a self,
        to_id: Cid,
        from_id: Cid,
        evees: &'a Evees,
        config: MergeConfig,
        session: &'a MergeSession,
    ) -> BoxFuture<'a, Result<Cid>> {
        async move {
            if !session.begin_merge(to_id, from_id) {
                return Ok(to_id);
            }
            let links = ContextLinkMerger {
                strategy: self,
                evees,
                config: config.clone(),
                session,
                to_id,
            };
            SimpleMerge::new()
                .merge_perspectives_with(&to_id, &from_id, evees, &config, &links)
                .await
        }
        .boxed()
    }

    /// Resolve a from-only context per the configured policy.
    async fn resolve_from_only(
        &self,
        from_sub: Cid,
        evees: &Evees,
        config: &MergeConfig,
        parent: Cid,
    ) -> Result<Cid> {
        match config.from_only_policy() {
            FromOnlyPolicy::Adopt => Ok(from_sub),
            FromOnlyPolicy::Fork => {
                evees
                    .fork_perspective(&from_sub, config.owner_remote.as_deref(), Some(&parent))
                    .await
            }
        }
    }
}

/// Link merger that runs the positional merge in context space and
/// recursively merges matched sub-perspectives while resolving back.
struct ContextLinkMerger<'a> {
    strategy: &'a RecursiveContextMerge,
    evees: &'a Evees,
    config: MergeConfig,
    session: &'a MergeSession,
    /// The to-side perspective of the node being merged; becomes the
    /// parent of every resolved child.
    to_id: Cid,
}

impl ContextLinkMerger<'_> {
    /// Perspective links become contexts; everything else passes through.
    fn to_contexts(&self, links: &[String]) -> Vec<String> {
        links
            .iter()
            .map(|link| {
                Cid::from_hex(link)
                    .and_then(|id| self.session.context_of(&id))
                    .unwrap_or_else(|| link.clone())
            })
            .collect()
    }
}

#[async_trait]
impl LinkMerger for ContextLinkMerger<'_> {
    async fn merge_links(
        &self,
        original: &[String],
        modifications: &[Vec<String>],
    ) -> Result<Vec<String>> {
        let original_contexts = self.to_contexts(original);
        let modification_contexts: Vec<Vec<String>> = modifications
            .iter()
            .map(|links| self.to_contexts(links))
            .collect();

        let (merged, conflicts) = merge_links(&original_contexts, &modification_contexts);
        for conflict in &conflicts {
            tracing::warn!(
                index = conflict.index,
                chosen = %conflict.chosen,
                "context link disagreement, later modification kept the index"
            );
        }

        let mut resolved = Vec::with_capacity(merged.len());
        for entry in merged {
            let Some(refs) = self.session.sides(&entry) else {
                // Not a discovered context: an opaque link, kept verbatim.
                resolved.push(entry);
                continue;
            };
            let child_config = self.config.clone().with_parent(self.to_id);
            let id = match (refs.to, refs.from) {
                (Some(to_sub), Some(from_sub)) => {
                    // Matched pair: merge from into to, keep to's id.
                    self.strategy
                        .merge_with_session(
                            to_sub,
                            from_sub,
                            self.evees,
                            child_config,
                            self.session,
                        )
                        .await?
                }
                (Some(to_sub), None) => to_sub,
                (None, Some(from_sub)) => {
                    self.strategy
                        .resolve_from_only(from_sub, self.evees, &child_config, self.to_id)
                        .await?
                }
                (None, None) => {
                    // Registered context with no sides cannot happen; keep
                    // the entry rather than dropping user data.
                    resolved.push(entry);
                    continue;
                }
            };
            resolved.push(id.to_hex());
        }
        Ok(resolved)
    }
}
