//! Simple merge strategy: three-way merge of two commit histories.
//!
//! Merges the `from` perspective's history into `to`'s, creating a merged
//! commit when the two sides diverged. Idempotence contracts: merging a
//! perspective into itself, or merging nothing, never produces a write.

use crate::ancestor::{find_most_recent_common_ancestor, latest_non_fork};
use crate::config::MergeConfig;
use crate::links::{merge_links, LinkConflict};
use async_trait::async_trait;
use evees_cas::{Cid, Entity};
use evees_client::Evees;
use evees_core::{now_timestamp, CommitBuilder, LinkMerger, Result, UpdateRequest};
use futures::try_join;
use parking_lot::Mutex;

/// Link merger used when no strategy-level translation applies: a plain
/// positional merge, recording conflicts for the caller.
#[derive(Default)]
pub struct PlainLinkMerger {
    conflicts: Mutex<Vec<LinkConflict>>,
}

impl PlainLinkMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conflicts recorded so far, draining the log.
    pub fn take_conflicts(&self) -> Vec<LinkConflict> {
        std::mem::take(&mut self.conflicts.lock())
    }
}

#[async_trait]
impl LinkMerger for PlainLinkMerger {
    async fn merge_links(
        &self,
        original: &[String],
        modifications: &[Vec<String>],
    ) -> Result<Vec<String>> {
        let (merged, conflicts) = merge_links(original, modifications);
        for conflict in &conflicts {
            tracing::warn!(
                index = conflict.index,
                chosen = %conflict.chosen,
                "link merge disagreement, later modification kept the index"
            );
        }
        self.conflicts.lock().extend(conflicts);
        Ok(merged)
    }
}

/// Three-way merge of two perspectives' histories.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleMerge;

impl SimpleMerge {
    pub fn new() -> Self {
        SimpleMerge
    }

    /// Merge `from` into `to`, staging a single head update on success.
    /// Returns `to` unchanged when there was nothing to write.
    pub async fn merge_perspectives(
        &self,
        to_id: &Cid,
        from_id: &Cid,
        evees: &Evees,
        config: &MergeConfig,
    ) -> Result<Cid> {
        let links = PlainLinkMerger::new();
        self.merge_perspectives_with(to_id, from_id, evees, config, &links)
            .await
    }

    /// Same as [`merge_perspectives`](Self::merge_perspectives) but with a
    /// caller-supplied link merger (the recursive strategy translates links
    /// to contexts around the positional merge).
    pub async fn merge_perspectives_with(
        &self,
        to_id: &Cid,
        from_id: &Cid,
        evees: &Evees,
        _config: &MergeConfig,
        links: &dyn LinkMerger,
    ) -> Result<Cid> {
        let (to_result, from_result) = try_join!(
            evees.client().get_perspective(to_id),
            evees.client().get_perspective(from_id)
        )?;
        let to_head = to_result.details.head_id;
        let from_head = from_result.details.head_id;

        let new_head = match from_head {
            // Nothing to merge.
            None => to_head,
            Some(from_head) => Some(self.merge_commits(to_head, from_head, evees, links).await?),
        };

        if new_head == to_head {
            // Idempotence: no write for a no-op merge.
            return Ok(*to_id);
        }
        let Some(new_head) = new_head else {
            return Ok(*to_id);
        };

        tracing::debug!(
            to = %to_id.short(),
            from = %from_id.short(),
            head = %new_head.short(),
            "staging merged head"
        );
        evees
            .update_head(UpdateRequest {
                perspective_id: *to_id,
                new_head_id: new_head,
                old_head_id: to_head,
                from_perspective_id: Some(*from_id),
            })
            .await?;
        Ok(*to_id)
    }

    /// Merge two commit histories into one commit id.
    pub async fn merge_commits(
        &self,
        to_commit: Option<Cid>,
        from_commit: Cid,
        evees: &Evees,
        links: &dyn LinkMerger,
    ) -> Result<Cid> {
        let client = evees.client();

        if to_commit == Some(from_commit) {
            return Ok(from_commit);
        }

        // Fork stubs are transparent to the ancestor search: it runs over
        // the forked-to commits.
        let to_resolved = match to_commit {
            Some(commit) => Some(latest_non_fork(client.as_ref(), &commit).await?),
            None => None,
        };
        let from_resolved = latest_non_fork(client.as_ref(), &from_commit).await?;

        let ancestor = match to_resolved {
            Some(to_resolved) if to_resolved == from_resolved => Some(to_resolved),
            Some(to_resolved) => {
                find_most_recent_common_ancestor(client.as_ref(), &to_resolved, &from_resolved)
                    .await?
            }
            // Degenerate case: "to" has no history yet.
            None => Some(from_resolved),
        };

        // Data is read at the input commits, not the resolved ones: a fork
        // stub carries its own data when nested perspectives were forked
        // along with it, and that data must flow through the merge.
        let commits: Vec<Cid> = to_commit.into_iter().chain([from_commit]).collect();
        let mut datas: Vec<Entity> = Vec::with_capacity(commits.len());
        for commit in &commits {
            datas.push(evees.data_of_commit(commit).await?);
        }
        // No shared ancestor: diff against the to-side so the merge adopts
        // nothing but the from-side's changes.
        let ancestor_data = match ancestor {
            Some(ancestor) => evees.data_of_commit(&ancestor).await?,
            None => datas[0].clone(),
        };

        let behavior = evees.registry().merge_behavior(&datas[0].object, datas[0].id)?;
        let objects: Vec<serde_json::Value> =
            datas.iter().map(|data| data.object.clone()).collect();
        let merged = behavior
            .merge(Some(&ancestor_data.object), &objects, links)
            .await?;

        let merged_entity = client.hash_entity(&merged)?;
        if merged_entity.id == datas[0].id {
            // The merge changed nothing relative to the first input.
            return Ok(to_commit.unwrap_or(from_resolved));
        }

        client.store_entities(vec![merged_entity.clone()]).await?;
        let message = format!(
            "merge of {}",
            commits
                .iter()
                .map(|commit| commit.short())
                .collect::<Vec<_>>()
                .join(" and ")
        );
        let commit = CommitBuilder::new()
            .with_creator(evees.user_id())
            .with_timestamp(now_timestamp())
            .with_message(message)
            .with_parents(commits)
            .with_data(merged_entity.id)
            .build();
        evees.store_commit(&commit).await
    }
}
