//! Ancestor discovery over the commit DAG.
//!
//! Commits are content-addressed, so the parent graph is acyclic by
//! construction (a commit cannot reference its own not-yet-computed hash)
//! and every walk terminates.

use evees_cas::Cid;
use evees_client::Client;
use evees_core::{Commit, Result};
use std::collections::{HashSet, VecDeque};

async fn commit_of(client: &dyn Client, commit_id: &Cid) -> Result<Commit> {
    let entity = client.get_entity(commit_id).await?;
    Ok(entity.decode()?)
}

/// A commit's ancestry edges. Fork stubs carry no parents but do descend
/// from the commit they forked, so `forking` counts as an edge too.
fn ancestry_edges(commit: Commit) -> impl Iterator<Item = Cid> {
    commit.parents_ids.into_iter().chain(commit.forking)
}

/// Whether `candidate` appears anywhere in `commit_id`'s transitive parent
/// set. `candidate == commit_id` short-circuits true.
pub async fn is_ancestor_of(
    client: &dyn Client,
    candidate: &Cid,
    commit_id: &Cid,
) -> Result<bool> {
    if candidate == commit_id {
        return Ok(true);
    }
    let mut visited: HashSet<Cid> = HashSet::new();
    let mut frontier: VecDeque<Cid> = VecDeque::from([*commit_id]);
    while let Some(current) = frontier.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        let commit = commit_of(client, &current).await?;
        for parent in ancestry_edges(commit) {
            if parent == *candidate {
                return Ok(true);
            }
            frontier.push_back(parent);
        }
    }
    Ok(false)
}

/// The nearest commit reachable from both inputs, or `None` when the two
/// histories share no root (an independent-root merge).
///
/// Interleaved breadth-first walk: both frontiers expand one node per round,
/// so the first id seen from both sides is the closest shared ancestor.
pub async fn find_most_recent_common_ancestor(
    client: &dyn Client,
    a: &Cid,
    b: &Cid,
) -> Result<Option<Cid>> {
    let mut seen_a: HashSet<Cid> = HashSet::from([*a]);
    let mut seen_b: HashSet<Cid> = HashSet::from([*b]);
    let mut frontier_a: VecDeque<Cid> = VecDeque::from([*a]);
    let mut frontier_b: VecDeque<Cid> = VecDeque::from([*b]);

    while !frontier_a.is_empty() || !frontier_b.is_empty() {
        if let Some(current) = frontier_a.pop_front() {
            if seen_b.contains(&current) {
                return Ok(Some(current));
            }
            let commit = commit_of(client, &current).await?;
            for parent in ancestry_edges(commit) {
                if seen_a.insert(parent) {
                    frontier_a.push_back(parent);
                }
            }
        }
        if let Some(current) = frontier_b.pop_front() {
            if seen_a.contains(&current) {
                return Ok(Some(current));
            }
            let commit = commit_of(client, &current).await?;
            for parent in ancestry_edges(commit) {
                if seen_b.insert(parent) {
                    frontier_b.push_back(parent);
                }
            }
        }
    }
    Ok(None)
}

/// Follow `forking` pointers until absent: a fork stub is transparent to
/// merges, which operate on the commit it forked from.
pub async fn latest_non_fork(client: &dyn Client, commit_id: &Cid) -> Result<Cid> {
    let mut current = *commit_id;
    loop {
        let commit = commit_of(client, &current).await?;
        match commit.forking {
            Some(forked_from) => current = forked_from,
            None => return Ok(current),
        }
    }
}
