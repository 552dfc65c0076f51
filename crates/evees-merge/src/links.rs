//! Positional three-way merge of ordered link lists.
//!
//! Per-element rule: a link's fate is decided by a three-way presence merge
//! against the original list. Relative order uses the original index where
//! the link already existed; new links are inserted at the index they claim
//! in the modification that introduced them.
//!
//! When two modification lists introduce different new links at the same
//! index the disagreement is recorded as a [`LinkConflict`] and resolution
//! stays permissive: every surviving link is kept, and the later
//! modification's link takes the contested index. Revisit before relying on
//! this for adversarial inputs.

use evees_core::merge_result;
use std::collections::{HashMap, HashSet};

/// A recorded disagreement between modification lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkConflict {
    /// The contested insertion index.
    pub index: usize,
    /// Every new link that claimed the index, in modification order.
    pub options: Vec<String>,
    /// The link that ended up at the index (later modification wins).
    pub chosen: String,
}

/// Merge ordered link lists three-way against `original`.
///
/// Returns the merged list and any recorded conflicts. Deterministic: the
/// result depends only on the inputs and their order.
pub fn merge_links(
    original: &[String],
    modifications: &[Vec<String>],
) -> (Vec<String>, Vec<LinkConflict>) {
    let original_pos: HashMap<&String, usize> = original
        .iter()
        .enumerate()
        .map(|(index, link)| (link, index))
        .collect();

    // Union of links seen in any modification, first-seen order. Links every
    // modification removed never make it in.
    let mut seen: HashSet<&String> = HashSet::new();
    let mut union: Vec<&String> = Vec::new();
    for modification in modifications {
        for link in modification {
            if seen.insert(link) {
                union.push(link);
            }
        }
    }

    let mut kept_original: Vec<(usize, String)> = Vec::new();
    // (claimed index, modification index, link)
    let mut new_links: Vec<(usize, usize, String)> = Vec::new();

    for link in union {
        let originally_present = original_pos.contains_key(link);
        let presences: Vec<bool> = modifications
            .iter()
            .map(|modification| modification.contains(link))
            .collect();
        let keep = merge_result(Some(&originally_present), &presences).unwrap_or(false);
        if !keep {
            continue;
        }
        match original_pos.get(link) {
            Some(&index) => kept_original.push((index, link.clone())),
            None => {
                // The later modification's placement wins.
                let placed = modifications
                    .iter()
                    .enumerate()
                    .rev()
                    .find_map(|(mod_index, modification)| {
                        modification
                            .iter()
                            .position(|l| l == link)
                            .map(|index| (index, mod_index))
                    });
                if let Some((index, mod_index)) = placed {
                    new_links.push((index, mod_index, link.clone()));
                }
            }
        }
    }

    kept_original.sort_by_key(|(index, _)| *index);
    let mut merged: Vec<String> = kept_original.into_iter().map(|(_, link)| link).collect();

    // Record contested indices before insertion order hides them.
    let mut conflicts: Vec<LinkConflict> = Vec::new();
    let mut by_index: HashMap<usize, Vec<(usize, String)>> = HashMap::new();
    for (index, mod_index, link) in &new_links {
        by_index
            .entry(*index)
            .or_default()
            .push((*mod_index, link.clone()));
    }
    let mut contested: Vec<usize> = by_index
        .iter()
        .filter(|(_, claims)| {
            let distinct: HashSet<&String> = claims.iter().map(|(_, link)| link).collect();
            distinct.len() > 1
        })
        .map(|(index, _)| *index)
        .collect();
    contested.sort_unstable();
    for index in contested {
        let mut claims = by_index.remove(&index).unwrap_or_default();
        claims.sort_by_key(|(mod_index, _)| *mod_index);
        let chosen = claims.last().map(|(_, link)| link.clone()).unwrap_or_default();
        conflicts.push(LinkConflict {
            index,
            options: claims.into_iter().map(|(_, link)| link).collect(),
            chosen,
        });
    }

    // Insert in (modification, index) order so a later modification's link
    // lands exactly at its claimed index.
    new_links.sort_by_key(|(index, mod_index, _)| (*mod_index, *index));
    for (index, _, link) in new_links {
        let at = index.min(merged.len());
        merged.insert(at, link);
    }

    (merged, conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_append_on_one_side() {
        let (merged, conflicts) = merge_links(
            &links(&["x", "y"]),
            &[links(&["x", "y", "z"]), links(&["x", "y"])],
        );
        assert_eq!(merged, links(&["x", "y", "z"]));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_removal_on_one_side() {
        let (merged, _) = merge_links(
            &links(&["x", "y"]),
            &[links(&["x"]), links(&["x", "y"])],
        );
        assert_eq!(merged, links(&["x"]));
    }

    #[test]
    fn test_removed_by_everyone() {
        let (merged, _) = merge_links(&links(&["x", "y"]), &[links(&["x"]), links(&["x"])]);
        assert_eq!(merged, links(&["x"]));
    }

    #[test]
    fn test_both_add_same_link() {
        let (merged, conflicts) = merge_links(
            &links(&["x"]),
            &[links(&["x", "z"]), links(&["x", "z"])],
        );
        assert_eq!(merged, links(&["x", "z"]));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_both_add_different_links_recorded() {
        let (merged, conflicts) = merge_links(
            &links(&["x", "y"]),
            &[links(&["x", "y", "a"]), links(&["x", "y", "b"])],
        );
        // Permissive: both survive, later modification's link takes index 2.
        assert_eq!(merged, links(&["x", "y", "b", "a"]));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].index, 2);
        assert_eq!(conflicts[0].options, links(&["a", "b"]));
        assert_eq!(conflicts[0].chosen, "b");
    }

    #[test]
    fn test_insert_in_middle_preserves_order() {
        let (merged, _) = merge_links(
            &links(&["x", "y"]),
            &[links(&["x", "m", "y"]), links(&["x", "y"])],
        );
        assert_eq!(merged, links(&["x", "m", "y"]));
    }

    #[test]
    fn test_deterministic_across_runs() {
        let original = links(&["x"]);
        let mods = [links(&["x", "a"]), links(&["x", "b"])];
        let first = merge_links(&original, &mods);
        for _ in 0..10 {
            assert_eq!(merge_links(&original, &mods), first);
        }
    }

    #[test]
    fn test_empty_original() {
        let (merged, conflicts) =
            merge_links(&[], &[links(&["a", "b"]), links(&["a", "b"])]);
        assert_eq!(merged, links(&["a", "b"]));
        assert!(conflicts.is_empty());
    }
}
