//! Merge strategies over perspective histories.
//!
//! Two strategies build on a shared positional link merge:
//!
//! - [`SimpleMerge`] performs a three-way merge of two commit histories
//!   against their most recent common ancestor, staging one head update.
//! - [`RecursiveContextMerge`] extends it to whole trees of nested
//!   perspectives, matching sub-perspectives across forks by their stable
//!   `context` and merging matched pairs bottom-up.
//!
//! Merges never fail on concurrent edits. When two sides claim the same
//! link position the later modification wins and the disagreement is
//! reported as a [`LinkConflict`].

pub mod ancestor;
pub mod config;
pub mod links;
pub mod recursive;
pub mod simple;

pub use ancestor::{find_most_recent_common_ancestor, is_ancestor_of, latest_non_fork};
pub use config::{FromOnlyPolicy, MergeConfig};
pub use links::{merge_links, LinkConflict};
pub use recursive::RecursiveContextMerge;
pub use simple::{PlainLinkMerger, SimpleMerge};
