//! Evees: content-addressed perspectives with automatic merge.
//!
//! A perspective is a branch-like pointer into a DAG of immutable,
//! content-addressed commits. Perspectives fork cheaply, diverge, and merge
//! back through a recursive three-way merge keyed on a stable `context`
//! rather than on ids. All writes are staged in a layered client chain and
//! flushed atomically.
//!
//! This crate re-exports the workspace members:
//!
//! - [`evees_cas`]: entity hashing and the CAS store contract.
//! - [`evees_core`]: perspectives, commits, mutations, behavior registry.
//! - [`evees_client`]: the router/cache/on-memory client chain.
//! - [`evees_merge`]: the simple and recursive-context merge strategies.

pub use evees_cas as cas;
pub use evees_client as client;
pub use evees_core as core;
pub use evees_merge as merge;

pub use evees_cas::{CasStore, Cid, CidConfig, Entity, MemoryCas};
pub use evees_client::{
    CacheClient, Client, Evees, MemoryRemote, OnMemoryClient, Remote, RouterClient,
};
pub use evees_core::{
    default_registry, BehaviorRegistry, Commit, CommitBuilder, EveesError, EveesMutation,
    NewPerspectiveData, Perspective, PerspectiveDetails, Result, UpdateRequest,
};
pub use evees_merge::{MergeConfig, RecursiveContextMerge, SimpleMerge};
