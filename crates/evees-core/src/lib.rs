//! # evees-core
//!
//! Data model and behavior registry for the Evees versioning engine.
//!
//! The model follows the git analogy: a `Perspective` is a branch whose
//! immutable structural object is content-addressed, while its mutable
//! `head` points at a `Commit`; commits form a DAG over immutable data
//! objects. Pending changes travel between client layers as an
//! `EveesMutation`.
//!
//! Per-type merge logic is pluggable through the `BehaviorRegistry`: an
//! object is classified structurally once, then dispatched to its
//! `Mergeable` / `HasChildren` behaviors.

pub mod behavior;
pub mod commit;
pub mod error;
pub mod mutation;
pub mod node;
pub mod perspective;

// Re-export main types for convenience
pub use behavior::{
    merge_result, BehaviorRegistry, Behaviors, HasChildren, LinkMerger, Mergeable, Recognizer,
    TypeTag,
};
pub use commit::{Commit, CommitBuilder};
pub use error::{EveesError, Result};
pub use mutation::{EveesMutation, NewPerspectiveData, PerspectiveLinks, UpdateRequest};
pub use node::{default_registry, node_recognizer, node_type_tag, NodeBehavior};
pub use perspective::{
    now_timestamp, Perspective, PerspectiveDetails, PerspectiveGetResult, Slice, SlicePerspective,
};
