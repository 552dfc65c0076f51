//! # evees-client
//!
//! Layered mutation-buffering client chain for the Evees versioning engine.
//!
//! Three layers implement the same `Client` contract, each wrapping a base
//! (decorator composition, no inheritance):
//!
//! 1. `RouterClient`: dispatches by a perspective's declared remote
//! 2. `CacheClient`: read-through cache of details and entities
//! 3. `OnMemoryClient`: staging overlay with diff/flush semantics
//!
//! The merge engine talks to the outermost layer and accumulates all of its
//! resulting updates there until an explicit `flush`. Concurrency is
//! cooperative async on one logical runtime; the staging maps sit behind
//! locks only to satisfy `Send + Sync`, not because two merges over
//! overlapping trees are supported concurrently. They are not; callers
//! serialize per root perspective.

mod cache;
mod client;
mod evees;
mod memory;
mod remote;
mod router;

pub use cache::CacheClient;
pub use client::Client;
pub use evees::Evees;
pub use memory::OnMemoryClient;
pub use remote::{MemoryRemote, Remote};
pub use router::RouterClient;
