//! # evees-cas
//!
//! Content-addressed identity for the Evees versioning engine.
//!
//! This crate provides:
//! - `Cid`: SHA-256 content identifiers with hex text form
//! - Canonical JSON encoding, so the same object always hashes the same
//! - `Entity`: an object paired with its CID, with integrity verification
//! - `CasStore`: the async storage contract, plus an in-memory store
//!
//! Content addressing is the correctness foundation of the merge engine:
//! commits cannot form cycles (a commit cannot reference its own
//! not-yet-computed hash), and identical merged data is detected by hash
//! equality rather than deep comparison.

mod cid;
mod entity;
mod store;

pub use cid::{Cid, CidConfig, CidEncoding, HashAlgorithm};
pub use entity::{canonical_bytes, derive_entity, derive_typed, Entity};
pub use store::{CasError, CasStore, MemoryCas, Result};
