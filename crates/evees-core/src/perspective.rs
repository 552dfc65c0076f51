//! Perspectives and their mutable details.
//!
//! A perspective is a named, content-addressed pointer-root, like a git
//! branch: the structural object is immutable once hashed, while its `head`
//! (a commit id) is tracked externally by a remote and moved through
//! `update_perspective`.

use evees_cas::{derive_typed, CasError, CidConfig, Entity};
use evees_cas::Cid;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// The immutable structural object of a perspective.
///
/// Identified by its content hash. The `context` groups perspectives that
/// represent "the same" logical branch-point across independent forks: ids
/// differ per creator and timestamp, context stays stable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Perspective {
    pub remote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub creator_id: String,
    pub context: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Perspective {
    /// Structural recognizer: a perspective is an object carrying `remote`,
    /// `context` and `creatorId` fields. No type tag is stored.
    pub fn matches(value: &Value) -> bool {
        value.get("remote").map_or(false, Value::is_string)
            && value.get("context").map_or(false, Value::is_string)
            && value.get("creatorId").map_or(false, Value::is_string)
    }

    /// Hash this perspective into a content-addressed entity.
    pub fn derive(&self, config: &CidConfig) -> Result<Entity, CasError> {
        derive_typed(self, config)
    }
}

/// The mutable association `perspective id -> head commit id`, owned by a
/// remote or client layer. Not content-addressed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_id: Option<Cid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_update: Option<bool>,
}

impl PerspectiveDetails {
    pub fn with_head(head_id: Cid) -> Self {
        PerspectiveDetails {
            head_id: Some(head_id),
            can_update: None,
        }
    }
}

/// A batch of pre-fetched related state returned alongside a primary read,
/// so layered clients can warm their caches in one round trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub entities: Vec<Entity>,
    pub perspectives: Vec<SlicePerspective>,
}

/// A perspective's details carried inside a [`Slice`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlicePerspective {
    pub id: Cid,
    pub details: PerspectiveDetails,
}

/// Result of reading a perspective through a client or remote.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveGetResult {
    pub details: PerspectiveDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice: Option<Slice>,
}

impl PerspectiveGetResult {
    pub fn of(details: PerspectiveDetails) -> Self {
        PerspectiveGetResult {
            details,
            slice: None,
        }
    }
}

/// Milliseconds since the unix epoch, for perspective and commit timestamps.
pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
