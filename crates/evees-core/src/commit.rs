//! Commits: immutable, content-addressed history nodes.
//!
//! `parents_ids` forms a DAG; more than one parent only ever results from a
//! merge. `forking` optionally points at a commit this one supersedes, so a
//! merge can skip a fork stub to the latest non-fork commit.

use evees_cas::{derive_typed, CasError, Cid, CidConfig, Entity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable snapshot referencing parent commits and one data object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub creators_ids: Vec<String>,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub parents_ids: Vec<Cid>,
    pub data_id: Cid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forking: Option<Cid>,
}

impl Commit {
    /// Structural recognizer: a commit carries `dataId` and `parentsIds`.
    pub fn matches(value: &Value) -> bool {
        value.get("dataId").map_or(false, Value::is_string)
            && value.get("parentsIds").map_or(false, Value::is_array)
    }

    /// True for history roots.
    pub fn is_root(&self) -> bool {
        self.parents_ids.is_empty()
    }

    /// Hash this commit into a content-addressed entity.
    pub fn derive(&self, config: &CidConfig) -> Result<Entity, CasError> {
        derive_typed(self, config)
    }
}

/// Builder for commits.
#[derive(Clone, Debug, Default)]
pub struct CommitBuilder {
    creators_ids: Vec<String>,
    timestamp: u64,
    message: Option<String>,
    parents_ids: Vec<Cid>,
    data_id: Option<Cid>,
    forking: Option<Cid>,
}

impl CommitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creators_ids.push(creator.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_parents(mut self, parents: Vec<Cid>) -> Self {
        self.parents_ids = parents;
        self
    }

    pub fn with_parent(mut self, parent: Cid) -> Self {
        self.parents_ids.push(parent);
        self
    }

    pub fn with_data(mut self, data_id: Cid) -> Self {
        self.data_id = Some(data_id);
        self
    }

    pub fn with_forking(mut self, forking: Cid) -> Self {
        self.forking = Some(forking);
        self
    }

    /// Build the commit. Panics if no data id was set; every commit must
    /// reference a data object.
    pub fn build(self) -> Commit {
        Commit {
            creators_ids: self.creators_ids,
            timestamp: self.timestamp,
            message: self.message,
            parents_ids: self.parents_ids,
            data_id: self.data_id.expect("commit requires a data id"),
            forking: self.forking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data_cid(label: &[u8]) -> Cid {
        CidConfig::default().hash(label)
    }

    #[test]
    fn test_commit_id_deterministic() {
        let commit = CommitBuilder::new()
            .with_creator("alice")
            .with_timestamp(1)
            .with_data(data_cid(b"data"))
            .build();
        let config = CidConfig::default();
        assert_eq!(
            commit.derive(&config).unwrap().id,
            commit.derive(&config).unwrap().id
        );
    }

    #[test]
    fn test_id_changes_with_parents() {
        let config = CidConfig::default();
        let root = CommitBuilder::new()
            .with_creator("alice")
            .with_timestamp(1)
            .with_data(data_cid(b"data"))
            .build();
        let root_id = root.derive(&config).unwrap().id;

        let child = CommitBuilder::new()
            .with_creator("alice")
            .with_timestamp(2)
            .with_parent(root_id)
            .with_data(data_cid(b"data"))
            .build();
        assert_ne!(root_id, child.derive(&config).unwrap().id);
        assert!(root.is_root());
        assert!(!child.is_root());
    }

    #[test]
    fn test_structural_recognition() {
        let commit = CommitBuilder::new()
            .with_timestamp(1)
            .with_data(data_cid(b"d"))
            .build();
        let value = serde_json::to_value(&commit).unwrap();
        assert!(Commit::matches(&value));
        assert!(!Commit::matches(&json!({"remote": "r", "context": "c"})));
    }

    #[test]
    fn test_forking_field_roundtrip() {
        let target = data_cid(b"target");
        let commit = CommitBuilder::new()
            .with_timestamp(1)
            .with_data(data_cid(b"d"))
            .with_forking(target)
            .build();
        let value = serde_json::to_value(&commit).unwrap();
        let back: Commit = serde_json::from_value(value).unwrap();
        assert_eq!(back.forking, Some(target));
    }
}
