//! Merge configuration.

use evees_cas::Cid;

/// What to do with a sub-perspective that only exists on the "from" side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FromOnlyPolicy {
    /// Keep the from-side perspective id as-is.
    Adopt,
    /// Fork it under the configured owner remote and parent.
    Fork,
}

/// Options threaded through a merge invocation.
#[derive(Clone, Debug, Default)]
pub struct MergeConfig {
    /// Fork from-only sub-perspectives instead of adopting them.
    pub force_owner: bool,
    /// Remote forks are created on; defaults to the source's remote.
    pub owner_remote: Option<String>,
    /// The perspective the current merge node hangs under. Propagated
    /// downward during recursion.
    pub parent_id: Option<Cid>,
}

impl MergeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force_owner(mut self, force_owner: bool) -> Self {
        self.force_owner = force_owner;
        self
    }

    pub fn with_owner_remote(mut self, remote: impl Into<String>) -> Self {
        self.owner_remote = Some(remote.into());
        self
    }

    pub fn with_parent(mut self, parent_id: Cid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// The pluggable from-only resolution policy.
    pub fn from_only_policy(&self) -> FromOnlyPolicy {
        if self.force_owner {
            FromOnlyPolicy::Fork
        } else {
            FromOnlyPolicy::Adopt
        }
    }
}
