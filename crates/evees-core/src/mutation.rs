//! Pending changes exchanged between client layers.
//!
//! An [`EveesMutation`] is the unit of change: staged perspective creations,
//! head updates and deletions, accumulated by the overlay client until an
//! explicit flush.

use crate::perspective::PerspectiveDetails;
use evees_cas::{Cid, Entity};
use serde::{Deserialize, Serialize};

/// A pending head change for one perspective.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub perspective_id: Cid,
    pub new_head_id: Cid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_head_id: Option<Cid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_perspective_id: Option<Cid>,
}

/// Structural links of a newly created perspective.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Cid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Cid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links_to: Option<Vec<Cid>>,
}

/// A pending perspective creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewPerspectiveData {
    pub perspective: Entity,
    pub details: PerspectiveDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<PerspectiveLinks>,
}

/// The unit of change exchanged between client layers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EveesMutation {
    pub new_perspectives: Vec<NewPerspectiveData>,
    pub updates: Vec<UpdateRequest>,
    pub deleted_perspectives: Vec<Cid>,
}

impl EveesMutation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mutation carrying a single head update.
    pub fn of_update(update: UpdateRequest) -> Self {
        EveesMutation {
            updates: vec![update],
            ..Default::default()
        }
    }

    /// A mutation carrying a single new perspective.
    pub fn of_new_perspective(new_perspective: NewPerspectiveData) -> Self {
        EveesMutation {
            new_perspectives: vec![new_perspective],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_perspectives.is_empty()
            && self.updates.is_empty()
            && self.deleted_perspectives.is_empty()
    }

    /// Append another mutation's changes onto this one.
    pub fn append(&mut self, other: EveesMutation) {
        self.new_perspectives.extend(other.new_perspectives);
        self.updates.extend(other.updates);
        self.deleted_perspectives.extend(other.deleted_perspectives);
    }
}
