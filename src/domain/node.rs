//! Placement node: a member's slot in the binary tree.

use crate::domain::{Decimal, MemberId, NodeId, TimeMs};
use serde::{Deserialize, Serialize};

/// Which child slot of a parent a node occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Left,
    Right,
}

impl Slot {
    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Left => "left",
            Slot::Right => "right",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Slot::Left),
            "right" => Some(Slot::Right),
            _ => None,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member's position record in the placement tree.
///
/// Structure is append-only: once linked under a parent, a node is never
/// moved or removed, so parent/child references can be read without
/// structural locks. Volume counters are the only mutable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementNode {
    pub id: NodeId,
    pub member_id: MemberId,
    /// None only for the root.
    pub parent_id: Option<NodeId>,
    /// Slot under the parent; None only for the root.
    pub position: Option<Slot>,
    pub left_child_id: Option<NodeId>,
    pub right_child_id: Option<NodeId>,
    /// Depth from the root (root = 0).
    pub level: i64,
    /// Volume from the member's own purchases.
    pub own_volume: Decimal,
    /// Aggregated volume of the left subtree.
    pub left_volume: Decimal,
    /// Aggregated volume of the right subtree.
    pub right_volume: Decimal,
    /// `own_volume + left_volume + right_volume`, maintained on every update.
    pub total_volume: Decimal,
    pub created_at: TimeMs,
}

impl PlacementNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The child occupying `slot`, if any.
    pub fn child_in(&self, slot: Slot) -> Option<NodeId> {
        match slot {
            Slot::Left => self.left_child_id,
            Slot::Right => self.right_child_id,
        }
    }

    /// First open slot in left-before-right order, if the node is not full.
    pub fn open_slot(&self) -> Option<Slot> {
        if self.left_child_id.is_none() {
            Some(Slot::Left)
        } else if self.right_child_id.is_none() {
            Some(Slot::Right)
        } else {
            None
        }
    }

    /// Which side of this node `child` hangs on, if it is a direct child.
    pub fn side_of_child(&self, child: NodeId) -> Option<Slot> {
        if self.left_child_id == Some(child) {
            Some(Slot::Left)
        } else if self.right_child_id == Some(child) {
            Some(Slot::Right)
        } else {
            None
        }
    }

    /// Check the volume identity `total == own + left + right`.
    pub fn volumes_consistent(&self) -> bool {
        self.total_volume == self.own_volume + self.left_volume + self.right_volume
    }
}
