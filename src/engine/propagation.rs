//! Volume propagation planning.
//!
//! Turns one order (or its reversal) into the exact set of counter deltas:
//! the origin node's own volume plus, for every ancestor, the side bucket
//! facing the origin. Planning is pure; the repository applies a plan inside
//! a single transaction so either every counter moves or none do.

use crate::domain::{Decimal, NodeId, Slot};

/// One ancestor on the path from a node to the root, with the side of that
/// ancestor the path descends into. Chains are ordered nearest first
/// (parent, grandparent, .., root).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AncestorStep {
    pub node_id: NodeId,
    pub side: Slot,
}

/// Which counter of a node an update touches. `total_volume` always moves by
/// the same delta alongside the named bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeBucket {
    Own,
    Side(Slot),
}

/// A single counter delta against one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeUpdate {
    pub node_id: NodeId,
    pub bucket: VolumeBucket,
    pub delta: Decimal,
}

/// Plan the counter updates for `amount` of volume originating at `origin`.
///
/// `chain` is the origin's ancestor chain, nearest first. The plan comes back
/// root first, so plans for different origins touch shared ancestors in the
/// same order. The origin's own counter moves only for `own_purchase`
/// volume; ancestors are credited either way. A zero amount yields an empty
/// plan; a negative amount is a reversal and drives the same counters back
/// down.
pub fn plan_propagation(
    origin: NodeId,
    chain: &[AncestorStep],
    amount: Decimal,
    own_purchase: bool,
) -> Vec<VolumeUpdate> {
    if amount.is_zero() {
        return Vec::new();
    }

    let mut plan = Vec::with_capacity(chain.len() + 1);
    for step in chain.iter().rev() {
        plan.push(VolumeUpdate {
            node_id: step.node_id,
            bucket: VolumeBucket::Side(step.side),
            delta: amount,
        });
    }
    if own_purchase {
        plan.push(VolumeUpdate {
            node_id: origin,
            bucket: VolumeBucket::Own,
            delta: amount,
        });
    }
    plan
}
