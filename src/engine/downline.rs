//! Iterative downline traversal.
//!
//! Everything here walks the tree with an explicit frontier and batched
//! child queries. No recursion anywhere, so arbitrarily deep (or wide)
//! networks cannot blow the stack, and a walker can be dropped mid-traversal
//! having only paid for the batches it actually produced.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::db::Repository;
use crate::domain::{Decimal, MemberId, NodeId, PlacementNode, Slot};
use crate::error::CoreError;

/// Lazy breadth-first walker over a node's descendants.
///
/// Each `next_batch` call expands up to `batch_size` frontier nodes with one
/// chunked query and yields their children in level order, left before right
/// under each parent. An empty batch means the downline is exhausted.
pub struct DownlineWalker<'a> {
    repo: &'a Repository,
    frontier: VecDeque<NodeId>,
    batch_size: usize,
}

impl<'a> DownlineWalker<'a> {
    /// Start a traversal below `start`. The start node itself is not yielded.
    pub fn new(repo: &'a Repository, start: NodeId, batch_size: usize) -> Self {
        Self {
            repo,
            frontier: VecDeque::from([start]),
            batch_size: batch_size.max(1),
        }
    }

    /// The next slice of descendants, or empty once exhausted. Childless
    /// frontier entries are skipped internally rather than surfaced as empty
    /// batches.
    pub async fn next_batch(&mut self) -> Result<Vec<PlacementNode>, CoreError> {
        while !self.frontier.is_empty() {
            let mut parents = Vec::with_capacity(self.batch_size.min(self.frontier.len()));
            while parents.len() < self.batch_size {
                match self.frontier.pop_front() {
                    Some(id) => parents.push(id),
                    None => break,
                }
            }

            let children = self.repo.children_of(&parents).await?;
            if children.is_empty() {
                continue;
            }

            let mut by_parent: HashMap<i64, Vec<PlacementNode>> = HashMap::new();
            for child in children {
                if let Some(parent_id) = child.parent_id {
                    by_parent.entry(parent_id.as_i64()).or_default().push(child);
                }
            }

            let mut batch = Vec::new();
            for parent in &parents {
                if let Some(kids) = by_parent.remove(&parent.as_i64()) {
                    for kid in kids {
                        self.frontier.push_back(kid.id);
                        batch.push(kid);
                    }
                }
            }
            return Ok(batch);
        }
        Ok(Vec::new())
    }

    /// Drain the walker, counting descendants.
    pub async fn count(mut self) -> Result<u64, CoreError> {
        let mut total = 0u64;
        loop {
            let batch = self.next_batch().await?;
            if batch.is_empty() {
                return Ok(total);
            }
            total += batch.len() as u64;
        }
    }

    /// Drain up to `limit` descendants in traversal order, abandoning the
    /// rest of the frontier.
    pub async fn collect(mut self, limit: usize) -> Result<Vec<PlacementNode>, CoreError> {
        let mut collected = Vec::new();
        while collected.len() < limit {
            let batch = self.next_batch().await?;
            if batch.is_empty() {
                break;
            }
            for node in batch {
                if collected.len() == limit {
                    break;
                }
                collected.push(node);
            }
        }
        Ok(collected)
    }
}

/// First open slot at or below `start` in breadth-first node order, checking
/// left before right on each node. This is the spillover placement rule.
///
/// The result is a snapshot; the caller's attach revalidates occupancy inside
/// its own transaction and retries on a lost race.
pub async fn find_open_slot(
    repo: &Repository,
    start: NodeId,
    batch_size: usize,
) -> Result<(NodeId, Slot), CoreError> {
    let start_node = repo
        .get_node(start)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {}", start)))?;
    let batch_size = batch_size.max(1);

    let mut frontier: VecDeque<PlacementNode> = VecDeque::from([start_node]);
    while !frontier.is_empty() {
        let mut parents = Vec::with_capacity(batch_size.min(frontier.len()));
        while parents.len() < batch_size {
            match frontier.pop_front() {
                Some(node) => parents.push(node),
                None => break,
            }
        }

        for node in &parents {
            if let Some(slot) = node.open_slot() {
                return Ok((node.id, slot));
            }
        }

        let ids: Vec<NodeId> = parents.iter().map(|n| n.id).collect();
        let children = repo.children_of(&ids).await?;
        let mut by_parent: HashMap<i64, Vec<PlacementNode>> = HashMap::new();
        for child in children {
            if let Some(parent_id) = child.parent_id {
                by_parent.entry(parent_id.as_i64()).or_default().push(child);
            }
        }
        for parent in &ids {
            if let Some(kids) = by_parent.remove(&parent.as_i64()) {
                frontier.extend(kids);
            }
        }
    }

    // A finite binary tree always has an open slot on some frontier node.
    Err(CoreError::Internal(
        "open-slot search exhausted the tree".to_string(),
    ))
}

/// One node of a rendered network snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    pub member_id: MemberId,
    pub node_id: i64,
    /// Depth relative to the snapshot root.
    pub depth: i64,
    pub own_volume: Decimal,
    pub left_volume: Decimal,
    pub right_volume: Decimal,
    pub total_volume: Decimal,
    pub left: Option<Box<SnapshotNode>>,
    pub right: Option<Box<SnapshotNode>>,
    /// True when this node has children beyond the depth cut.
    pub truncated: bool,
}

/// Render the subtree under `start` down to `max_depth` levels below it.
///
/// Nodes are gathered level by level, then assembled deepest level first, so
/// neither phase recurses.
pub async fn build_snapshot(
    repo: &Repository,
    start: NodeId,
    max_depth: usize,
) -> Result<SnapshotNode, CoreError> {
    let start_node = repo
        .get_node(start)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {}", start)))?;
    let base_level = start_node.level;

    let mut levels: Vec<Vec<PlacementNode>> = vec![vec![start_node]];
    for depth in 1..=max_depth {
        let parent_ids: Vec<NodeId> = levels[depth - 1].iter().map(|n| n.id).collect();
        let children = repo.children_of(&parent_ids).await?;
        if children.is_empty() {
            break;
        }
        levels.push(children);
    }

    let mut built: HashMap<i64, SnapshotNode> = HashMap::new();
    for level_nodes in levels.iter().rev() {
        for node in level_nodes {
            let left = node
                .left_child_id
                .and_then(|id| built.remove(&id.as_i64()))
                .map(Box::new);
            let right = node
                .right_child_id
                .and_then(|id| built.remove(&id.as_i64()))
                .map(Box::new);
            let truncated = (left.is_none() && node.left_child_id.is_some())
                || (right.is_none() && node.right_child_id.is_some());
            built.insert(
                node.id.as_i64(),
                SnapshotNode {
                    member_id: node.member_id.clone(),
                    node_id: node.id.as_i64(),
                    depth: node.level - base_level,
                    own_volume: node.own_volume,
                    left_volume: node.left_volume,
                    right_volume: node.right_volume,
                    total_volume: node.total_volume,
                    left,
                    right,
                    truncated,
                },
            );
        }
    }

    built
        .remove(&start.as_i64())
        .ok_or_else(|| CoreError::Internal("snapshot assembly lost its root".to_string()))
}
