//! Placement tree storage: node creation, linkage, and volume counters.

use sqlx::SqliteConnection;

use super::{decimal_column, node_from_row, Repository, BIND_CHUNK};
use crate::domain::{Decimal, MemberId, NodeId, PlacementNode, Slot, TimeMs};
use crate::engine::propagation::{AncestorStep, VolumeBucket, VolumeUpdate};
use crate::error::CoreError;

const NODE_COLUMNS: &str = "id, member_id, parent_id, position, left_child_id, right_child_id, \
     level, own_volume, left_volume, right_volume, total_volume, created_at";

impl Repository {
    /// Create the root node. Fails if any root exists or the member already
    /// holds a node elsewhere.
    pub async fn insert_root(
        &self,
        member_id: &MemberId,
        now: TimeMs,
    ) -> Result<PlacementNode, CoreError> {
        let mut tx = self.write_pool().begin().await?;

        let placed = sqlx::query("SELECT id FROM placement_nodes WHERE member_id = ?")
            .bind(member_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if placed.is_some() {
            return Err(CoreError::MemberAlreadyPlaced(member_id.to_string()));
        }

        let root = sqlx::query("SELECT id FROM placement_nodes WHERE parent_id IS NULL")
            .fetch_optional(&mut *tx)
            .await?;
        if root.is_some() {
            return Err(CoreError::RootExists);
        }

        let result = sqlx::query(
            "INSERT INTO placement_nodes (member_id, level, created_at) VALUES (?, 0, ?)",
        )
        .bind(member_id.as_str())
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        tx.commit().await?;

        Ok(PlacementNode {
            id: NodeId::new(id),
            member_id: member_id.clone(),
            parent_id: None,
            position: None,
            left_child_id: None,
            right_child_id: None,
            level: 0,
            own_volume: Decimal::zero(),
            left_volume: Decimal::zero(),
            right_volume: Decimal::zero(),
            total_volume: Decimal::zero(),
            created_at: now,
        })
    }

    /// Attach a new member under `parent_id` in `slot`.
    ///
    /// Occupancy and duplicate-member checks run inside the write
    /// transaction, so two concurrent attaches to the same slot serialize and
    /// the loser gets `SlotOccupied` rather than corrupting the tree.
    pub async fn attach_child(
        &self,
        member_id: &MemberId,
        parent_id: NodeId,
        slot: Slot,
        now: TimeMs,
    ) -> Result<PlacementNode, CoreError> {
        let mut tx = self.write_pool().begin().await?;

        let placed = sqlx::query("SELECT id FROM placement_nodes WHERE member_id = ?")
            .bind(member_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if placed.is_some() {
            return Err(CoreError::MemberAlreadyPlaced(member_id.to_string()));
        }

        let sql = format!("SELECT {} FROM placement_nodes WHERE id = ?", NODE_COLUMNS);
        let parent_row = sqlx::query(&sql)
            .bind(parent_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::ParentNotFound(format!("node {}", parent_id)))?;
        let parent = node_from_row(&parent_row)?;

        if parent.child_in(slot).is_some() {
            return Err(CoreError::SlotOccupied {
                parent: parent.id.as_i64(),
                slot,
            });
        }

        let result = sqlx::query(
            "INSERT INTO placement_nodes (member_id, parent_id, position, level, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(member_id.as_str())
        .bind(parent.id.as_i64())
        .bind(slot.as_str())
        .bind(parent.level + 1)
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;
        let child_id = result.last_insert_rowid();

        let pointer_sql = match slot {
            Slot::Left => "UPDATE placement_nodes SET left_child_id = ? WHERE id = ?",
            Slot::Right => "UPDATE placement_nodes SET right_child_id = ? WHERE id = ?",
        };
        sqlx::query(pointer_sql)
            .bind(child_id)
            .bind(parent.id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(PlacementNode {
            id: NodeId::new(child_id),
            member_id: member_id.clone(),
            parent_id: Some(parent.id),
            position: Some(slot),
            left_child_id: None,
            right_child_id: None,
            level: parent.level + 1,
            own_volume: Decimal::zero(),
            left_volume: Decimal::zero(),
            right_volume: Decimal::zero(),
            total_volume: Decimal::zero(),
            created_at: now,
        })
    }

    pub async fn get_node(&self, id: NodeId) -> Result<Option<PlacementNode>, CoreError> {
        let sql = format!("SELECT {} FROM placement_nodes WHERE id = ?", NODE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(self.read_pool())
            .await?;
        Ok(row.map(|row| node_from_row(&row)).transpose()?)
    }

    pub async fn get_node_by_member(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<PlacementNode>, CoreError> {
        let sql = format!(
            "SELECT {} FROM placement_nodes WHERE member_id = ?",
            NODE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(member_id.as_str())
            .fetch_optional(self.read_pool())
            .await?;
        Ok(row.map(|row| node_from_row(&row)).transpose()?)
    }

    pub async fn root_node(&self) -> Result<Option<PlacementNode>, CoreError> {
        let sql = format!(
            "SELECT {} FROM placement_nodes WHERE parent_id IS NULL",
            NODE_COLUMNS
        );
        let row = sqlx::query(&sql).fetch_optional(self.read_pool()).await?;
        Ok(row.map(|row| node_from_row(&row)).transpose()?)
    }

    /// All direct children of the given parents, chunked to stay under the
    /// SQLite bind limit. Rows come back grouped by parent with the left
    /// child before the right.
    pub async fn children_of(&self, parents: &[NodeId]) -> Result<Vec<PlacementNode>, CoreError> {
        let mut children = Vec::new();
        for chunk in parents.chunks(BIND_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT {} FROM placement_nodes WHERE parent_id IN ({}) \
                 ORDER BY parent_id, position",
                NODE_COLUMNS, placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.as_i64());
            }
            let rows = query.fetch_all(self.read_pool()).await?;
            for row in &rows {
                children.push(node_from_row(row)?);
            }
        }
        Ok(children)
    }

    /// Walk parent links from `node_id` to the root. Returns the chain
    /// nearest first; empty for the root itself.
    ///
    /// Nodes never move once attached, so the chain stays valid even while
    /// writers run.
    pub async fn ancestor_chain(&self, node_id: NodeId) -> Result<Vec<AncestorStep>, CoreError> {
        let mut current = self
            .get_node(node_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {}", node_id)))?;

        let mut chain = Vec::new();
        while let Some(parent_id) = current.parent_id {
            let side = current.position.ok_or_else(|| {
                CoreError::Internal(format!("node {} has a parent but no position", current.id))
            })?;
            chain.push(AncestorStep {
                node_id: parent_id,
                side,
            });
            current = self.get_node(parent_id).await?.ok_or_else(|| {
                CoreError::Internal(format!("dangling parent reference {}", parent_id))
            })?;
        }
        Ok(chain)
    }

    /// Top nodes by subtree volume. Ordering happens on a numeric cast, so
    /// callers wanting exact tie-breaks re-sort the returned page.
    pub async fn list_nodes_by_total_volume(
        &self,
        limit: i64,
    ) -> Result<Vec<PlacementNode>, CoreError> {
        let sql = format!(
            "SELECT {} FROM placement_nodes \
             ORDER BY CAST(total_volume AS REAL) DESC, id ASC LIMIT ?",
            NODE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(self.read_pool())
            .await?;
        let nodes = rows
            .iter()
            .map(node_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }
}

/// Apply a volume plan on an open transaction. Each update moves one bucket
/// and `total_volume` by the same delta; any counter that would go negative
/// aborts the whole plan with `VolumeUnderflow`.
pub(crate) async fn apply_volume_updates(
    conn: &mut SqliteConnection,
    updates: &[VolumeUpdate],
) -> Result<(), CoreError> {
    for update in updates {
        let row = sqlx::query(
            "SELECT own_volume, left_volume, right_volume, total_volume \
             FROM placement_nodes WHERE id = ?",
        )
        .bind(update.node_id.as_i64())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {}", update.node_id)))?;

        let column = match update.bucket {
            VolumeBucket::Own => "own_volume",
            VolumeBucket::Side(Slot::Left) => "left_volume",
            VolumeBucket::Side(Slot::Right) => "right_volume",
        };
        let bucket = decimal_column(&row, column)? + update.delta;
        let total = decimal_column(&row, "total_volume")? + update.delta;
        if bucket.is_negative() || total.is_negative() {
            return Err(CoreError::VolumeUnderflow(update.node_id.as_i64()));
        }

        let sql = format!(
            "UPDATE placement_nodes SET {} = ?, total_volume = ? WHERE id = ?",
            column
        );
        sqlx::query(&sql)
            .bind(bucket.to_canonical_string())
            .bind(total.to_canonical_string())
            .bind(update.node_id.as_i64())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn member(id: &str) -> MemberId {
        MemberId::new(id.to_string())
    }

    #[tokio::test]
    async fn test_insert_root() {
        let (repo, _dir) = setup_test_db().await;

        let root = repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();
        assert!(root.is_root());
        assert_eq!(root.level, 0);
        assert!(root.total_volume.is_zero());

        let fetched = repo.get_node(root.id).await.unwrap().unwrap();
        assert_eq!(fetched, root);
        let by_member = repo.get_node_by_member(&member("root")).await.unwrap().unwrap();
        assert_eq!(by_member.id, root.id);
    }

    #[tokio::test]
    async fn test_second_root_rejected() {
        let (repo, _dir) = setup_test_db().await;
        repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();

        let err = repo
            .insert_root(&member("other"), TimeMs::new(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RootExists));
    }

    #[tokio::test]
    async fn test_attach_child_links_both_directions() {
        let (repo, _dir) = setup_test_db().await;
        let root = repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();

        let child = repo
            .attach_child(&member("a"), root.id, Slot::Left, TimeMs::new(2000))
            .await
            .unwrap();
        assert_eq!(child.parent_id, Some(root.id));
        assert_eq!(child.position, Some(Slot::Left));
        assert_eq!(child.level, 1);

        let root = repo.get_node(root.id).await.unwrap().unwrap();
        assert_eq!(root.left_child_id, Some(child.id));
        assert_eq!(root.right_child_id, None);
    }

    #[tokio::test]
    async fn test_attach_to_occupied_slot_rejected() {
        let (repo, _dir) = setup_test_db().await;
        let root = repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();
        repo.attach_child(&member("a"), root.id, Slot::Left, TimeMs::new(2000))
            .await
            .unwrap();

        let err = repo
            .attach_child(&member("b"), root.id, Slot::Left, TimeMs::new(3000))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SlotOccupied { slot: Slot::Left, .. }));

        // The losing attach must not leave a node behind.
        assert!(repo.get_node_by_member(&member("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attach_duplicate_member_rejected() {
        let (repo, _dir) = setup_test_db().await;
        let root = repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();
        repo.attach_child(&member("a"), root.id, Slot::Left, TimeMs::new(2000))
            .await
            .unwrap();

        let err = repo
            .attach_child(&member("a"), root.id, Slot::Right, TimeMs::new(3000))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MemberAlreadyPlaced(_)));
    }

    #[tokio::test]
    async fn test_attach_to_missing_parent_rejected() {
        let (repo, _dir) = setup_test_db().await;
        repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();

        let err = repo
            .attach_child(&member("a"), NodeId::new(999), Slot::Left, TimeMs::new(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ParentNotFound(_)));
    }

    #[tokio::test]
    async fn test_children_of_groups_by_parent_left_first() {
        let (repo, _dir) = setup_test_db().await;
        let root = repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();
        let a = repo
            .attach_child(&member("a"), root.id, Slot::Left, TimeMs::new(2000))
            .await
            .unwrap();
        let b = repo
            .attach_child(&member("b"), root.id, Slot::Right, TimeMs::new(3000))
            .await
            .unwrap();
        let c = repo
            .attach_child(&member("c"), a.id, Slot::Right, TimeMs::new(4000))
            .await
            .unwrap();

        let children = repo.children_of(&[root.id, a.id]).await.unwrap();
        let ids: Vec<NodeId> = children.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);

        let none = repo.children_of(&[b.id, c.id]).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_ancestor_chain_nearest_first() {
        let (repo, _dir) = setup_test_db().await;
        let root = repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();
        let a = repo
            .attach_child(&member("a"), root.id, Slot::Left, TimeMs::new(2000))
            .await
            .unwrap();
        let c = repo
            .attach_child(&member("c"), a.id, Slot::Right, TimeMs::new(3000))
            .await
            .unwrap();

        assert!(repo.ancestor_chain(root.id).await.unwrap().is_empty());

        let chain = repo.ancestor_chain(c.id).await.unwrap();
        assert_eq!(
            chain,
            vec![
                AncestorStep {
                    node_id: a.id,
                    side: Slot::Right,
                },
                AncestorStep {
                    node_id: root.id,
                    side: Slot::Left,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_volume_updates_moves_bucket_and_total() {
        let (repo, _dir) = setup_test_db().await;
        let root = repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();

        let mut tx = repo.write_pool().begin().await.unwrap();
        apply_volume_updates(
            &mut tx,
            &[
                VolumeUpdate {
                    node_id: root.id,
                    bucket: VolumeBucket::Own,
                    delta: dec("100"),
                },
                VolumeUpdate {
                    node_id: root.id,
                    bucket: VolumeBucket::Side(Slot::Right),
                    delta: dec("40.5"),
                },
            ],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let root = repo.get_node(root.id).await.unwrap().unwrap();
        assert_eq!(root.own_volume, dec("100"));
        assert_eq!(root.right_volume, dec("40.5"));
        assert_eq!(root.total_volume, dec("140.5"));
        assert!(root.volumes_consistent());
    }

    #[tokio::test]
    async fn test_volume_underflow_detected() {
        let (repo, _dir) = setup_test_db().await;
        let root = repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();

        let mut tx = repo.write_pool().begin().await.unwrap();
        let err = apply_volume_updates(
            &mut tx,
            &[VolumeUpdate {
                node_id: root.id,
                bucket: VolumeBucket::Own,
                delta: dec("-1"),
            }],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::VolumeUnderflow(_)));
        drop(tx);

        let root = repo.get_node(root.id).await.unwrap().unwrap();
        assert!(root.own_volume.is_zero());
    }

    #[tokio::test]
    async fn test_list_nodes_by_total_volume() {
        let (repo, _dir) = setup_test_db().await;
        let root = repo.insert_root(&member("root"), TimeMs::new(1000)).await.unwrap();
        let a = repo
            .attach_child(&member("a"), root.id, Slot::Left, TimeMs::new(2000))
            .await
            .unwrap();

        let mut tx = repo.write_pool().begin().await.unwrap();
        apply_volume_updates(
            &mut tx,
            &[
                VolumeUpdate {
                    node_id: root.id,
                    bucket: VolumeBucket::Own,
                    delta: dec("10"),
                },
                VolumeUpdate {
                    node_id: a.id,
                    bucket: VolumeBucket::Own,
                    delta: dec("25"),
                },
            ],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let top = repo.list_nodes_by_total_volume(10).await.unwrap();
        let ids: Vec<NodeId> = top.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a.id, root.id]);
    }
}
