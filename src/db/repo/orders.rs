//! Order storage. Recording and reversing an order move volume counters in
//! the same transaction, so an order and its tree effects are never visible
//! half-applied.

use super::tree::apply_volume_updates;
use super::{order_from_row, Repository, BIND_CHUNK};
use crate::domain::{MemberId, Order, OrderId, OrderStatus, Period};
use crate::engine::propagation::VolumeUpdate;
use crate::error::CoreError;

const ORDER_COLUMNS: &str =
    "id, member_id, order_amount, commissionable_value, status, placed_at, \
     period_year, period_month";

impl Repository {
    /// Persist a completed order and apply its volume plan atomically.
    pub async fn apply_order(
        &self,
        order: &Order,
        updates: &[VolumeUpdate],
    ) -> Result<(), CoreError> {
        let mut tx = self.write_pool().begin().await?;

        sqlx::query(
            "INSERT INTO orders \
             (id, member_id, order_amount, commissionable_value, status, placed_at, \
              period_year, period_month) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.id.as_str())
        .bind(order.member_id.as_str())
        .bind(order.order_amount.to_canonical_string())
        .bind(order.commissionable_value.to_canonical_string())
        .bind(order.status.as_str())
        .bind(order.placed_at.as_ms())
        .bind(order.period.year as i64)
        .bind(order.period.month as i64)
        .execute(&mut *tx)
        .await?;

        apply_volume_updates(&mut tx, updates).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Mark an order reversed and subtract its volume back out, atomically.
    ///
    /// The status is re-read inside the write transaction, so concurrent
    /// reversals of the same order cannot double-subtract: the second one
    /// sees `reversed` and fails.
    pub async fn apply_reversal(
        &self,
        order_id: &OrderId,
        updates: &[VolumeUpdate],
    ) -> Result<Order, CoreError> {
        let mut tx = self.write_pool().begin().await?;

        let sql = format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(order_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;
        let order = order_from_row(&row)?;

        if order.status == OrderStatus::Reversed {
            return Err(CoreError::OrderAlreadyReversed(order_id.to_string()));
        }

        apply_volume_updates(&mut tx, updates).await?;

        sqlx::query("UPDATE orders SET status = 'reversed' WHERE id = ?")
            .bind(order_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Order {
            status: OrderStatus::Reversed,
            ..order
        })
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, CoreError> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(order_id.as_str())
            .fetch_optional(self.read_pool())
            .await?;
        Ok(row.map(|row| order_from_row(&row)).transpose()?)
    }

    /// Completed orders placed by any of `members` in one evaluation period,
    /// oldest first. Reversed orders never qualify. Chunked to stay under the
    /// SQLite bind limit.
    pub async fn completed_orders_in_period_for(
        &self,
        members: &[MemberId],
        period: Period,
    ) -> Result<Vec<Order>, CoreError> {
        let mut orders = Vec::new();
        for chunk in members.chunks(BIND_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT {} FROM orders \
                 WHERE status = 'completed' AND period_year = ? AND period_month = ? \
                 AND member_id IN ({}) \
                 ORDER BY placed_at, id",
                ORDER_COLUMNS, placeholders
            );
            let mut query = sqlx::query(&sql)
                .bind(period.year as i64)
                .bind(period.month as i64);
            for member in chunk {
                query = query.bind(member.as_str());
            }
            let rows = query.fetch_all(self.read_pool()).await?;
            for row in &rows {
                orders.push(order_from_row(row)?);
            }
        }
        Ok(orders)
    }

    /// Newest orders first, optionally for a single member.
    pub async fn recent_orders(
        &self,
        member: Option<&MemberId>,
        limit: i64,
    ) -> Result<Vec<Order>, CoreError> {
        let rows = match member {
            Some(member) => {
                let sql = format!(
                    "SELECT {} FROM orders WHERE member_id = ? \
                     ORDER BY placed_at DESC, id DESC LIMIT ?",
                    ORDER_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(member.as_str())
                    .bind(limit)
                    .fetch_all(self.read_pool())
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM orders ORDER BY placed_at DESC, id DESC LIMIT ?",
                    ORDER_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(limit)
                    .fetch_all(self.read_pool())
                    .await?
            }
        };
        let orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }
}
