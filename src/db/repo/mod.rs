//! Persistence layer: placement tree, orders, and commission records.

mod commissions;
mod orders;
mod tree;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::migrations::DbPools;
use crate::domain::{
    CommissionId, CommissionRecord, CommissionStatus, CommissionType, Decimal, MemberId, NodeId,
    Order, OrderId, OrderStatus, Period, PlacementNode, Slot, TimeMs,
};

/// Maximum ids bound into a single `IN (...)` clause. SQLite caps bind
/// parameters at 999 per statement.
pub(crate) const BIND_CHUNK: usize = 500;

/// Data access layer over SQLite.
///
/// All mutating methods run a transaction on the single-connection write
/// pool, so structural checks made inside a transaction cannot be invalidated
/// by a concurrent writer. Reads use the reader pool and see WAL snapshots.
#[derive(Debug, Clone)]
pub struct Repository {
    db: DbPools,
}

impl Repository {
    pub fn new(db: DbPools) -> Self {
        Self { db }
    }

    pub(crate) fn read_pool(&self) -> &SqlitePool {
        &self.db.read
    }

    pub(crate) fn write_pool(&self) -> &SqlitePool {
        &self.db.write
    }
}

fn decode_err(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("invalid {} value: {}", column, value).into())
}

/// Read a canonical decimal TEXT column.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.get(column);
    Decimal::from_str_canonical(&raw).map_err(|_| decode_err(column, &raw))
}

fn period_from_row(row: &SqliteRow) -> Result<Period, sqlx::Error> {
    let year: i64 = row.get("period_year");
    let month: i64 = row.get("period_month");
    Period::new(year as i32, month as u32)
        .ok_or_else(|| decode_err("period_month", &month.to_string()))
}

pub(crate) fn node_from_row(row: &SqliteRow) -> Result<PlacementNode, sqlx::Error> {
    let position: Option<String> = row.get("position");
    let position = position
        .map(|s| Slot::parse(&s).ok_or_else(|| decode_err("position", &s)))
        .transpose()?;

    Ok(PlacementNode {
        id: NodeId::new(row.get("id")),
        member_id: MemberId::new(row.get("member_id")),
        parent_id: row.get::<Option<i64>, _>("parent_id").map(NodeId::new),
        position,
        left_child_id: row.get::<Option<i64>, _>("left_child_id").map(NodeId::new),
        right_child_id: row
            .get::<Option<i64>, _>("right_child_id")
            .map(NodeId::new),
        level: row.get("level"),
        own_volume: decimal_column(row, "own_volume")?,
        left_volume: decimal_column(row, "left_volume")?,
        right_volume: decimal_column(row, "right_volume")?,
        total_volume: decimal_column(row, "total_volume")?,
        created_at: TimeMs::new(row.get("created_at")),
    })
}

pub(crate) fn order_from_row(row: &SqliteRow) -> Result<Order, sqlx::Error> {
    let status: String = row.get("status");
    let status = OrderStatus::parse(&status).ok_or_else(|| decode_err("status", &status))?;

    Ok(Order {
        id: OrderId::new(row.get("id")),
        member_id: MemberId::new(row.get("member_id")),
        order_amount: decimal_column(row, "order_amount")?,
        commissionable_value: decimal_column(row, "commissionable_value")?,
        status,
        placed_at: TimeMs::new(row.get("placed_at")),
        period: period_from_row(row)?,
    })
}

pub(crate) fn commission_from_row(row: &SqliteRow) -> Result<CommissionRecord, sqlx::Error> {
    let commission_type: String = row.get("commission_type");
    let commission_type = CommissionType::parse(&commission_type)
        .ok_or_else(|| decode_err("commission_type", &commission_type))?;
    let status: String = row.get("status");
    let status = CommissionStatus::parse(&status).ok_or_else(|| decode_err("status", &status))?;

    Ok(CommissionRecord {
        id: CommissionId::new(row.get("id")),
        beneficiary_member_id: MemberId::new(row.get("beneficiary_member_id")),
        source_member_id: MemberId::new(row.get("source_member_id")),
        source_order_id: OrderId::new(row.get("source_order_id")),
        amount: decimal_column(row, "amount")?,
        commission_type,
        status,
        period: period_from_row(row)?,
        created_at: TimeMs::new(row.get("created_at")),
    })
}
