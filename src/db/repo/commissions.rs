//! Commission record storage.
//!
//! Inserts go through `ON CONFLICT DO NOTHING` against the
//! `(source_order_id, beneficiary_member_id, commission_type)` uniqueness, so
//! re-running an evaluation never duplicates a record.

use super::{commission_from_row, Repository};
use crate::domain::{CommissionId, CommissionRecord, CommissionStatus, MemberId, Period};
use crate::error::CoreError;

const COMMISSION_COLUMNS: &str =
    "id, beneficiary_member_id, source_member_id, source_order_id, amount, commission_type, \
     status, period_year, period_month, created_at";

impl Repository {
    /// Insert freshly evaluated records, skipping any whose uniqueness triple
    /// already exists. Returns how many were actually inserted. All-or-nothing:
    /// the batch commits in one transaction.
    pub async fn insert_commissions_pending(
        &self,
        records: &[CommissionRecord],
    ) -> Result<usize, CoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.write_pool().begin().await?;
        let mut inserted = 0usize;
        for record in records {
            let result = sqlx::query(
                "INSERT INTO commission_records \
                 (id, beneficiary_member_id, source_member_id, source_order_id, amount, \
                  commission_type, status, period_year, period_month, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (source_order_id, beneficiary_member_id, commission_type) \
                 DO NOTHING",
            )
            .bind(record.id.as_str())
            .bind(record.beneficiary_member_id.as_str())
            .bind(record.source_member_id.as_str())
            .bind(record.source_order_id.as_str())
            .bind(record.amount.to_canonical_string())
            .bind(record.commission_type.as_db_str())
            .bind(record.status.as_str())
            .bind(record.period.year as i64)
            .bind(record.period.month as i64)
            .bind(record.created_at.as_ms())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Move a record along the status lifecycle. The current status is read
    /// inside the write transaction, so concurrent transitions serialize and
    /// at most one of two racing calls succeeds.
    pub async fn transition_commission(
        &self,
        id: &CommissionId,
        to: CommissionStatus,
    ) -> Result<CommissionRecord, CoreError> {
        let mut tx = self.write_pool().begin().await?;

        let sql = format!(
            "SELECT {} FROM commission_records WHERE id = ?",
            COMMISSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("commission {}", id)))?;
        let record = commission_from_row(&row)?;

        if !record.status.can_transition(to) {
            return Err(CoreError::InvalidTransition {
                from: record.status,
                to,
            });
        }

        sqlx::query("UPDATE commission_records SET status = ? WHERE id = ?")
            .bind(to.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CommissionRecord {
            status: to,
            ..record
        })
    }

    /// Every record in a period, oldest first.
    pub async fn commissions_for_period(
        &self,
        period: Period,
    ) -> Result<Vec<CommissionRecord>, CoreError> {
        let sql = format!(
            "SELECT {} FROM commission_records \
             WHERE period_year = ? AND period_month = ? \
             ORDER BY created_at, id",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(period.year as i64)
            .bind(period.month as i64)
            .fetch_all(self.read_pool())
            .await?;
        let records = rows
            .iter()
            .map(commission_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// One beneficiary's records in a period, oldest first.
    pub async fn commissions_for_member_period(
        &self,
        member: &MemberId,
        period: Period,
    ) -> Result<Vec<CommissionRecord>, CoreError> {
        let sql = format!(
            "SELECT {} FROM commission_records \
             WHERE beneficiary_member_id = ? AND period_year = ? AND period_month = ? \
             ORDER BY created_at, id",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(member.as_str())
            .bind(period.year as i64)
            .bind(period.month as i64)
            .fetch_all(self.read_pool())
            .await?;
        let records = rows
            .iter()
            .map(commission_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Paginated listing, newest first with a stable id tie-break, optionally
    /// narrowed to one beneficiary and/or one status.
    pub async fn list_commissions(
        &self,
        member: Option<&MemberId>,
        status: Option<CommissionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CommissionRecord>, CoreError> {
        let mut sql = format!("SELECT {} FROM commission_records", COMMISSION_COLUMNS);
        let mut clauses: Vec<&str> = Vec::new();
        if member.is_some() {
            clauses.push("beneficiary_member_id = ?");
        }
        if status.is_some() {
            clauses.push("status = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(member) = member {
            query = query.bind(member.as_str());
        }
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        let rows = query
            .bind(limit)
            .bind(offset)
            .fetch_all(self.read_pool())
            .await?;
        let records = rows
            .iter()
            .map(commission_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
