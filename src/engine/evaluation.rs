//! Commission evaluation for one beneficiary over one period.
//!
//! Evaluation expands the beneficiary's subtree level by level down to the
//! deepest configured tier and prices the completed orders found at each
//! paying depth. It can run any number of times for the same member and
//! period: the `(source_order, beneficiary, type)` uniqueness in storage
//! turns re-runs into no-ops for records that already exist.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::info;

use crate::config::CommissionPlan;
use crate::db::Repository;
use crate::domain::{
    CommissionRecord, CommissionStatus, CommissionType, Decimal, MemberId, Period, TimeMs,
};
use crate::error::CoreError;

/// What one evaluation run saw and did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOutcome {
    pub member_id: MemberId,
    pub period: Period,
    /// Completed orders examined at paying depths.
    pub orders: usize,
    /// Records the plan produced, before deduplication.
    pub candidates: usize,
    /// Records actually inserted this run.
    pub inserted: usize,
}

/// Per-tier slice of a member's period summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierTotal {
    pub commission_type: CommissionType,
    pub amount: Decimal,
    pub count: usize,
}

/// Per-status slice of a member's period summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTotal {
    pub status: CommissionStatus,
    pub amount: Decimal,
    pub count: usize,
}

/// A member's commissions for one period, broken down by tier and status.
/// Totals cover every record including rejected ones; `by_status` carries
/// the split.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSummary {
    pub member_id: MemberId,
    pub period: Period,
    pub total: Decimal,
    pub by_type: Vec<TierTotal>,
    pub by_status: Vec<StatusTotal>,
}

/// The commission engine: period evaluation plus its reporting queries.
pub struct CommissionEvaluator<'a> {
    repo: &'a Repository,
    plan: &'a CommissionPlan,
}

impl<'a> CommissionEvaluator<'a> {
    pub fn new(repo: &'a Repository, plan: &'a CommissionPlan) -> Self {
        Self { repo, plan }
    }

    /// Evaluate one member's period: walk their downline level by level to
    /// the deepest configured tier and mint a `Pending` record per completed
    /// order at each paying depth. Depth counts from the beneficiary, so the
    /// same order pays `direct` to the buyer's parent and `level2` to the
    /// grandparent. Zero-amount records are not minted. Safe to re-run.
    pub async fn evaluate_period(
        &self,
        beneficiary: &MemberId,
        period: Period,
        now: TimeMs,
    ) -> Result<EvaluationOutcome, CoreError> {
        let node = self
            .repo
            .get_node_by_member(beneficiary)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("member {}", beneficiary)))?;

        let mut frontier = vec![node.id];
        let mut records: Vec<CommissionRecord> = Vec::new();
        let mut orders_seen = 0usize;

        for depth in 1..=self.plan.max_depth() {
            let level = self.repo.children_of(&frontier).await?;
            if level.is_empty() {
                break;
            }
            frontier = level.iter().map(|n| n.id).collect();

            // A depth with no configured rate still feeds the next level.
            let Some(rate) = self.plan.rate_for_depth(depth) else {
                continue;
            };
            let Some(tier) = CommissionType::from_depth(depth) else {
                continue;
            };

            let members: Vec<MemberId> = level.into_iter().map(|n| n.member_id).collect();
            let orders = self
                .repo
                .completed_orders_in_period_for(&members, period)
                .await?;
            orders_seen += orders.len();

            for order in orders {
                let amount = order.commissionable_value.percent(rate);
                if amount.is_zero() {
                    continue;
                }
                records.push(CommissionRecord::pending(
                    beneficiary.clone(),
                    order.member_id,
                    order.id,
                    amount,
                    tier,
                    period,
                    now,
                ));
            }
        }

        let candidates = records.len();
        let inserted = self.repo.insert_commissions_pending(&records).await?;
        info!(
            member = %beneficiary,
            %period,
            orders = orders_seen,
            candidates,
            inserted,
            "period evaluation complete"
        );

        Ok(EvaluationOutcome {
            member_id: beneficiary.clone(),
            period,
            orders: orders_seen,
            candidates,
            inserted,
        })
    }

    /// One member's period summary.
    pub async fn summarize(
        &self,
        member: &MemberId,
        period: Period,
    ) -> Result<CommissionSummary, CoreError> {
        let records = self
            .repo
            .commissions_for_member_period(member, period)
            .await?;

        let mut total = Decimal::zero();
        let mut by_type: BTreeMap<CommissionType, (Decimal, usize)> = BTreeMap::new();
        let mut by_status: HashMap<CommissionStatus, (Decimal, usize)> = HashMap::new();
        for record in &records {
            total = total + record.amount;
            let tier = by_type
                .entry(record.commission_type)
                .or_insert((Decimal::zero(), 0));
            tier.0 = tier.0 + record.amount;
            tier.1 += 1;
            let status = by_status
                .entry(record.status)
                .or_insert((Decimal::zero(), 0));
            status.0 = status.0 + record.amount;
            status.1 += 1;
        }

        let by_type = by_type
            .into_iter()
            .map(|(commission_type, (amount, count))| TierTotal {
                commission_type,
                amount,
                count,
            })
            .collect();
        let by_status = [
            CommissionStatus::Pending,
            CommissionStatus::Approved,
            CommissionStatus::Paid,
            CommissionStatus::Rejected,
        ]
        .into_iter()
        .filter_map(|status| {
            by_status.get(&status).map(|(amount, count)| StatusTotal {
                status,
                amount: *amount,
                count: *count,
            })
        })
        .collect();

        Ok(CommissionSummary {
            member_id: member.clone(),
            period,
            total,
            by_type,
            by_status,
        })
    }

    /// Commission totals per beneficiary for a period, largest first with a
    /// stable member-id tie-break. Rejected records do not count toward a
    /// member's standing.
    pub async fn period_totals_by_member(
        &self,
        period: Period,
    ) -> Result<Vec<(MemberId, Decimal)>, CoreError> {
        let records = self.repo.commissions_for_period(period).await?;
        let mut totals: HashMap<MemberId, Decimal> = HashMap::new();
        for record in &records {
            if record.status == CommissionStatus::Rejected {
                continue;
            }
            let entry = totals
                .entry(record.beneficiary_member_id.clone())
                .or_insert_with(Decimal::zero);
            *entry = *entry + record.amount;
        }
        let mut rows: Vec<(MemberId, Decimal)> = totals.into_iter().collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(rows)
    }
}
