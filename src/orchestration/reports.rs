//! Leaderboard assembly over the placement tree and commission records.

use serde::Serialize;

use crate::config::CommissionPlan;
use crate::db::Repository;
use crate::domain::{Decimal, MemberId, Period};
use crate::engine::CommissionEvaluator;
use crate::error::CoreError;

/// Which ranking a leaderboard request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardMetric {
    Volume,
    Commissions,
}

impl LeaderboardMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "volume" => Some(LeaderboardMetric::Volume),
            "commissions" => Some(LeaderboardMetric::Commissions),
            _ => None,
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub member_id: MemberId,
    pub value: Decimal,
}

/// Top members by lifetime total volume.
///
/// The SQL ordering casts the stored decimal to REAL, which can misorder
/// near-equal values; the fetched rows are re-sorted exactly here.
pub async fn top_by_volume(
    repo: &Repository,
    limit: i64,
) -> Result<Vec<LeaderboardEntry>, CoreError> {
    let mut nodes = repo.list_nodes_by_total_volume(limit).await?;
    nodes.sort_by(|a, b| {
        b.total_volume
            .cmp(&a.total_volume)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(nodes
        .into_iter()
        .enumerate()
        .map(|(index, node)| LeaderboardEntry {
            rank: index + 1,
            member_id: node.member_id,
            value: node.total_volume,
        })
        .collect())
}

/// Top members by commission totals for one period. Rejected records do not
/// count toward a member's standing.
pub async fn top_by_commissions(
    repo: &Repository,
    plan: &CommissionPlan,
    period: Period,
    limit: usize,
) -> Result<Vec<LeaderboardEntry>, CoreError> {
    let totals = CommissionEvaluator::new(repo, plan)
        .period_totals_by_member(period)
        .await?;
    Ok(totals
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, (member_id, value))| LeaderboardEntry {
            rank: index + 1,
            member_id,
            value,
        })
        .collect())
}
