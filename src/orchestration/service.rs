//! The service layer behind the HTTP façade: placement, order intake,
//! evaluation runs, and the read-side views, each a thin coordination of the
//! repository and the engines.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{
    CommissionId, CommissionRecord, CommissionStatus, Decimal, MemberId, NodeId, Order, OrderId,
    Period, PlacementNode, Slot, TimeMs,
};
use crate::engine::downline::{build_snapshot, find_open_slot, SnapshotNode};
use crate::engine::evaluation::{CommissionEvaluator, CommissionSummary, EvaluationOutcome};
use crate::engine::propagation::{plan_propagation, VolumeUpdate};
use crate::engine::DownlineWalker;
use crate::error::CoreError;
use crate::orchestration::reports::{self, LeaderboardEntry, LeaderboardMetric};

/// Re-scans between attach attempts when a spillover slot is stolen.
const SPILLOVER_ATTEMPTS: usize = 3;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

/// A placement request, already parsed at the HTTP layer.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub member_id: MemberId,
    pub sponsor_id: Option<MemberId>,
    pub position: Option<Slot>,
    pub spillover: bool,
}

/// An order intake request.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub member_id: MemberId,
    pub order_amount: Decimal,
    pub commissionable_value: Decimal,
}

/// An order plus the exact counter deltas its propagation applied,
/// root first.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order: Order,
    pub updates: Vec<VolumeUpdate>,
}

#[derive(Clone)]
pub struct NetworkService {
    repo: Arc<Repository>,
    config: Config,
}

impl NetworkService {
    pub fn new(repo: Arc<Repository>, config: Config) -> Self {
        Self { repo, config }
    }

    /// Place a member: no sponsor creates the root, an explicit position
    /// attaches directly, `spillover` auto-places into the first open slot
    /// of the sponsor's subtree (breadth-first, left before right).
    pub async fn place_member(&self, req: NewMember) -> Result<PlacementNode, CoreError> {
        let now = TimeMs::now();

        let Some(sponsor_id) = req.sponsor_id else {
            if req.position.is_some() || req.spillover {
                return Err(CoreError::InvalidArgument(
                    "root placement takes no position or spillover".to_string(),
                ));
            }
            let node = self.repo.insert_root(&req.member_id, now).await?;
            info!(member = %node.member_id, node = %node.id, "root created");
            return Ok(node);
        };

        let sponsor = self
            .repo
            .get_node_by_member(&sponsor_id)
            .await?
            .ok_or_else(|| CoreError::ParentNotFound(format!("member {}", sponsor_id)))?;

        if req.spillover {
            if req.position.is_some() {
                return Err(CoreError::InvalidArgument(
                    "position and spillover are mutually exclusive".to_string(),
                ));
            }
            return self.place_spillover(&req.member_id, sponsor.id, now).await;
        }

        let position = req.position.ok_or_else(|| {
            CoreError::InvalidArgument("position or spillover is required".to_string())
        })?;
        let node = self
            .repo
            .attach_child(&req.member_id, sponsor.id, position, now)
            .await?;
        info!(
            member = %node.member_id,
            parent = %sponsor.id,
            slot = position.as_str(),
            "member placed"
        );
        Ok(node)
    }

    /// Spillover placement. The open-slot scan runs outside the write
    /// transaction, so a concurrent placement can take the slot first; the
    /// attach re-checks occupancy and the scan restarts on that race.
    async fn place_spillover(
        &self,
        member_id: &MemberId,
        sponsor: NodeId,
        now: TimeMs,
    ) -> Result<PlacementNode, CoreError> {
        let mut lost_race = None;
        for _ in 0..SPILLOVER_ATTEMPTS {
            let (parent, slot) =
                find_open_slot(&self.repo, sponsor, self.config.team_batch_size).await?;
            match self.repo.attach_child(member_id, parent, slot, now).await {
                Ok(node) => {
                    info!(
                        member = %node.member_id,
                        parent = %parent,
                        slot = slot.as_str(),
                        "spillover placement"
                    );
                    return Ok(node);
                }
                Err(err @ CoreError::SlotOccupied { .. }) => lost_race = Some(err),
                Err(err) => return Err(err),
            }
        }
        Err(lost_race.unwrap_or_else(|| {
            CoreError::Internal("spillover placement found no slot".to_string())
        }))
    }

    /// Record a completed order for a member and propagate its volume up the
    /// tree in one transaction. The receipt carries the applied deltas.
    pub async fn record_order(&self, req: NewOrder) -> Result<OrderReceipt, CoreError> {
        if req.order_amount.is_negative() || req.commissionable_value.is_negative() {
            return Err(CoreError::InvalidArgument(
                "order amounts cannot be negative".to_string(),
            ));
        }
        let node = self.member_node(&req.member_id).await?;
        let chain = self.repo.ancestor_chain(node.id).await?;
        let order = Order::new(
            req.member_id,
            req.order_amount,
            req.commissionable_value,
            TimeMs::now(),
        );
        let updates = plan_propagation(node.id, &chain, order.order_amount, true);
        self.repo.apply_order(&order, &updates).await?;
        info!(
            order = %order.id,
            member = %order.member_id,
            amount = %order.order_amount,
            "order recorded"
        );
        Ok(OrderReceipt { order, updates })
    }

    /// Reverse a completed order: subtract exactly the volume it added and
    /// flip its status. Repeats fail with `OrderAlreadyReversed`.
    pub async fn reverse_order(&self, order_id: &OrderId) -> Result<OrderReceipt, CoreError> {
        let order = self
            .repo
            .get_order(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;
        let node = self
            .repo
            .get_node_by_member(&order.member_id)
            .await?
            .ok_or_else(|| {
                CoreError::Internal(format!("order {} has no placement node", order.id))
            })?;
        let chain = self.repo.ancestor_chain(node.id).await?;
        let updates = plan_propagation(node.id, &chain, -order.order_amount, true);
        let order = self.repo.apply_reversal(order_id, &updates).await?;
        info!(order = %order.id, member = %order.member_id, "order reversed");
        Ok(OrderReceipt { order, updates })
    }

    /// Run commission evaluation for one beneficiary and period.
    pub async fn evaluate(
        &self,
        member: &MemberId,
        year: i32,
        month: u32,
    ) -> Result<EvaluationOutcome, CoreError> {
        let period = parse_period(year, month)?;
        CommissionEvaluator::new(&self.repo, &self.config.commission_plan)
            .evaluate_period(member, period, TimeMs::now())
            .await
    }

    /// Move a commission record along its lifecycle.
    pub async fn transition_commission(
        &self,
        id: &CommissionId,
        status: CommissionStatus,
    ) -> Result<CommissionRecord, CoreError> {
        let record = self.repo.transition_commission(id, status).await?;
        info!(commission = %record.id, status = status.as_str(), "commission transitioned");
        Ok(record)
    }

    /// Bounded-depth subtree view. No member means the whole network from
    /// the root; the requested depth is capped by configuration.
    pub async fn network_snapshot(
        &self,
        member: Option<&MemberId>,
        max_depth: Option<i64>,
    ) -> Result<SnapshotNode, CoreError> {
        let depth = match max_depth {
            Some(depth) if depth < 0 => {
                return Err(CoreError::InvalidArgument(
                    "maxDepth cannot be negative".to_string(),
                ))
            }
            Some(depth) => depth.min(self.config.snapshot_max_depth),
            None => self.config.snapshot_max_depth,
        };
        let start = match member {
            Some(member) => self.member_node(member).await?,
            None => self
                .repo
                .root_node()
                .await?
                .ok_or_else(|| CoreError::NotFound("network root".to_string()))?,
        };
        build_snapshot(&self.repo, start.id, depth as usize).await
    }

    /// Total descendant count under a member, the member excluded.
    pub async fn team_size(&self, member: &MemberId) -> Result<u64, CoreError> {
        let node = self.member_node(member).await?;
        DownlineWalker::new(&self.repo, node.id, self.config.team_batch_size)
            .count()
            .await
    }

    /// A member's period summary, grouped by tier and status.
    pub async fn commission_summary(
        &self,
        member: &MemberId,
        year: i32,
        month: u32,
    ) -> Result<CommissionSummary, CoreError> {
        let period = parse_period(year, month)?;
        self.member_node(member).await?;
        CommissionEvaluator::new(&self.repo, &self.config.commission_plan)
            .summarize(member, period)
            .await
    }

    /// Commission records, newest first.
    pub async fn list_commissions(
        &self,
        member: Option<&MemberId>,
        status: Option<CommissionStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<CommissionRecord>, CoreError> {
        let limit = clamp_page(limit)?;
        let offset = match offset {
            Some(offset) if offset < 0 => {
                return Err(CoreError::InvalidArgument(
                    "offset cannot be negative".to_string(),
                ))
            }
            Some(offset) => offset,
            None => 0,
        };
        self.repo
            .list_commissions(member, status, limit, offset)
            .await
    }

    /// Recent orders, newest first, optionally for one member.
    pub async fn recent_orders(
        &self,
        member: Option<&MemberId>,
        limit: Option<i64>,
    ) -> Result<Vec<Order>, CoreError> {
        let limit = clamp_page(limit)?;
        self.repo.recent_orders(member, limit).await
    }

    /// Top members by lifetime volume, or by commission totals for a period.
    pub async fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        limit: Option<i64>,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<Vec<LeaderboardEntry>, CoreError> {
        let limit = clamp_page(limit)?;
        match metric {
            LeaderboardMetric::Volume => reports::top_by_volume(&self.repo, limit).await,
            LeaderboardMetric::Commissions => {
                let (Some(year), Some(month)) = (year, month) else {
                    return Err(CoreError::InvalidArgument(
                        "commissions leaderboard requires year and month".to_string(),
                    ));
                };
                let period = parse_period(year, month)?;
                reports::top_by_commissions(
                    &self.repo,
                    &self.config.commission_plan,
                    period,
                    limit as usize,
                )
                .await
            }
        }
    }

    async fn member_node(&self, member: &MemberId) -> Result<PlacementNode, CoreError> {
        self.repo
            .get_node_by_member(member)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("member {}", member)))
    }
}

fn parse_period(year: i32, month: u32) -> Result<Period, CoreError> {
    Period::new(year, month).ok_or_else(|| {
        CoreError::InvalidArgument(format!("{:04}-{:02} is not a calendar period", year, month))
    })
}

fn clamp_page(limit: Option<i64>) -> Result<i64, CoreError> {
    match limit {
        None => Ok(DEFAULT_PAGE),
        Some(limit) if limit < 1 => Err(CoreError::InvalidArgument(
            "limit must be positive".to_string(),
        )),
        Some(limit) => Ok(limit.min(MAX_PAGE)),
    }
}
