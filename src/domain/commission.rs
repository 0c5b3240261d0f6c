//! Commission records and their status lifecycle.
//!
//! A record is created `Pending` by period evaluation, moves to `Approved`
//! or `Rejected` through the external approval workflow, and to `Paid` only
//! from `Approved`. `Paid` and `Rejected` are terminal. The
//! `(source_order, beneficiary, type)` triple is unique, which is what makes
//! re-evaluation idempotent.

use crate::domain::{Decimal, MemberId, OrderId, Period, TimeMs};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable commission record identity (uuid v4, text form).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommissionId(pub String);

impl CommissionId {
    pub fn new(id: String) -> Self {
        CommissionId(id)
    }

    pub fn generate() -> Self {
        CommissionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commission tier, keyed by relationship depth between source and
/// beneficiary: depth 1 is `Direct`, depth 2 is `LevelTwo`, deeper tiers are
/// `Level(n)` when the plan configures them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommissionType {
    Direct,
    LevelTwo,
    /// Configured tier deeper than two (depth >= 3).
    Level(u8),
}

impl Serialize for CommissionType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_db_str())
    }
}

impl<'de> Deserialize<'de> for CommissionType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CommissionType::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown commission type: {}", s)))
    }
}

impl CommissionType {
    /// Canonical tier for a relationship depth. Depth 0 is not a tier.
    pub fn from_depth(depth: u8) -> Option<Self> {
        match depth {
            0 => None,
            1 => Some(CommissionType::Direct),
            2 => Some(CommissionType::LevelTwo),
            n => Some(CommissionType::Level(n)),
        }
    }

    /// Relationship depth this tier pays on.
    pub fn depth(&self) -> u8 {
        match self {
            CommissionType::Direct => 1,
            CommissionType::LevelTwo => 2,
            CommissionType::Level(n) => *n,
        }
    }

    /// Storage/wire representation: `direct`, `level2`, `level{n}`.
    pub fn as_db_str(&self) -> String {
        match self {
            CommissionType::Direct => "direct".to_string(),
            CommissionType::LevelTwo => "level2".to_string(),
            CommissionType::Level(n) => format!("level{}", n),
        }
    }

    /// Parse the storage representation, rejecting non-canonical spellings
    /// (`level1` must be written `direct`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(CommissionType::Direct),
            "level2" => Some(CommissionType::LevelTwo),
            _ => {
                let n: u8 = s.strip_prefix("level")?.parse().ok()?;
                if n >= 3 {
                    Some(CommissionType::Level(n))
                } else {
                    None
                }
            }
        }
    }
}

impl std::fmt::Display for CommissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_db_str())
    }
}

/// Commission status state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Approved => "approved",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommissionStatus::Pending),
            "approved" => Some(CommissionStatus::Approved),
            "paid" => Some(CommissionStatus::Paid),
            "rejected" => Some(CommissionStatus::Rejected),
            _ => None,
        }
    }

    /// True for states no record may leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommissionStatus::Paid | CommissionStatus::Rejected)
    }

    /// Whether the edge `self -> to` is allowed. No skips (`Pending` cannot
    /// jump to `Paid`), no self-loops, no leaving a terminal state.
    pub fn can_transition(&self, to: CommissionStatus) -> bool {
        use CommissionStatus::*;
        matches!(
            (self, to),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Paid) | (Approved, Rejected)
        )
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single materialized commission entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRecord {
    pub id: CommissionId,
    pub beneficiary_member_id: MemberId,
    /// Whose activity generated the commission.
    pub source_member_id: MemberId,
    pub source_order_id: OrderId,
    pub amount: Decimal,
    pub commission_type: CommissionType,
    pub status: CommissionStatus,
    pub period: Period,
    pub created_at: TimeMs,
}

impl CommissionRecord {
    /// Build a fresh `Pending` record with a minted id.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        beneficiary_member_id: MemberId,
        source_member_id: MemberId,
        source_order_id: OrderId,
        amount: Decimal,
        commission_type: CommissionType,
        period: Period,
        created_at: TimeMs,
    ) -> Self {
        CommissionRecord {
            id: CommissionId::generate(),
            beneficiary_member_id,
            source_member_id,
            source_order_id,
            amount,
            commission_type,
            status: CommissionStatus::Pending,
            period,
            created_at,
        }
    }
}
