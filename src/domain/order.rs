//! Order: a completed purchase, the sole source of volume and of
//! commission qualification.

use crate::domain::{Decimal, MemberId, Period, TimeMs};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable order identity (uuid v4, text form).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: String) -> Self {
        OrderId(id)
    }

    /// Mint a fresh random order id.
    pub fn generate() -> Self {
        OrderId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order lifecycle. A reversed order keeps its row (auditable) but no longer
/// qualifies for commissions; its volume delta has been subtracted back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Completed,
    Reversed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Completed => "completed",
            OrderStatus::Reversed => "reversed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(OrderStatus::Completed),
            "reversed" => Some(OrderStatus::Reversed),
            _ => None,
        }
    }
}

/// A recorded purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub member_id: MemberId,
    /// Volume applied to the placement tree.
    pub order_amount: Decimal,
    /// Base for commission percentages; may differ from the volume amount.
    pub commissionable_value: Decimal,
    pub status: OrderStatus,
    pub placed_at: TimeMs,
    /// Evaluation period the order falls into (UTC calendar of `placed_at`).
    pub period: Period,
}

impl Order {
    /// Create a completed order with a minted id, deriving the period from
    /// the placement timestamp.
    pub fn new(
        member_id: MemberId,
        order_amount: Decimal,
        commissionable_value: Decimal,
        placed_at: TimeMs,
    ) -> Self {
        Order {
            id: OrderId::generate(),
            member_id,
            order_amount,
            commissionable_value,
            status: OrderStatus::Completed,
            placed_at,
            period: Period::from_time(placed_at),
        }
    }
}
