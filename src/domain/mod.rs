//! Domain types for the placement network core.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: MemberId, NodeId, TimeMs, Period
//! - Placement tree nodes, orders, and commission records
//! - The commission status state machine

pub mod commission;
pub mod decimal;
pub mod node;
pub mod order;
pub mod primitives;

pub use commission::{CommissionId, CommissionRecord, CommissionStatus, CommissionType};
pub use decimal::Decimal;
pub use node::{PlacementNode, Slot};
pub use order::{Order, OrderId, OrderStatus};
pub use primitives::{MemberId, NodeId, Period, TimeMs};
