pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::{CommissionPlan, Config};
pub use db::{init_db, DbPools, Repository};
pub use domain::{
    CommissionId, CommissionRecord, CommissionStatus, CommissionType, Decimal, MemberId, NodeId,
    Order, OrderId, Period, PlacementNode, Slot, TimeMs,
};
pub use engine::{CommissionEvaluator, DownlineWalker};
pub use error::CoreError;
pub use orchestration::{NetworkService, NewMember, NewOrder};
