pub mod reports;
pub mod service;

pub use reports::{LeaderboardEntry, LeaderboardMetric};
pub use service::{NetworkService, NewMember, NewOrder, OrderReceipt};
