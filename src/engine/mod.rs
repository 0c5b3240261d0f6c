//! Core engines: volume propagation, downline traversal, and commission
//! evaluation. Everything here is either pure planning or iterative batch
//! reads; all writes go through the repository.

pub mod downline;
pub mod evaluation;
pub mod propagation;

pub use downline::{build_snapshot, find_open_slot, DownlineWalker, SnapshotNode};
pub use evaluation::{CommissionEvaluator, CommissionSummary, EvaluationOutcome};
pub use propagation::{plan_propagation, AncestorStep, VolumeBucket, VolumeUpdate};
