use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::{CommissionStatus, Slot};

/// Error surface of the placement/commission core.
///
/// Structural and volume errors always leave state unchanged (the failing
/// transaction rolls back), so callers may retry once the condition is
/// resolved. `NotFound` and `InvalidTransition` indicate caller logic errors
/// and are never retried automatically.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("parent member not placed: {0}")]
    ParentNotFound(String),
    #[error("slot {slot} under node {parent} is occupied")]
    SlotOccupied { parent: i64, slot: Slot },
    #[error("member already placed: {0}")]
    MemberAlreadyPlaced(String),
    #[error("a root node already exists")]
    RootExists,
    #[error("volume underflow on node {0}: reversal would drive a counter negative")]
    VolumeUnderflow(i64),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: CommissionStatus,
        to: CommissionStatus,
    },
    #[error("order already reversed: {0}")]
    OrderAlreadyReversed(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoreError::NotFound(_) | CoreError::ParentNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::SlotOccupied { .. }
            | CoreError::MemberAlreadyPlaced(_)
            | CoreError::RootExists
            | CoreError::VolumeUnderflow(_)
            | CoreError::InvalidTransition { .. }
            | CoreError::OrderAlreadyReversed(_) => StatusCode::CONFLICT,
            CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CoreError::Internal(_) | CoreError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
