pub mod commissions;
pub mod health;
pub mod leaderboard;
pub mod members;
pub mod network;
pub mod orders;

use crate::domain::MemberId;
use crate::error::CoreError;
use crate::orchestration::NetworkService;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NetworkService>,
}

impl AppState {
    pub fn new(service: Arc<NetworkService>) -> Self {
        Self { service }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/members", post(members::place_member))
        .route(
            "/v1/orders",
            post(orders::record_order).get(orders::list_orders),
        )
        .route("/v1/orders/:id/reverse", post(orders::reverse_order))
        .route("/v1/commissions/evaluate", post(commissions::evaluate))
        .route("/v1/commissions/:id/status", post(commissions::update_status))
        .route("/v1/commissions", get(commissions::list_commissions))
        .route("/v1/commissions/summary", get(commissions::get_summary))
        .route("/v1/network/snapshot", get(network::get_snapshot))
        .route("/v1/team/size", get(network::get_team_size))
        .route("/v1/leaderboard", get(leaderboard::get_leaderboard))
        .layer(cors)
        .with_state(state)
}

/// Member ids are caller-supplied identifiers: non-empty, at most 64
/// characters, no whitespace.
pub(crate) fn parse_member_id(raw: &str) -> Result<MemberId, CoreError> {
    if raw.is_empty() || raw.len() > 64 || raw.chars().any(|c| c.is_whitespace()) {
        return Err(CoreError::InvalidArgument(format!(
            "invalid member id '{}'",
            raw
        )));
    }
    Ok(MemberId::new(raw.to_string()))
}

/// Optional `member=` query values: absent or blank means no filter.
pub(crate) fn parse_member_filter(raw: Option<&str>) -> Result<Option<MemberId>, CoreError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_member_id(raw).map(Some),
    }
}
