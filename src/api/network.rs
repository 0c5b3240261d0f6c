use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_member_filter, parse_member_id, AppState};
use crate::engine::downline::SnapshotNode;
use crate::error::CoreError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotQuery {
    /// Subtree root; omit for the network root.
    pub member: Option<String>,
    pub max_depth: Option<i64>,
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Query(params): Query<SnapshotQuery>,
) -> Result<Json<SnapshotNode>, CoreError> {
    let member = parse_member_filter(params.member.as_deref())?;
    let snapshot = state
        .service
        .network_snapshot(member.as_ref(), params.max_depth)
        .await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSizeQuery {
    pub member: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSizeResponse {
    pub member_id: String,
    pub team_size: u64,
}

pub async fn get_team_size(
    State(state): State<AppState>,
    Query(params): Query<TeamSizeQuery>,
) -> Result<Json<TeamSizeResponse>, CoreError> {
    let member = parse_member_id(&params.member)?;
    let team_size = state.service.team_size(&member).await?;
    Ok(Json(TeamSizeResponse {
        member_id: member.to_string(),
        team_size,
    }))
}
