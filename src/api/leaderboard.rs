use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::CoreError;
use crate::orchestration::{LeaderboardEntry, LeaderboardMetric};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardQuery {
    pub metric: String,
    pub limit: Option<i64>,
    /// Required for `metric=commissions`.
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub metric: String,
    pub entries: Vec<LeaderboardEntry>,
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, CoreError> {
    let metric = LeaderboardMetric::parse(params.metric.trim()).ok_or_else(|| {
        CoreError::InvalidArgument("metric must be volume or commissions".to_string())
    })?;
    let entries = state
        .service
        .leaderboard(metric, params.limit, params.year, params.month)
        .await?;
    Ok(Json(LeaderboardResponse {
        metric: params.metric.trim().to_string(),
        entries,
    }))
}
