use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_member_filter, parse_member_id, AppState};
use crate::domain::{
    CommissionId, CommissionRecord, CommissionStatus, CommissionType, Decimal, Period,
};
use crate::engine::evaluation::{CommissionSummary, EvaluationOutcome};
use crate::error::CoreError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub member_id: String,
    pub year: i32,
    pub month: u32,
}

pub async fn evaluate(
    State(state): State<AppState>,
    Json(body): Json<EvaluateRequest>,
) -> Result<Json<EvaluationOutcome>, CoreError> {
    let member = parse_member_id(&body.member_id)?;
    let outcome = state
        .service
        .evaluate(&member, body.year, body.month)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionDto {
    pub commission_id: String,
    pub beneficiary_member_id: String,
    pub source_member_id: String,
    pub source_order_id: String,
    pub amount: Decimal,
    pub commission_type: CommissionType,
    pub status: CommissionStatus,
    pub period: Period,
    pub created_at: i64,
}

impl From<CommissionRecord> for CommissionDto {
    fn from(record: CommissionRecord) -> Self {
        CommissionDto {
            commission_id: record.id.to_string(),
            beneficiary_member_id: record.beneficiary_member_id.to_string(),
            source_member_id: record.source_member_id.to_string(),
            source_order_id: record.source_order_id.to_string(),
            amount: record.amount,
            commission_type: record.commission_type,
            status: record.status,
            period: record.period,
            created_at: record.created_at.as_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: String,
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<CommissionDto>, CoreError> {
    let status = CommissionStatus::parse(&body.status).ok_or_else(|| {
        CoreError::InvalidArgument(format!(
            "status must be pending, approved, paid or rejected, got '{}'",
            body.status
        ))
    })?;
    let record = state
        .service
        .transition_commission(&CommissionId::new(id), status)
        .await?;
    Ok(Json(record.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionsQuery {
    pub member: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionsResponse {
    pub commissions: Vec<CommissionDto>,
}

pub async fn list_commissions(
    State(state): State<AppState>,
    Query(params): Query<CommissionsQuery>,
) -> Result<Json<CommissionsResponse>, CoreError> {
    let member = parse_member_filter(params.member.as_deref())?;
    let status = params
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|raw| {
            CommissionStatus::parse(raw)
                .ok_or_else(|| CoreError::InvalidArgument(format!("unknown status '{}'", raw)))
        })
        .transpose()?;
    let records = state
        .service
        .list_commissions(member.as_ref(), status, params.limit, params.offset)
        .await?;
    Ok(Json(CommissionsResponse {
        commissions: records.into_iter().map(CommissionDto::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    pub member: String,
    pub year: i32,
    pub month: u32,
}

pub async fn get_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<CommissionSummary>, CoreError> {
    let member = parse_member_id(&params.member)?;
    let summary = state
        .service
        .commission_summary(&member, params.year, params.month)
        .await?;
    Ok(Json(summary))
}
