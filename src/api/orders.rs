use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_member_filter, parse_member_id, AppState};
use crate::domain::{Decimal, Order, OrderId, Period};
use crate::engine::propagation::{VolumeBucket, VolumeUpdate};
use crate::error::CoreError;
use crate::orchestration::{NewOrder, OrderReceipt};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOrderRequest {
    pub member_id: String,
    pub order_amount: Decimal,
    pub commissionable_value: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub order_id: String,
    pub member_id: String,
    pub order_amount: Decimal,
    pub commissionable_value: Decimal,
    pub status: &'static str,
    pub placed_at: i64,
    pub period: Period,
}

impl From<Order> for OrderDto {
    fn from(order: Order) -> Self {
        OrderDto {
            order_id: order.id.to_string(),
            member_id: order.member_id.to_string(),
            order_amount: order.order_amount,
            commissionable_value: order.commissionable_value,
            status: order.status.as_str(),
            placed_at: order.placed_at.as_ms(),
            period: order.period,
        }
    }
}

/// One counter delta the order's propagation applied.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedUpdateDto {
    pub node_id: i64,
    /// `own`, `left`, or `right`.
    pub bucket: &'static str,
    pub delta: Decimal,
}

impl From<&VolumeUpdate> for AppliedUpdateDto {
    fn from(update: &VolumeUpdate) -> Self {
        AppliedUpdateDto {
            node_id: update.node_id.as_i64(),
            bucket: match update.bucket {
                VolumeBucket::Own => "own",
                VolumeBucket::Side(slot) => slot.as_str(),
            },
            delta: update.delta,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceiptResponse {
    pub order: OrderDto,
    /// Root-first counter deltas, exactly as applied.
    pub applied: Vec<AppliedUpdateDto>,
}

impl From<OrderReceipt> for OrderReceiptResponse {
    fn from(receipt: OrderReceipt) -> Self {
        OrderReceiptResponse {
            applied: receipt.updates.iter().map(AppliedUpdateDto::from).collect(),
            order: receipt.order.into(),
        }
    }
}

pub async fn record_order(
    State(state): State<AppState>,
    Json(body): Json<RecordOrderRequest>,
) -> Result<Json<OrderReceiptResponse>, CoreError> {
    let member_id = parse_member_id(&body.member_id)?;
    let receipt = state
        .service
        .record_order(NewOrder {
            member_id,
            order_amount: body.order_amount,
            commissionable_value: body.commissionable_value,
        })
        .await?;
    Ok(Json(receipt.into()))
}

pub async fn reverse_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderReceiptResponse>, CoreError> {
    let receipt = state.service.reverse_order(&OrderId::new(id)).await?;
    Ok(Json(receipt.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersQuery {
    pub member: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersResponse {
    pub orders: Vec<OrderDto>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<OrdersQuery>,
) -> Result<Json<OrdersResponse>, CoreError> {
    let member = parse_member_filter(params.member.as_deref())?;
    let orders = state
        .service
        .recent_orders(member.as_ref(), params.limit)
        .await?;
    Ok(Json(OrdersResponse {
        orders: orders.into_iter().map(OrderDto::from).collect(),
    }))
}
