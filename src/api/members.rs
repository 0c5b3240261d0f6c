use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_member_id, AppState};
use crate::domain::{Decimal, PlacementNode, Slot};
use crate::error::CoreError;
use crate::orchestration::NewMember;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceMemberRequest {
    pub member_id: String,
    pub sponsor_id: Option<String>,
    /// `left` or `right`; omit to create the root or with `spillover`.
    pub position: Option<String>,
    #[serde(default)]
    pub spillover: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDto {
    pub node_id: i64,
    pub member_id: String,
    pub parent_id: Option<i64>,
    pub position: Option<&'static str>,
    pub level: i64,
    pub own_volume: Decimal,
    pub left_volume: Decimal,
    pub right_volume: Decimal,
    pub total_volume: Decimal,
    pub created_at: i64,
}

impl From<PlacementNode> for NodeDto {
    fn from(node: PlacementNode) -> Self {
        NodeDto {
            node_id: node.id.as_i64(),
            member_id: node.member_id.to_string(),
            parent_id: node.parent_id.map(|id| id.as_i64()),
            position: node.position.map(|slot| slot.as_str()),
            level: node.level,
            own_volume: node.own_volume,
            left_volume: node.left_volume,
            right_volume: node.right_volume,
            total_volume: node.total_volume,
            created_at: node.created_at.as_ms(),
        }
    }
}

pub async fn place_member(
    State(state): State<AppState>,
    Json(body): Json<PlaceMemberRequest>,
) -> Result<Json<NodeDto>, CoreError> {
    let member_id = parse_member_id(&body.member_id)?;
    let sponsor_id = body
        .sponsor_id
        .as_deref()
        .map(parse_member_id)
        .transpose()?;
    let position = body
        .position
        .as_deref()
        .map(|raw| {
            Slot::parse(raw).ok_or_else(|| {
                CoreError::InvalidArgument(format!("position must be left or right, got '{}'", raw))
            })
        })
        .transpose()?;

    let node = state
        .service
        .place_member(NewMember {
            member_id,
            sponsor_id,
            position,
            spillover: body.spillover,
        })
        .await?;
    Ok(Json(node.into()))
}
