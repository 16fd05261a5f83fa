use axum::{
    Extension, Json,
    extract::{Query, State},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use parlor_types::api::{Claims, PresenceRequest, PresenceResponse, StatusResponse, UsersResponse};
use parlor_types::models::PresenceStatus;

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceQuery {
    #[serde(default)]
    pub room_id: Option<Uuid>,
}

/// `GET /presence[?roomId=]`: everyone but the caller, online first.
pub async fn list_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<PresenceQuery>, ApiError>,
) -> ApiResult<Json<UsersResponse>> {
    let me = claims.sub.to_string();
    let room_id = query.room_id.map(|id| id.to_string());

    let rows = with_db(&state, move |db| {
        if let Some(room) = room_id.as_deref() {
            if !db.is_member(room, &me)? {
                return Err(ApiError::forbidden("Not a member of this room"));
            }
        }
        Ok(db.list_presence(&me, room_id.as_deref())?)
    })
    .await?;

    Ok(Json(UsersResponse {
        users: rows.into_iter().map(|r| convert::user(r, false)).collect(),
    }))
}

/// `POST /presence`
pub async fn set_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<PresenceRequest>, ApiError>,
) -> ApiResult<Json<PresenceResponse>> {
    let me = claims.sub.to_string();
    let online = req.status == PresenceStatus::Online;
    with_db(&state, move |db| Ok(db.set_online(&me, online)?)).await?;

    Ok(Json(PresenceResponse { status: req.status }))
}

/// `PUT /presence`: heartbeat, refreshes last seen only.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<StatusResponse>> {
    let me = claims.sub.to_string();
    with_db(&state, move |db| Ok(db.touch_last_seen(&me)?)).await?;

    Ok(Json(StatusResponse {
        success: true,
        message: "Heartbeat recorded".into(),
    }))
}
