use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use parlor_types::api::{
    AddMemberRequest, AddMemberResponse, Claims, MembersResponse, RoomResponse, StatusResponse,
    TransferAdminRequest,
};
use parlor_types::models::RoomType;

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::rooms::RoomQuery;
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberQuery {
    pub room_id: Uuid,
    pub user_id: Uuid,
}

/// `GET /room-members?roomId=`
pub async fn list_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<RoomQuery>, ApiError>,
) -> ApiResult<Json<MembersResponse>> {
    let room_id = query.room_id.to_string();
    let me = claims.sub.to_string();

    let (room, members) = with_db(&state, move |db| {
        let room = db
            .get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::not_found("Room not found"))?;
        if !db.is_member(&room_id, &me)? {
            return Err(ApiError::forbidden("Not a member of this room"));
        }
        let members = db.list_members(&room_id)?;
        Ok((room, members))
    })
    .await?;

    let admin_id = room.admin_id.clone();
    Ok(Json(MembersResponse {
        members: members
            .into_iter()
            .map(|m| convert::member(m, &admin_id))
            .collect(),
        room: convert::room(room),
    }))
}

/// `POST /room-members`: any member may add users to a group room.
pub async fn add_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<AddMemberRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let room_id = req.room_id.to_string();
    let user_id = req.user_id.to_string();
    let me = claims.sub.to_string();

    let user = with_db(&state, move |db| {
        let room = db
            .get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::not_found("Room not found"))?;
        if !db.is_member(&room_id, &me)? {
            return Err(ApiError::forbidden("Not a member of this room"));
        }
        if room.room_type == RoomType::Dm.as_str() {
            return Err(ApiError::bad_request("Members cannot be added to a direct message"));
        }
        let user = db
            .get_user_by_id(&user_id)?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        if !db.add_member(&room_id, &user_id)? {
            return Err(ApiError::conflict("User is already a member"));
        }
        Ok(user)
    })
    .await?;

    info!("User {} added {} to room {}", claims.sub, req.user_id, req.room_id);
    Ok((
        StatusCode::CREATED,
        Json(AddMemberResponse {
            user: convert::user(user, false),
        }),
    ))
}

/// `DELETE /room-members?roomId=&userId=`: admin removes another member.
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<MemberQuery>, ApiError>,
) -> ApiResult<Json<StatusResponse>> {
    if query.user_id == claims.sub {
        return Err(ApiError::bad_request("Use leave to remove yourself"));
    }

    let room_id = query.room_id.to_string();
    let user_id = query.user_id.to_string();
    let me = claims.sub.to_string();

    with_db(&state, move |db| {
        let room = db
            .get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::not_found("Room not found"))?;
        if room.admin_id != me {
            return Err(ApiError::forbidden("Only the room admin can remove members"));
        }
        if !db.remove_member(&room_id, &user_id)? {
            return Err(ApiError::not_found("User is not a member of this room"));
        }
        Ok(())
    })
    .await?;

    Ok(Json(StatusResponse {
        success: true,
        message: "Member removed".into(),
    }))
}

/// `POST /room-members-transfer-admin`
pub async fn transfer_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<TransferAdminRequest>, ApiError>,
) -> ApiResult<Json<RoomResponse>> {
    let room_id = req.room_id.to_string();
    let new_admin = req.new_admin_id.to_string();
    let me = claims.sub.to_string();

    let row = with_db(&state, move |db| {
        let room = db
            .get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::not_found("Room not found"))?;
        if room.admin_id != me {
            return Err(ApiError::forbidden("Only the room admin can transfer the role"));
        }
        if !db.is_member(&room_id, &new_admin)? {
            return Err(ApiError::bad_request("New admin must be a member of the room"));
        }
        db.set_admin(&room_id, &new_admin)?;
        db.get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::not_found("Room not found"))
    })
    .await?;

    info!("Room {} admin transferred to {}", req.room_id, req.new_admin_id);
    Ok(Json(RoomResponse {
        room: convert::room(row),
    }))
}
