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

use parlor_db::models::LeaveOutcome;
use parlor_types::api::{
    Claims, CreateDmRequest, CreateDmResponse, CreateRoomRequest, LeaveRoomResponse, RoomIdRequest,
    RoomResponse, RoomsResponse, StatusResponse,
};
use parlor_types::models::RoomType;

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    pub room_id: Uuid,
}

/// `GET /rooms`: the caller's rooms, most recent activity first.
pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<RoomsResponse>> {
    let me = claims.sub.to_string();
    let rows = with_db(&state, move |db| Ok(db.list_rooms_for_user(&me)?)).await?;

    Ok(Json(RoomsResponse {
        rooms: rows.into_iter().map(convert::room).collect(),
    }))
}

/// `POST /rooms`: create a group room with the caller as admin.
pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateRoomRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("Room name is required"));
    }
    if req.room_type == RoomType::Dm {
        return Err(ApiError::bad_request("Use /create-dm for direct messages"));
    }
    let description = req
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let room_id = Uuid::new_v4().to_string();
    let me = claims.sub.to_string();
    let member_ids: Vec<String> = req.member_ids.iter().map(Uuid::to_string).collect();

    let row = with_db(&state, move |db| {
        let missing = db.missing_users(&member_ids)?;
        if !missing.is_empty() {
            return Err(ApiError::not_found(format!("Unknown users: {}", missing.join(", "))));
        }
        db.create_room(&room_id, &name, description.as_deref(), RoomType::Group.as_str(), &me, &member_ids)?;
        db.get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("room vanished after insert")))
    })
    .await?;

    info!("User {} created room {}", claims.sub, row.id);
    Ok((
        StatusCode::CREATED,
        Json(RoomResponse {
            room: convert::room(row),
        }),
    ))
}

/// `PUT /rooms`: join a group room.
pub async fn join_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<RoomIdRequest>, ApiError>,
) -> ApiResult<Json<RoomResponse>> {
    let room_id = req.room_id.to_string();
    let me = claims.sub.to_string();

    let row = with_db(&state, move |db| {
        let room = db
            .get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::not_found("Room not found"))?;
        if room.room_type == RoomType::Dm.as_str() {
            return Err(ApiError::forbidden("Direct messages cannot be joined"));
        }
        if !db.add_member(&room_id, &me)? {
            return Err(ApiError::conflict("Already a member of this room"));
        }
        db.get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::not_found("Room not found"))
    })
    .await?;

    Ok(Json(RoomResponse {
        room: convert::room(row),
    }))
}

/// `DELETE /rooms?roomId=`: leave a group room.
pub async fn leave_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<RoomQuery>, ApiError>,
) -> ApiResult<Json<LeaveRoomResponse>> {
    let room_id = query.room_id.to_string();
    let me = claims.sub.to_string();

    let outcome = with_db(&state, move |db| {
        let room = db
            .get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::not_found("Room not found"))?;
        if room.room_type == RoomType::Dm.as_str() {
            return Err(ApiError::bad_request("Direct messages cannot be left; delete them instead"));
        }
        Ok(db.leave_room(&room_id, &me)?)
    })
    .await?;

    let response = match outcome {
        LeaveOutcome::NotMember => return Err(ApiError::not_found("Not a member of this room")),
        LeaveOutcome::Left => LeaveRoomResponse {
            success: true,
            room_deleted: false,
            new_admin_id: None,
        },
        LeaveOutcome::AdminTransferred(next) => LeaveRoomResponse {
            success: true,
            room_deleted: false,
            new_admin_id: Some(convert::parse_uuid(&next, "new admin id")),
        },
        LeaveOutcome::RoomDeleted => {
            info!("Room {} deleted after its last member left", query.room_id);
            LeaveRoomResponse {
                success: true,
                room_deleted: true,
                new_admin_id: None,
            }
        }
    };
    Ok(Json(response))
}

/// `POST /create-dm`: return the DM shared with the target, creating it if needed.
pub async fn create_dm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateDmRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    if req.target_user_id == claims.sub {
        return Err(ApiError::bad_request("Cannot start a direct message with yourself"));
    }

    let me = claims.sub.to_string();
    let target = req.target_user_id.to_string();
    let new_id = Uuid::new_v4().to_string();

    let (row, is_new) = with_db(&state, move |db| {
        let target_user = db
            .get_user_by_id(&target)?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        let (room_id, is_new) = db.find_or_create_dm(&new_id, &me, &target, &target_user.name)?;
        let row = db
            .get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("dm room vanished")))?;
        Ok((row, is_new))
    })
    .await?;

    let status = if is_new { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(CreateDmResponse {
            room: convert::room(row),
            is_new,
        }),
    ))
}

/// `DELETE /delete-room?roomId=`: group rooms by their admin, DMs by either member.
pub async fn delete_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<RoomQuery>, ApiError>,
) -> ApiResult<Json<StatusResponse>> {
    let room_id = query.room_id.to_string();
    let me = claims.sub.to_string();

    with_db(&state, move |db| {
        let room = db
            .get_room(&room_id, &me)?
            .ok_or_else(|| ApiError::not_found("Room not found"))?;
        if !db.is_member(&room_id, &me)? {
            return Err(ApiError::forbidden("Not a member of this room"));
        }
        if room.room_type == RoomType::Group.as_str() && room.admin_id != me {
            return Err(ApiError::forbidden("Only the room admin can delete this room"));
        }
        db.delete_room(&room_id)?;
        Ok(())
    })
    .await?;

    info!("User {} deleted room {}", claims.sub, query.room_id);
    Ok(Json(StatusResponse {
        success: true,
        message: "Room deleted".into(),
    }))
}
