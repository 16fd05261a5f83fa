use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use parlor_types::SEARCH_RESULT_LIMIT;
use parlor_types::api::{
    Claims, ForwardMessageRequest, MarkMessagesReadRequest, MarkMessagesReadResponse, MessageResponse,
    MessagesResponse, RoomIdRequest, SendMessageRequest, StatusResponse,
};
use parlor_types::models::{FileContent, MessageKind};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::rooms::RoomQuery;
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQuery {
    pub message_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub room_id: Uuid,
    #[serde(default)]
    pub q: String,
}

/// `GET /messages?roomId=`: full history, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<RoomQuery>, ApiError>,
) -> ApiResult<Json<MessagesResponse>> {
    let room_id = query.room_id.to_string();
    let me = claims.sub.to_string();

    let messages = with_db(&state, move |db| {
        if !db.is_member(&room_id, &me)? {
            return Err(ApiError::forbidden("Not a member of this room"));
        }
        let rows = db.get_messages(&room_id)?;
        Ok(convert::messages(db, rows)?)
    })
    .await?;

    Ok(Json(MessagesResponse { messages }))
}

/// `POST /messages`
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("Message content is required"));
    }
    if req.kind == MessageKind::File {
        return Err(ApiError::bad_request("Use /upload-file to send files"));
    }

    let room_id = req.room_id.to_string();
    let me = claims.sub.to_string();
    let message_id = Uuid::new_v4().to_string();

    let message = with_db(&state, move |db| {
        if !db.is_member(&room_id, &me)? {
            return Err(ApiError::forbidden("Not a member of this room"));
        }
        db.insert_message(&message_id, &room_id, &me, &req.content, req.kind.as_str())?;
        load_one(db, &message_id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

/// `PUT /messages`: read receipts for the caller.
pub async fn mark_messages_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<MarkMessagesReadRequest>, ApiError>,
) -> ApiResult<Json<MarkMessagesReadResponse>> {
    if req.message_ids.is_empty() {
        return Err(ApiError::bad_request("messageIds is required"));
    }

    let me = claims.sub.to_string();
    let ids: Vec<String> = req.message_ids.iter().map(Uuid::to_string).collect();
    let updated_count = with_db(&state, move |db| Ok(db.mark_messages_read(&me, &ids)?)).await?;

    Ok(Json(MarkMessagesReadResponse { updated_count }))
}

/// `DELETE /messages?messageId=`: authors only.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<MessageQuery>, ApiError>,
) -> ApiResult<Json<StatusResponse>> {
    let message_id = query.message_id.to_string();
    let me = claims.sub.to_string();

    with_db(&state, move |db| {
        let message = db
            .get_message(&message_id)?
            .ok_or_else(|| ApiError::not_found("Message not found"))?;
        if message.user_id != me {
            return Err(ApiError::forbidden("Only the author can delete this message"));
        }
        db.delete_message(&message_id)?;
        Ok(())
    })
    .await?;

    Ok(Json(StatusResponse {
        success: true,
        message: "Message deleted".into(),
    }))
}

/// `GET /messages-search?roomId=&q=`
pub async fn search_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<SearchQuery>, ApiError>,
) -> ApiResult<Json<MessagesResponse>> {
    let needle = query.q.trim().to_string();
    if needle.is_empty() {
        return Err(ApiError::bad_request("Search query is required"));
    }

    let room_id = query.room_id.to_string();
    let me = claims.sub.to_string();

    let messages = with_db(&state, move |db| {
        if !db.is_member(&room_id, &me)? {
            return Err(ApiError::forbidden("Not a member of this room"));
        }
        let rows = db.search_messages(&room_id, &needle, SEARCH_RESULT_LIMIT)?;
        Ok(convert::messages(db, rows)?)
    })
    .await?;

    Ok(Json(MessagesResponse { messages }))
}

/// `POST /messages-forward`: repost a message as text in another room.
pub async fn forward_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<ForwardMessageRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let source_id = req.message_id.to_string();
    let target_room = req.target_room_id.to_string();
    let me = claims.sub.to_string();
    let message_id = Uuid::new_v4().to_string();

    let message = with_db(&state, move |db| {
        let source = db
            .get_message(&source_id)?
            .ok_or_else(|| ApiError::not_found("Message not found"))?;
        if !db.is_member(&source.room_id, &me)? {
            return Err(ApiError::forbidden("No access to the original message"));
        }
        if !db.is_member(&target_room, &me)? {
            return Err(ApiError::forbidden("Not a member of the target room"));
        }

        let content = forwarded_content(&source.user_name, &source.kind, &source.content);
        db.insert_message(&message_id, &target_room, &me, &content, MessageKind::Text.as_str())?;
        load_one(db, &message_id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

/// `POST /mark-read`: move the caller's read marker for a room to now.
pub async fn mark_room_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<RoomIdRequest>, ApiError>,
) -> ApiResult<Json<StatusResponse>> {
    let room_id = req.room_id.to_string();
    let me = claims.sub.to_string();

    with_db(&state, move |db| {
        if !db.mark_room_read(&room_id, &me)? {
            return Err(ApiError::forbidden("Not a member of this room"));
        }
        Ok(())
    })
    .await?;

    Ok(Json(StatusResponse {
        success: true,
        message: "Room marked as read".into(),
    }))
}

/// File messages forward as a `[file] <name>` line since the data URL stays
/// with the original room.
fn forwarded_content(author: &str, kind: &str, content: &str) -> String {
    let body = match MessageKind::parse(kind) {
        Some(MessageKind::File) => {
            let name = serde_json::from_str::<FileContent>(content)
                .map(|c| c.file.name)
                .unwrap_or_else(|_| "attachment".to_string());
            format!("[file] {}", name)
        }
        _ => content.to_string(),
    };
    format!("Forwarded from {}:\n{}", author, body)
}

pub(crate) fn load_one(db: &parlor_db::Database, id: &str) -> ApiResult<parlor_types::models::Message> {
    let row = db
        .get_message(id)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("message {} vanished after insert", id)))?;
    convert::messages(db, vec![row])?
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("message {} lost in conversion", id)))
}
