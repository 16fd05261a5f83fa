use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use parlor_db::Database;
use parlor_types::api::{Claims, ReactionAck, ReactionAction, ReactionRequest, ReactionsResponse};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::messages::MessageQuery;
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionQuery {
    pub message_id: Uuid,
    pub emoji: String,
}

/// `GET /reactions?messageId=`: grouped by emoji, first reaction first.
pub async fn get_reactions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<MessageQuery>, ApiError>,
) -> ApiResult<Json<ReactionsResponse>> {
    let message_id = query.message_id.to_string();
    let me = claims.sub.to_string();

    let rows = with_db(&state, move |db| {
        ensure_message_access(db, &message_id, &me)?;
        Ok(db.get_reactions_for_messages(&[message_id])?)
    })
    .await?;

    let total = rows.len();
    let reactions = convert::group_reactions(rows)
        .into_values()
        .next()
        .unwrap_or_default();

    Ok(Json(ReactionsResponse { reactions, total }))
}

/// `POST /reactions`
pub async fn add_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<ReactionRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let emoji = req.emoji.trim().to_string();
    if emoji.is_empty() {
        return Err(ApiError::bad_request("Emoji is required"));
    }

    let message_id = req.message_id.to_string();
    let me = claims.sub.to_string();
    let reaction_id = Uuid::new_v4().to_string();

    let added = with_db(&state, move |db| {
        ensure_message_access(db, &message_id, &me)?;
        Ok(db.add_reaction(&reaction_id, &message_id, &me, &emoji)?)
    })
    .await?;

    let (status, action) = if added {
        (StatusCode::CREATED, ReactionAction::Added)
    } else {
        (StatusCode::OK, ReactionAction::AlreadyExists)
    };
    Ok((status, Json(ReactionAck { success: true, action })))
}

/// `DELETE /reactions?messageId=&emoji=`
pub async fn remove_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<ReactionQuery>, ApiError>,
) -> ApiResult<Json<ReactionAck>> {
    let message_id = query.message_id.to_string();
    let emoji = query.emoji.trim().to_string();
    let me = claims.sub.to_string();

    with_db(&state, move |db| {
        ensure_message_access(db, &message_id, &me)?;
        if !db.remove_reaction(&message_id, &me, &emoji)? {
            return Err(ApiError::not_found("Reaction not found"));
        }
        Ok(())
    })
    .await?;

    Ok(Json(ReactionAck {
        success: true,
        action: ReactionAction::Removed,
    }))
}

/// Message must exist and the user must belong to its room.
fn ensure_message_access(db: &Database, message_id: &str, user_id: &str) -> ApiResult<()> {
    let message = db
        .get_message(message_id)?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;
    if !db.is_member(&message.room_id, user_id)? {
        return Err(ApiError::forbidden("Not a member of this room"));
    }
    Ok(())
}
