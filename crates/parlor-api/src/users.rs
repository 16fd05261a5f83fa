use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;

use parlor_types::api::{Claims, SearchUsersRequest, UpdateProfileRequest, UserResponse, UsersResponse};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, with_db};

const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 50;

/// `GET /users`: the caller's own profile.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserResponse>> {
    let id = claims.sub.to_string();
    let row = with_db(&state, move |db| Ok(db.get_user_by_id(&id)?))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse {
        user: convert::user(row, true),
    }))
}

/// `PUT /users`
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateProfileRequest>, ApiError>,
) -> ApiResult<Json<UserResponse>> {
    if req.name.is_none() && req.avatar.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }
    let name = req.name.map(|n| n.trim().to_string());
    if name.as_deref() == Some("") {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }

    let id = claims.sub.to_string();
    let row = with_db(&state, move |db| {
        Ok(db.update_profile(&id, name.as_deref(), req.avatar.as_deref())?)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse {
        user: convert::user(row, true),
    }))
}

/// `POST /users`: search other users by name or email.
pub async fn search_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<SearchUsersRequest>, ApiError>,
) -> ApiResult<Json<UsersResponse>> {
    let query = req.query.trim().to_string();
    if query.chars().count() < 2 {
        return Err(ApiError::bad_request("Search query must be at least 2 characters"));
    }
    let limit = req.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT) as usize;

    let me = claims.sub.to_string();
    let rows = with_db(&state, move |db| Ok(db.search_users(&me, &query, limit)?)).await?;

    Ok(Json(UsersResponse {
        users: rows.into_iter().map(|r| convert::user(r, false)).collect(),
    }))
}
