use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::info;
use uuid::Uuid;

use parlor_db::models::FileRow;
use parlor_types::MAX_FILE_BYTES;
use parlor_types::api::{Claims, MessageResponse, UploadFileRequest};
use parlor_types::models::{FileContent, FileDescriptor};

use crate::error::{ApiError, ApiResult};
use crate::messages::load_one;
use crate::state::{AppState, with_db};

/// `POST /upload-file`: store the bytes as a data URL and post a `file` message.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<UploadFileRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let file_name = req.file_name.trim().to_string();
    let file_type = req.file_type.trim().to_string();
    if req.file_data.is_empty() || file_name.is_empty() || file_type.is_empty() {
        return Err(ApiError::bad_request("fileData, fileName and fileType are required"));
    }

    let bytes = B64
        .decode(req.file_data.as_bytes())
        .map_err(|_| ApiError::bad_request("fileData is not valid base64"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("File is empty"));
    }
    if bytes.len() > MAX_FILE_BYTES {
        return Err(ApiError::bad_request(format!(
            "File exceeds the {} MiB limit",
            MAX_FILE_BYTES / (1024 * 1024)
        )));
    }

    let file_id = Uuid::new_v4();
    let descriptor = FileDescriptor {
        id: file_id,
        name: file_name,
        mime: file_type,
        size: bytes.len() as u64,
        url: format!("data:{};base64,{}", req.file_type.trim(), req.file_data),
    };
    let content = serde_json::to_string(&FileContent {
        file: descriptor.clone(),
    })
    .map_err(|e| ApiError::Internal(e.into()))?;

    let row = FileRow {
        id: file_id.to_string(),
        name: descriptor.name.clone(),
        file_type: descriptor.mime.clone(),
        size: bytes.len() as i64,
        url: descriptor.url,
        uploaded_by: claims.sub.to_string(),
        room_id: req.room_id.to_string(),
    };
    let message_id = Uuid::new_v4().to_string();

    let message = with_db(&state, move |db| {
        if !db.is_member(&row.room_id, &row.uploaded_by)? {
            return Err(ApiError::forbidden("Not a member of this room"));
        }
        db.insert_file_message(&row, &message_id, &content)?;
        load_one(db, &message_id)
    })
    .await?;

    info!(
        "User {} uploaded '{}' ({} bytes) to room {}",
        claims.sub, descriptor.name, descriptor.size, req.room_id
    );
    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}
