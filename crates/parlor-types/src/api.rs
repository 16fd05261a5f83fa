use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Member, Message, MessageKind, PresenceStatus, ReactionGroup, Room, RoomType, User};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the auth handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Errors --

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Generic acknowledgement for mutations that return no entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

// -- Auth --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AuthRequest {
    Register {
        email: String,
        password: String,
        name: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    Login {
        email: String,
        password: String,
    },
    Logout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchUsersRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

// -- Rooms --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsResponse {
    pub rooms: Vec<Room>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room: Room,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub room_type: RoomType,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomIdRequest {
    pub room_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDmRequest {
    pub target_user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDmResponse {
    pub room: Room,
    #[serde(rename = "isNew")]
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersResponse {
    pub members: Vec<Member>,
    pub room: Room,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub room_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberResponse {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAdminRequest {
    pub room_id: Uuid,
    pub new_admin_id: Uuid,
}

/// Result of leaving a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRoomResponse {
    pub success: bool,
    /// Set when the room was deleted because the caller was its last member.
    #[serde(default)]
    pub room_deleted: bool,
    /// Set when the caller was admin and the role moved to another member.
    #[serde(default)]
    pub new_admin_id: Option<Uuid>,
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub room_id: Uuid,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkMessagesReadRequest {
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkMessagesReadResponse {
    pub updated_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardMessageRequest {
    pub message_id: Uuid,
    pub target_room_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileRequest {
    /// Base64 (standard alphabet) encoded file bytes.
    pub file_data: String,
    pub file_name: String,
    pub file_type: String,
    pub room_id: Uuid,
}

// -- Reactions --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    pub message_id: Uuid,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionsResponse {
    pub reactions: Vec<ReactionGroup>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Added,
    AlreadyExists,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionAck {
    pub success: bool,
    pub action: ReactionAction,
}

// -- Presence --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRequest {
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub status: PresenceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_request_is_tagged_by_action() {
        let login: AuthRequest = serde_json::from_value(serde_json::json!({
            "action": "login",
            "email": "ada@example.com",
            "password": "hunter22"
        }))
        .unwrap();
        assert!(matches!(login, AuthRequest::Login { ref email, .. } if email == "ada@example.com"));

        let logout: AuthRequest = serde_json::from_str(r#"{"action":"logout"}"#).unwrap();
        assert!(matches!(logout, AuthRequest::Logout));
    }

    #[test]
    fn requests_use_camel_case_keys() {
        let room_id = Uuid::new_v4();
        let body = serde_json::to_value(SendMessageRequest {
            room_id,
            content: "hi".into(),
            kind: MessageKind::Text,
        })
        .unwrap();
        assert_eq!(body["roomId"], serde_json::json!(room_id));
        assert_eq!(body["type"], "text");

        let create: CreateRoomRequest =
            serde_json::from_str(r#"{"name":"ops","memberIds":[]}"#).unwrap();
        assert_eq!(create.room_type, RoomType::Group);
        assert!(create.description.is_none());
    }

    #[test]
    fn reaction_actions_are_snake_case() {
        let ack: ReactionAck =
            serde_json::from_str(r#"{"success":true,"action":"already_exists"}"#).unwrap();
        assert_eq!(ack.action, ReactionAction::AlreadyExists);
    }
}
