use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use parlor_types::api::{
    AddMemberRequest, AddMemberResponse, AuthRequest, AuthResponse, CreateDmRequest, CreateDmResponse,
    CreateRoomRequest, ForwardMessageRequest, LeaveRoomResponse, MarkMessagesReadRequest,
    MarkMessagesReadResponse, MembersResponse, MessageResponse, MessagesResponse, PresenceRequest,
    PresenceResponse, ReactionAck, ReactionRequest, ReactionsResponse, RoomIdRequest, RoomResponse,
    RoomsResponse, SearchUsersRequest, SendMessageRequest, StatusResponse, TransferAdminRequest,
    UpdateProfileRequest, UploadFileRequest, UserResponse, UsersResponse,
};
use parlor_types::models::{Message, PresenceStatus, Room, User};

use crate::error::ClientError;
use crate::transport::{ApiRequest, Transport};

/// Typed wrapper: one method per endpoint.
#[derive(Clone)]
pub struct ChatApi {
    transport: Arc<dyn Transport>,
}

impl ChatApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn set_token(&self, token: Option<String>) {
        self.transport.set_token(token);
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let value = self.transport.send(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    fn body(payload: &impl Serialize) -> Result<Value, ClientError> {
        Ok(serde_json::to_value(payload)?)
    }

    // -- Auth --

    pub async fn auth(&self, request: &AuthRequest) -> Result<AuthResponse, ClientError> {
        self.call(ApiRequest::post("/auth").json(Self::body(request)?)).await
    }

    pub async fn logout(&self) -> Result<StatusResponse, ClientError> {
        self.call(ApiRequest::post("/auth").json(Self::body(&AuthRequest::Logout)?))
            .await
    }

    // -- Users --

    pub async fn profile(&self) -> Result<User, ClientError> {
        let resp: UserResponse = self.call(ApiRequest::get("/users")).await?;
        Ok(resp.user)
    }

    pub async fn update_profile(&self, request: &UpdateProfileRequest) -> Result<User, ClientError> {
        let resp: UserResponse = self
            .call(ApiRequest::put("/users").json(Self::body(request)?))
            .await?;
        Ok(resp.user)
    }

    pub async fn search_users(&self, query: &str, limit: Option<u32>) -> Result<Vec<User>, ClientError> {
        let request = SearchUsersRequest {
            query: query.to_string(),
            limit,
        };
        let resp: UsersResponse = self
            .call(ApiRequest::post("/users").json(Self::body(&request)?))
            .await?;
        Ok(resp.users)
    }

    // -- Rooms --

    pub async fn list_rooms(&self) -> Result<Vec<Room>, ClientError> {
        let resp: RoomsResponse = self.call(ApiRequest::get("/rooms")).await?;
        Ok(resp.rooms)
    }

    pub async fn create_room(&self, request: &CreateRoomRequest) -> Result<Room, ClientError> {
        let resp: RoomResponse = self
            .call(ApiRequest::post("/rooms").json(Self::body(request)?))
            .await?;
        Ok(resp.room)
    }

    pub async fn join_room(&self, room_id: Uuid) -> Result<Room, ClientError> {
        let resp: RoomResponse = self
            .call(ApiRequest::put("/rooms").json(Self::body(&RoomIdRequest { room_id })?))
            .await?;
        Ok(resp.room)
    }

    pub async fn leave_room(&self, room_id: Uuid) -> Result<LeaveRoomResponse, ClientError> {
        self.call(ApiRequest::delete("/rooms").query("roomId", room_id))
            .await
    }

    pub async fn create_dm(&self, target_user_id: Uuid) -> Result<CreateDmResponse, ClientError> {
        let request = CreateDmRequest { target_user_id };
        self.call(ApiRequest::post("/create-dm").json(Self::body(&request)?))
            .await
    }

    pub async fn delete_room(&self, room_id: Uuid) -> Result<StatusResponse, ClientError> {
        self.call(ApiRequest::delete("/delete-room").query("roomId", room_id))
            .await
    }

    // -- Members --

    pub async fn list_members(&self, room_id: Uuid) -> Result<MembersResponse, ClientError> {
        self.call(ApiRequest::get("/room-members").query("roomId", room_id))
            .await
    }

    pub async fn add_member(&self, room_id: Uuid, user_id: Uuid) -> Result<User, ClientError> {
        let request = AddMemberRequest { room_id, user_id };
        let resp: AddMemberResponse = self
            .call(ApiRequest::post("/room-members").json(Self::body(&request)?))
            .await?;
        Ok(resp.user)
    }

    pub async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> Result<StatusResponse, ClientError> {
        self.call(
            ApiRequest::delete("/room-members")
                .query("roomId", room_id)
                .query("userId", user_id),
        )
        .await
    }

    pub async fn transfer_admin(&self, room_id: Uuid, new_admin_id: Uuid) -> Result<Room, ClientError> {
        let request = TransferAdminRequest { room_id, new_admin_id };
        let resp: RoomResponse = self
            .call(ApiRequest::post("/room-members-transfer-admin").json(Self::body(&request)?))
            .await?;
        Ok(resp.room)
    }

    // -- Messages --

    pub async fn list_messages(&self, room_id: Uuid) -> Result<Vec<Message>, ClientError> {
        let resp: MessagesResponse = self
            .call(ApiRequest::get("/messages").query("roomId", room_id))
            .await?;
        Ok(resp.messages)
    }

    pub async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ClientError> {
        let resp: MessageResponse = self
            .call(ApiRequest::post("/messages").json(Self::body(request)?))
            .await?;
        Ok(resp.message)
    }

    pub async fn mark_messages_read(&self, message_ids: Vec<Uuid>) -> Result<usize, ClientError> {
        let request = MarkMessagesReadRequest { message_ids };
        let resp: MarkMessagesReadResponse = self
            .call(ApiRequest::put("/messages").json(Self::body(&request)?))
            .await?;
        Ok(resp.updated_count)
    }

    pub async fn delete_message(&self, message_id: Uuid) -> Result<StatusResponse, ClientError> {
        self.call(ApiRequest::delete("/messages").query("messageId", message_id))
            .await
    }

    pub async fn search_messages(&self, room_id: Uuid, query: &str) -> Result<Vec<Message>, ClientError> {
        let resp: MessagesResponse = self
            .call(
                ApiRequest::get("/messages-search")
                    .query("roomId", room_id)
                    .query("q", query),
            )
            .await?;
        Ok(resp.messages)
    }

    pub async fn forward_message(&self, message_id: Uuid, target_room_id: Uuid) -> Result<Message, ClientError> {
        let request = ForwardMessageRequest {
            message_id,
            target_room_id,
        };
        let resp: MessageResponse = self
            .call(ApiRequest::post("/messages-forward").json(Self::body(&request)?))
            .await?;
        Ok(resp.message)
    }

    pub async fn mark_room_read(&self, room_id: Uuid) -> Result<StatusResponse, ClientError> {
        self.call(ApiRequest::post("/mark-read").json(Self::body(&RoomIdRequest { room_id })?))
            .await
    }

    pub async fn upload_file(&self, request: &UploadFileRequest) -> Result<Message, ClientError> {
        let resp: MessageResponse = self
            .call(ApiRequest::post("/upload-file").json(Self::body(request)?))
            .await?;
        Ok(resp.message)
    }

    // -- Reactions --

    pub async fn reactions(&self, message_id: Uuid) -> Result<ReactionsResponse, ClientError> {
        self.call(ApiRequest::get("/reactions").query("messageId", message_id))
            .await
    }

    pub async fn add_reaction(&self, message_id: Uuid, emoji: &str) -> Result<ReactionAck, ClientError> {
        let request = ReactionRequest {
            message_id,
            emoji: emoji.to_string(),
        };
        self.call(ApiRequest::post("/reactions").json(Self::body(&request)?))
            .await
    }

    pub async fn remove_reaction(&self, message_id: Uuid, emoji: &str) -> Result<ReactionAck, ClientError> {
        self.call(
            ApiRequest::delete("/reactions")
                .query("messageId", message_id)
                .query("emoji", emoji),
        )
        .await
    }

    // -- Presence --

    pub async fn set_presence(&self, status: PresenceStatus) -> Result<PresenceStatus, ClientError> {
        let resp: PresenceResponse = self
            .call(ApiRequest::post("/presence").json(Self::body(&PresenceRequest { status })?))
            .await?;
        Ok(resp.status)
    }

    pub async fn heartbeat(&self) -> Result<StatusResponse, ClientError> {
        self.call(ApiRequest::put("/presence")).await
    }

    pub async fn online_users(&self, room_id: Option<Uuid>) -> Result<Vec<User>, ClientError> {
        let mut request = ApiRequest::get("/presence");
        if let Some(room_id) = room_id {
            request = request.query("roomId", room_id);
        }
        let resp: UsersResponse = self.call(request).await?;
        Ok(resp.users)
    }
}
