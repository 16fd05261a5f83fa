//! In-memory chat server behind the [`Transport`] trait, for the client tests.
//!
//! Tokens are user ids. The clock advances one second per write so ordering
//! by timestamp is deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Notify;
use uuid::Uuid;

use parlor_types::MAX_FILE_BYTES;
use parlor_types::api::*;
use parlor_types::models::*;

use crate::client::ChatClient;
use crate::config::SyncConfig;
use crate::error::ClientError;
use crate::transport::{ApiRequest, Transport};

struct Account {
    user: User,
    email: String,
    password: String,
}

struct Membership {
    room_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
    last_read_at: Option<DateTime<Utc>>,
}

struct StoredReaction {
    message_id: Uuid,
    user_id: Uuid,
    emoji: String,
    at: DateTime<Utc>,
}

/// Pause point for one request: `reached` fires when the request arrives,
/// the response is only computed after `release`.
#[derive(Clone, Default)]
pub(crate) struct Hold {
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl Hold {
    pub(crate) async fn reached(&self) {
        self.reached.notified().await;
    }

    pub(crate) fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
struct FakeServer {
    clock: i64,
    accounts: Vec<Account>,
    rooms: Vec<Room>,
    members: Vec<Membership>,
    messages: Vec<Message>,
    reads: Vec<(Uuid, Uuid)>,
    reactions: Vec<StoredReaction>,
    calls: HashMap<String, usize>,
    failures: HashMap<String, u16>,
    holds: HashMap<String, Hold>,
}

fn route(method: &Method, path: &str) -> String {
    format!("{} {}", method, path)
}

fn bad(msg: impl Into<String>) -> ClientError {
    ClientError::BadRequest(msg.into())
}

fn forbidden(msg: impl Into<String>) -> ClientError {
    ClientError::Forbidden(msg.into())
}

fn not_found(msg: impl Into<String>) -> ClientError {
    ClientError::NotFound(msg.into())
}

fn conflict(msg: impl Into<String>) -> ClientError {
    ClientError::Conflict(msg.into())
}

fn body<T: DeserializeOwned>(req: &ApiRequest) -> Result<T, ClientError> {
    serde_json::from_value(req.body.clone().unwrap_or(Value::Null)).map_err(|e| bad(e.to_string()))
}

fn query_id(req: &ApiRequest, key: &str) -> Result<Uuid, ClientError> {
    req.query_value(key)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| bad(format!("{} is required", key)))
}

fn to_json(value: impl Serialize) -> Result<Value, ClientError> {
    Ok(serde_json::to_value(value)?)
}

fn ok() -> Result<Value, ClientError> {
    Ok(json!({ "success": true, "message": "ok" }))
}

impl FakeServer {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        DateTime::from_timestamp(1_704_067_200 + self.clock, 0).unwrap()
    }

    // -- Lookups --

    fn account(&self, id: Uuid) -> Option<&Account> {
        self.accounts.iter().find(|a| a.user.id == id)
    }

    fn account_mut(&mut self, id: Uuid) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.user.id == id)
    }

    fn public_user(&self, id: Uuid) -> Option<User> {
        self.account(id).map(|a| User {
            email: None,
            ..a.user.clone()
        })
    }

    fn own_user(&self, id: Uuid) -> Option<User> {
        self.account(id).map(|a| User {
            email: Some(a.email.clone()),
            ..a.user.clone()
        })
    }

    fn room(&self, id: Uuid) -> Result<&Room, ClientError> {
        self.rooms
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found("Room not found"))
    }

    fn message(&self, id: Uuid) -> Result<&Message, ClientError> {
        self.messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| not_found("Message not found"))
    }

    fn is_member(&self, room_id: Uuid, user_id: Uuid) -> bool {
        self.members
            .iter()
            .any(|m| m.room_id == room_id && m.user_id == user_id)
    }

    fn require_member(&self, room_id: Uuid, user_id: Uuid) -> Result<(), ClientError> {
        self.room(room_id)?;
        if !self.is_member(room_id, user_id) {
            return Err(forbidden("Not a member of this room"));
        }
        Ok(())
    }

    fn room_members(&self, room_id: Uuid) -> Vec<&Membership> {
        let mut members: Vec<&Membership> = self.members.iter().filter(|m| m.room_id == room_id).collect();
        members.sort_by_key(|m| m.joined_at);
        members
    }

    // -- Views --

    fn room_view(&self, room: &Room, viewer: Uuid) -> Room {
        let in_room: Vec<&Message> = self.messages.iter().filter(|m| m.room_id == room.id).collect();
        let last_read = self
            .members
            .iter()
            .find(|m| m.room_id == room.id && m.user_id == viewer)
            .and_then(|m| m.last_read_at);
        Room {
            member_count: self.room_members(room.id).len() as i64,
            last_message_at: in_room.iter().map(|m| m.created_at).max(),
            unread_count: in_room
                .iter()
                .filter(|m| m.user_id != viewer)
                .filter(|m| last_read.is_none_or(|read| m.created_at > read))
                .count() as i64,
            ..room.clone()
        }
    }

    fn reaction_groups(&self, message_id: Uuid) -> Vec<ReactionGroup> {
        let mut groups: Vec<ReactionGroup> = Vec::new();
        for row in self.reactions.iter().filter(|r| r.message_id == message_id) {
            let Some(user) = self.public_user(row.user_id) else {
                continue;
            };
            let reactor = Reactor {
                id: user.id,
                name: user.name,
                avatar: user.avatar,
                timestamp: row.at,
            };
            match groups.iter_mut().find(|g| g.emoji == row.emoji) {
                Some(group) => {
                    group.count += 1;
                    group.users.push(reactor);
                }
                None => groups.push(ReactionGroup {
                    emoji: row.emoji.clone(),
                    count: 1,
                    users: vec![reactor],
                }),
            }
        }
        groups
    }

    fn message_view(&self, message: &Message) -> Message {
        Message {
            read_by: self
                .reads
                .iter()
                .filter(|(m, _)| *m == message.id)
                .map(|(_, u)| *u)
                .collect(),
            reactions: self.reaction_groups(message.id),
            ..message.clone()
        }
    }

    // -- Writes --

    fn insert_user(&mut self, name: &str, email: &str, password: &str) -> Uuid {
        let created_at = self.tick();
        let user = User {
            id: Uuid::new_v4(),
            email: None,
            name: name.to_string(),
            avatar: None,
            online: false,
            last_seen: None,
            created_at: Some(created_at),
        };
        let id = user.id;
        self.accounts.push(Account {
            user,
            email: email.to_string(),
            password: password.to_string(),
        });
        id
    }

    fn insert_room(&mut self, name: &str, description: Option<String>, room_type: RoomType, admin: Uuid) -> Uuid {
        let now = self.tick();
        let room = Room {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            room_type,
            admin_id: admin,
            created_by: admin,
            member_count: 0,
            last_message_at: None,
            unread_count: 0,
            created_at: now,
            updated_at: now,
        };
        let id = room.id;
        self.rooms.push(room);
        id
    }

    fn join(&mut self, room_id: Uuid, user_id: Uuid) {
        if self.is_member(room_id, user_id) {
            return;
        }
        let joined_at = self.tick();
        self.members.push(Membership {
            room_id,
            user_id,
            joined_at,
            last_read_at: None,
        });
    }

    fn insert_message(&mut self, room_id: Uuid, author: Uuid, content: String, kind: MessageKind) -> Message {
        let created_at = self.tick();
        let (user_name, user_avatar) = self
            .account(author)
            .map(|a| (a.user.name.clone(), a.user.avatar.clone()))
            .unwrap_or_default();
        let message = Message {
            id: Uuid::new_v4(),
            room_id,
            user_id: author,
            user_name,
            user_avatar,
            content,
            kind,
            created_at,
            read_by: vec![],
            reactions: vec![],
        };
        self.messages.push(message.clone());
        message
    }

    fn drop_message_rows(&mut self, message_id: Uuid) {
        self.reads.retain(|(m, _)| *m != message_id);
        self.reactions.retain(|r| r.message_id != message_id);
    }

    fn drop_room(&mut self, room_id: Uuid) {
        let doomed: Vec<Uuid> = self
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .map(|m| m.id)
            .collect();
        for id in doomed {
            self.drop_message_rows(id);
        }
        self.messages.retain(|m| m.room_id != room_id);
        self.members.retain(|m| m.room_id != room_id);
        self.rooms.retain(|r| r.id != room_id);
    }

    // -- Dispatch --

    fn handle(&mut self, caller: Option<Uuid>, req: &ApiRequest) -> Result<Value, ClientError> {
        if req.path == "/auth" {
            return self.auth(caller, req);
        }
        let me = caller
            .filter(|id| self.account(*id).is_some())
            .ok_or_else(|| ClientError::Unauthorized("Missing or invalid token".into()))?;

        match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/users") => to_json(UserResponse {
                user: self.own_user(me).ok_or_else(|| not_found("User not found"))?,
            }),
            ("PUT", "/users") => self.update_profile(me, body(req)?),
            ("POST", "/users") => self.search_users(me, body(req)?),
            ("GET", "/rooms") => self.list_rooms(me),
            ("POST", "/rooms") => self.create_room(me, body(req)?),
            ("PUT", "/rooms") => self.join_room(me, body(req)?),
            ("DELETE", "/rooms") => self.leave_room(me, query_id(req, "roomId")?),
            ("POST", "/create-dm") => self.create_dm(me, body(req)?),
            ("DELETE", "/delete-room") => self.delete_room(me, query_id(req, "roomId")?),
            ("GET", "/room-members") => self.list_members(me, query_id(req, "roomId")?),
            ("POST", "/room-members") => self.add_member(me, body(req)?),
            ("DELETE", "/room-members") => {
                self.remove_member(me, query_id(req, "roomId")?, query_id(req, "userId")?)
            }
            ("POST", "/room-members-transfer-admin") => self.transfer_admin(me, body(req)?),
            ("GET", "/messages") => self.list_messages(me, query_id(req, "roomId")?),
            ("POST", "/messages") => self.send_message(me, body(req)?),
            ("PUT", "/messages") => self.mark_messages_read(me, body(req)?),
            ("DELETE", "/messages") => self.delete_message(me, query_id(req, "messageId")?),
            ("GET", "/messages-search") => {
                self.search_messages(me, query_id(req, "roomId")?, req.query_value("q").unwrap_or(""))
            }
            ("POST", "/messages-forward") => self.forward_message(me, body(req)?),
            ("POST", "/mark-read") => self.mark_read(me, body(req)?),
            ("POST", "/upload-file") => self.upload_file(me, body(req)?),
            ("GET", "/reactions") => self.list_reactions(me, query_id(req, "messageId")?),
            ("POST", "/reactions") => self.add_reaction(me, body(req)?),
            ("DELETE", "/reactions") => {
                self.remove_reaction(me, query_id(req, "messageId")?, req.query_value("emoji").unwrap_or(""))
            }
            ("GET", "/presence") => {
                let room = req.query_value("roomId").and_then(|v| Uuid::parse_str(v).ok());
                self.presence(me, room)
            }
            ("POST", "/presence") => {
                let request: PresenceRequest = body(req)?;
                let now = self.tick();
                if let Some(account) = self.account_mut(me) {
                    account.user.online = request.status == PresenceStatus::Online;
                    account.user.last_seen = Some(now);
                }
                to_json(PresenceResponse { status: request.status })
            }
            ("PUT", "/presence") => {
                let now = self.tick();
                if let Some(account) = self.account_mut(me) {
                    account.user.last_seen = Some(now);
                }
                ok()
            }
            _ => Err(not_found("No such endpoint")),
        }
    }

    fn auth(&mut self, caller: Option<Uuid>, req: &ApiRequest) -> Result<Value, ClientError> {
        match body::<AuthRequest>(req)? {
            AuthRequest::Register {
                email,
                password,
                name,
                ..
            } => {
                if self.accounts.iter().any(|a| a.email == email) {
                    return Err(conflict("Email already registered"));
                }
                let id = self.insert_user(&name, &email, &password);
                let user = self.own_user(id).ok_or_else(|| not_found("User not found"))?;
                to_json(AuthResponse {
                    user,
                    token: id.to_string(),
                })
            }
            AuthRequest::Login { email, password } => {
                let id = self
                    .accounts
                    .iter()
                    .find(|a| a.email == email && a.password == password)
                    .map(|a| a.user.id)
                    .ok_or_else(|| ClientError::Unauthorized("Invalid email or password".into()))?;
                if let Some(account) = self.account_mut(id) {
                    account.user.online = true;
                }
                let user = self.own_user(id).ok_or_else(|| not_found("User not found"))?;
                to_json(AuthResponse {
                    user,
                    token: id.to_string(),
                })
            }
            AuthRequest::Logout => {
                if let Some(account) = caller.and_then(|id| self.account_mut(id)) {
                    account.user.online = false;
                }
                ok()
            }
        }
    }

    fn update_profile(&mut self, me: Uuid, req: UpdateProfileRequest) -> Result<Value, ClientError> {
        if req.name.is_none() && req.avatar.is_none() {
            return Err(bad("Nothing to update"));
        }
        let account = self.account_mut(me).ok_or_else(|| not_found("User not found"))?;
        if let Some(name) = req.name {
            if name.trim().is_empty() {
                return Err(bad("Name cannot be empty"));
            }
            account.user.name = name;
        }
        if let Some(avatar) = req.avatar {
            account.user.avatar = Some(avatar);
        }
        to_json(UserResponse {
            user: self.own_user(me).ok_or_else(|| not_found("User not found"))?,
        })
    }

    fn search_users(&self, me: Uuid, req: SearchUsersRequest) -> Result<Value, ClientError> {
        let query = req.query.trim().to_lowercase();
        if query.chars().count() < 2 {
            return Err(bad("Query too short"));
        }
        let users: Vec<User> = self
            .accounts
            .iter()
            .filter(|a| a.user.id != me)
            .filter(|a| a.user.name.to_lowercase().contains(&query) || a.email.to_lowercase().contains(&query))
            .take(req.limit.unwrap_or(20) as usize)
            .filter_map(|a| self.public_user(a.user.id))
            .collect();
        to_json(UsersResponse { users })
    }

    fn list_rooms(&self, me: Uuid) -> Result<Value, ClientError> {
        let mut rooms: Vec<Room> = self
            .rooms
            .iter()
            .filter(|r| self.is_member(r.id, me))
            .map(|r| self.room_view(r, me))
            .collect();
        rooms.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
        to_json(RoomsResponse { rooms })
    }

    fn create_room(&mut self, me: Uuid, req: CreateRoomRequest) -> Result<Value, ClientError> {
        if req.name.trim().is_empty() {
            return Err(bad("Room name is required"));
        }
        if req.room_type == RoomType::Dm {
            return Err(bad("Use /create-dm for direct messages"));
        }
        if req.member_ids.iter().any(|id| self.account(*id).is_none()) {
            return Err(not_found("User not found"));
        }
        let id = self.insert_room(req.name.trim(), req.description, RoomType::Group, me);
        self.join(id, me);
        for member in req.member_ids {
            self.join(id, member);
        }
        let room = self.room_view(self.room(id)?, me);
        to_json(RoomResponse { room })
    }

    fn join_room(&mut self, me: Uuid, req: RoomIdRequest) -> Result<Value, ClientError> {
        if self.room(req.room_id)?.room_type == RoomType::Dm {
            return Err(forbidden("Direct messages cannot be joined"));
        }
        if self.is_member(req.room_id, me) {
            return Err(conflict("Already a member"));
        }
        self.join(req.room_id, me);
        let room = self.room_view(self.room(req.room_id)?, me);
        to_json(RoomResponse { room })
    }

    fn leave_room(&mut self, me: Uuid, room_id: Uuid) -> Result<Value, ClientError> {
        if !self.is_member(room_id, me) {
            return Err(not_found("Not a member of this room"));
        }
        let room = self.room(room_id)?.clone();
        if room.room_type == RoomType::Dm {
            return Err(bad("Direct messages cannot be left"));
        }
        self.members.retain(|m| !(m.room_id == room_id && m.user_id == me));

        let successor = self.room_members(room_id).first().map(|m| m.user_id);
        let Some(successor) = successor else {
            self.drop_room(room_id);
            return to_json(LeaveRoomResponse {
                success: true,
                room_deleted: true,
                new_admin_id: None,
            });
        };

        let mut new_admin_id = None;
        if room.admin_id == me {
            let now = self.tick();
            if let Some(room) = self.rooms.iter_mut().find(|r| r.id == room_id) {
                room.admin_id = successor;
                room.updated_at = now;
            }
            new_admin_id = Some(successor);
        }
        to_json(LeaveRoomResponse {
            success: true,
            room_deleted: false,
            new_admin_id,
        })
    }

    fn create_dm(&mut self, me: Uuid, req: CreateDmRequest) -> Result<Value, ClientError> {
        let target = req.target_user_id;
        if target == me {
            return Err(bad("Cannot message yourself"));
        }
        let target_name = self
            .account(target)
            .map(|a| a.user.name.clone())
            .ok_or_else(|| not_found("User not found"))?;

        let existing = self
            .rooms
            .iter()
            .find(|r| r.room_type == RoomType::Dm && self.is_member(r.id, me) && self.is_member(r.id, target))
            .map(|r| r.id);
        let (id, is_new) = match existing {
            Some(id) => (id, false),
            None => {
                let id = self.insert_room(
                    &format!("DM: {}", target_name),
                    Some(format!("Direct message with {}", target_name)),
                    RoomType::Dm,
                    me,
                );
                self.join(id, me);
                self.join(id, target);
                (id, true)
            }
        };
        let room = self.room_view(self.room(id)?, me);
        to_json(CreateDmResponse { room, is_new })
    }

    fn delete_room(&mut self, me: Uuid, room_id: Uuid) -> Result<Value, ClientError> {
        let room = self.room(room_id)?;
        if !self.is_member(room_id, me) {
            return Err(forbidden("Not a member of this room"));
        }
        if room.room_type == RoomType::Group && room.admin_id != me {
            return Err(forbidden("Only the room admin can delete this room"));
        }
        self.drop_room(room_id);
        ok()
    }

    fn list_members(&self, me: Uuid, room_id: Uuid) -> Result<Value, ClientError> {
        self.require_member(room_id, me)?;
        let room = self.room(room_id)?;
        let members = self
            .room_members(room_id)
            .into_iter()
            .filter_map(|m| {
                let user = self.public_user(m.user_id)?;
                Some(Member {
                    id: user.id,
                    name: user.name,
                    avatar: user.avatar,
                    online: user.online,
                    last_seen: user.last_seen,
                    joined_at: m.joined_at,
                    is_admin: room.admin_id == m.user_id,
                })
            })
            .collect();
        to_json(MembersResponse {
            members,
            room: self.room_view(room, me),
        })
    }

    fn add_member(&mut self, me: Uuid, req: AddMemberRequest) -> Result<Value, ClientError> {
        self.require_member(req.room_id, me)?;
        if self.room(req.room_id)?.room_type == RoomType::Dm {
            return Err(bad("Cannot add members to a direct message"));
        }
        let user = self.public_user(req.user_id).ok_or_else(|| not_found("User not found"))?;
        if self.is_member(req.room_id, req.user_id) {
            return Err(conflict("Already a member"));
        }
        self.join(req.room_id, req.user_id);
        to_json(AddMemberResponse { user })
    }

    fn remove_member(&mut self, me: Uuid, room_id: Uuid, user_id: Uuid) -> Result<Value, ClientError> {
        if self.room(room_id)?.admin_id != me {
            return Err(forbidden("Only the room admin can remove members"));
        }
        if user_id == me {
            return Err(bad("Use leave to remove yourself"));
        }
        if !self.is_member(room_id, user_id) {
            return Err(not_found("User is not a member"));
        }
        self.members.retain(|m| !(m.room_id == room_id && m.user_id == user_id));
        ok()
    }

    fn transfer_admin(&mut self, me: Uuid, req: TransferAdminRequest) -> Result<Value, ClientError> {
        if self.room(req.room_id)?.admin_id != me {
            return Err(forbidden("Only the room admin can transfer admin rights"));
        }
        if !self.is_member(req.room_id, req.new_admin_id) {
            return Err(bad("New admin must be a member of the room"));
        }
        let now = self.tick();
        if let Some(room) = self.rooms.iter_mut().find(|r| r.id == req.room_id) {
            room.admin_id = req.new_admin_id;
            room.updated_at = now;
        }
        let room = self.room_view(self.room(req.room_id)?, me);
        to_json(RoomResponse { room })
    }

    fn list_messages(&self, me: Uuid, room_id: Uuid) -> Result<Value, ClientError> {
        self.require_member(room_id, me)?;
        let messages = self
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .map(|m| self.message_view(m))
            .collect();
        to_json(MessagesResponse { messages })
    }

    fn send_message(&mut self, me: Uuid, req: SendMessageRequest) -> Result<Value, ClientError> {
        if req.content.trim().is_empty() {
            return Err(bad("Content is required"));
        }
        if req.kind == MessageKind::File {
            return Err(bad("Use /upload-file for files"));
        }
        self.require_member(req.room_id, me)?;
        let message = self.insert_message(req.room_id, me, req.content, req.kind);
        to_json(MessageResponse { message })
    }

    fn mark_messages_read(&mut self, me: Uuid, req: MarkMessagesReadRequest) -> Result<Value, ClientError> {
        if req.message_ids.is_empty() {
            return Err(bad("messageIds is required"));
        }
        let mut updated_count = 0;
        for id in req.message_ids {
            let Ok(message) = self.message(id) else {
                continue;
            };
            if self.is_member(message.room_id, me) && !self.reads.contains(&(id, me)) {
                self.reads.push((id, me));
                updated_count += 1;
            }
        }
        to_json(MarkMessagesReadResponse { updated_count })
    }

    fn delete_message(&mut self, me: Uuid, message_id: Uuid) -> Result<Value, ClientError> {
        if self.message(message_id)?.user_id != me {
            return Err(forbidden("You can only delete your own messages"));
        }
        self.drop_message_rows(message_id);
        self.messages.retain(|m| m.id != message_id);
        ok()
    }

    fn search_messages(&self, me: Uuid, room_id: Uuid, q: &str) -> Result<Value, ClientError> {
        self.require_member(room_id, me)?;
        let needle = q.trim().to_lowercase();
        if needle.is_empty() {
            return Err(bad("q is required"));
        }
        let messages = self
            .messages
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id && m.kind == MessageKind::Text)
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .take(SEARCH_LIMIT)
            .map(|m| self.message_view(m))
            .collect();
        to_json(MessagesResponse { messages })
    }

    fn forward_message(&mut self, me: Uuid, req: ForwardMessageRequest) -> Result<Value, ClientError> {
        let source = self.message(req.message_id)?.clone();
        self.require_member(source.room_id, me)?;
        self.require_member(req.target_room_id, me)?;
        let body = match source.file() {
            Some(file) => format!("[file] {}", file.name),
            None => source.content.clone(),
        };
        let content = format!("Forwarded from {}:\n{}", source.user_name, body);
        let message = self.insert_message(req.target_room_id, me, content, MessageKind::Text);
        to_json(MessageResponse { message })
    }

    fn mark_read(&mut self, me: Uuid, req: RoomIdRequest) -> Result<Value, ClientError> {
        self.require_member(req.room_id, me)?;
        let now = self.tick();
        if let Some(m) = self
            .members
            .iter_mut()
            .find(|m| m.room_id == req.room_id && m.user_id == me)
        {
            m.last_read_at = Some(now);
        }
        ok()
    }

    fn upload_file(&mut self, me: Uuid, req: UploadFileRequest) -> Result<Value, ClientError> {
        let bytes = BASE64
            .decode(req.file_data.as_bytes())
            .map_err(|_| bad("Invalid file data"))?;
        if bytes.len() > MAX_FILE_BYTES {
            return Err(bad("File too large"));
        }
        self.require_member(req.room_id, me)?;
        let file = FileDescriptor {
            id: Uuid::new_v4(),
            name: req.file_name,
            url: format!("data:{};base64,{}", req.file_type, req.file_data),
            mime: req.file_type,
            size: bytes.len() as u64,
        };
        let content = serde_json::to_string(&FileContent { file })?;
        let message = self.insert_message(req.room_id, me, content, MessageKind::File);
        to_json(MessageResponse { message })
    }

    fn reaction_target(&self, me: Uuid, message_id: Uuid) -> Result<(), ClientError> {
        let room_id = self.message(message_id)?.room_id;
        if !self.is_member(room_id, me) {
            return Err(forbidden("Not a member of this room"));
        }
        Ok(())
    }

    fn list_reactions(&self, me: Uuid, message_id: Uuid) -> Result<Value, ClientError> {
        self.reaction_target(me, message_id)?;
        let reactions = self.reaction_groups(message_id);
        let total = reactions.iter().map(|g| g.count).sum();
        to_json(ReactionsResponse { reactions, total })
    }

    fn add_reaction(&mut self, me: Uuid, req: ReactionRequest) -> Result<Value, ClientError> {
        self.reaction_target(me, req.message_id)?;
        let exists = self
            .reactions
            .iter()
            .any(|r| r.message_id == req.message_id && r.user_id == me && r.emoji == req.emoji);
        if exists {
            return to_json(ReactionAck {
                success: true,
                action: ReactionAction::AlreadyExists,
            });
        }
        let at = self.tick();
        self.reactions.push(StoredReaction {
            message_id: req.message_id,
            user_id: me,
            emoji: req.emoji,
            at,
        });
        to_json(ReactionAck {
            success: true,
            action: ReactionAction::Added,
        })
    }

    fn remove_reaction(&mut self, me: Uuid, message_id: Uuid, emoji: &str) -> Result<Value, ClientError> {
        self.reaction_target(me, message_id)?;
        let before = self.reactions.len();
        self.reactions
            .retain(|r| !(r.message_id == message_id && r.user_id == me && r.emoji == emoji));
        if self.reactions.len() == before {
            return Err(not_found("Reaction not found"));
        }
        to_json(ReactionAck {
            success: true,
            action: ReactionAction::Removed,
        })
    }

    fn presence(&self, me: Uuid, room_id: Option<Uuid>) -> Result<Value, ClientError> {
        if let Some(room_id) = room_id {
            self.require_member(room_id, me)?;
        }
        let mut users: Vec<User> = self
            .accounts
            .iter()
            .filter(|a| a.user.id != me)
            .filter(|a| room_id.is_none_or(|room| self.is_member(room, a.user.id)))
            .filter_map(|a| self.public_user(a.user.id))
            .collect();
        users.sort_by(|a, b| b.online.cmp(&a.online).then(b.last_seen.cmp(&a.last_seen)));
        to_json(UsersResponse { users })
    }
}

const SEARCH_LIMIT: usize = parlor_types::SEARCH_RESULT_LIMIT;

/// One client's connection to a [`FakeBackend`].
pub(crate) struct FakeTransport {
    server: Arc<Mutex<FakeServer>>,
    token: RwLock<Option<String>>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ClientError> {
        let key = route(&request.method, &request.path);
        let (hold, failure) = {
            let mut server = self.server.lock().unwrap();
            *server.calls.entry(key.clone()).or_default() += 1;
            (server.holds.remove(&key), server.failures.remove(&key))
        };

        if let Some(hold) = hold {
            hold.reached.notify_one();
            hold.release.notified().await;
        }
        if let Some(status) = failure {
            return Err(ClientError::from_status(status, "injected failure".into()));
        }

        let caller = self
            .token
            .read()
            .unwrap()
            .as_deref()
            .and_then(|t| Uuid::parse_str(t).ok());
        let response = self.server.lock().unwrap().handle(caller, &request);
        response
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap() = token;
    }
}

/// Shared fake server plus the hooks tests use to act as other users.
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    server: Arc<Mutex<FakeServer>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeServer> {
        self.server.lock().unwrap()
    }

    pub(crate) fn transport(&self) -> Arc<FakeTransport> {
        Arc::new(FakeTransport {
            server: self.server.clone(),
            token: RwLock::new(None),
        })
    }

    pub(crate) fn client(&self) -> ChatClient {
        ChatClient::with_transport(SyncConfig::default(), self.transport())
    }

    /// A registered user with password `password123`.
    pub(crate) fn add_user(&self, name: &str) -> User {
        let mut server = self.lock();
        let email = format!("{}@example.com", name.to_lowercase());
        let id = server.insert_user(name, &email, "password123");
        server.own_user(id).unwrap()
    }

    pub(crate) async fn signed_in(&self, name: &str) -> (ChatClient, User) {
        let user = self.add_user(name);
        let client = self.client();
        client.resume(user.id.to_string()).await.unwrap();
        (client, user)
    }

    pub(crate) fn create_group(&self, admin: Uuid, name: &str, members: &[Uuid]) -> Uuid {
        let mut server = self.lock();
        let id = server.insert_room(name, None, RoomType::Group, admin);
        server.join(id, admin);
        for member in members {
            server.join(id, *member);
        }
        id
    }

    pub(crate) fn post_as(&self, author: Uuid, room_id: Uuid, content: &str) -> Uuid {
        self.lock()
            .insert_message(room_id, author, content.to_string(), MessageKind::Text)
            .id
    }

    pub(crate) fn react_as(&self, user_id: Uuid, message_id: Uuid, emoji: &str) {
        let mut server = self.lock();
        let at = server.tick();
        server.reactions.push(StoredReaction {
            message_id,
            user_id,
            emoji: emoji.to_string(),
            at,
        });
    }

    /// Park the next matching request until the returned hold is released.
    pub(crate) fn hold_next(&self, method: Method, path: &str) -> Hold {
        let hold = Hold::default();
        self.lock().holds.insert(route(&method, path), hold.clone());
        hold
    }

    pub(crate) fn fail_next(&self, method: Method, path: &str, status: u16) {
        self.lock().failures.insert(route(&method, path), status);
    }

    pub(crate) fn calls(&self, method: Method, path: &str) -> usize {
        self.lock()
            .calls
            .get(&route(&method, path))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn room_exists(&self, room_id: Uuid) -> bool {
        self.lock().room(room_id).is_ok()
    }

    pub(crate) fn admin_of(&self, room_id: Uuid) -> Option<Uuid> {
        self.lock().room(room_id).ok().map(|r| r.admin_id)
    }

    pub(crate) fn message_exists(&self, message_id: Uuid) -> bool {
        self.lock().message(message_id).is_ok()
    }

    pub(crate) fn reaction_count(&self, message_id: Uuid, emoji: &str) -> usize {
        self.lock()
            .reactions
            .iter()
            .filter(|r| r.message_id == message_id && r.emoji == emoji)
            .count()
    }

    pub(crate) fn is_online(&self, user_id: Uuid) -> bool {
        self.lock().account(user_id).is_some_and(|a| a.user.online)
    }
}
