use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Only populated on the caller's own profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    #[default]
    Group,
    Dm,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Dm => "dm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "group" => Some(Self::Group),
            "dm" => Some(Self::Dm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    /// Current administrator. Mutable; reassigned on admin departure or transfer.
    pub admin_id: Uuid,
    /// Immutable creator record. Never consulted for authorization.
    pub created_by: Uuid,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Computed per viewer, never stored.
    #[serde(default)]
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// Most recent of `last_message_at`, `updated_at` and `created_at`.
    pub fn activity_at(&self) -> DateTime<Utc> {
        let mut latest = self.created_at.max(self.updated_at);
        if let Some(last) = self.last_message_at {
            latest = latest.max(last);
        }
        latest
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    #[serde(default)]
    pub user_avatar: Option<String>,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_by: Vec<Uuid>,
    #[serde(default)]
    pub reactions: Vec<ReactionGroup>,
}

impl Message {
    /// Decode the file descriptor carried by a `file` message.
    pub fn file(&self) -> Option<FileDescriptor> {
        if self.kind != MessageKind::File {
            return None;
        }
        serde_json::from_str::<FileContent>(&self.content)
            .ok()
            .map(|c| c.file)
    }
}

/// Metadata of an uploaded file, as embedded in a `file` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub size: u64,
    pub url: String,
}

/// JSON shape stored in `Message::content` for `file` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    pub file: FileDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reactor {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Grouped view over individual (message, user, emoji) reaction rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub users: Vec<Reactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}
