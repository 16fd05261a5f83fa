//! Row types read straight out of SQLite. Ids and timestamps stay as text.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub name: String,
    pub avatar: Option<String>,
    pub online: bool,
    pub last_seen: String,
    pub created_at: String,
}

/// A room as seen by one viewer: aggregates and the unread count are computed
/// for that viewer at query time.
pub struct RoomRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub room_type: String,
    pub admin_id: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub member_count: i64,
    pub last_message_at: Option<String>,
    pub unread_count: i64,
}

pub struct MemberRow {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub online: bool,
    pub last_seen: String,
    pub joined_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub content: String,
    pub kind: String,
    pub created_at: String,
}

pub struct ReadRow {
    pub message_id: String,
    pub user_id: String,
}

pub struct ReactionRow {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub emoji: String,
    pub created_at: String,
}

pub struct FileRow {
    pub id: String,
    pub name: String,
    pub file_type: String,
    pub size: i64,
    pub url: String,
    pub uploaded_by: String,
    pub room_id: String,
}

/// What happened when a member left a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Caller was not a member.
    NotMember,
    Left,
    /// Caller was admin; the role moved to the earliest-joined remaining member.
    AdminTransferred(String),
    /// Caller was the last member; the room is gone.
    RoomDeleted,
}
