//! Row-to-wire conversion. Corrupt ids or timestamps are logged and replaced
//! with defaults rather than failing the whole response.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use parlor_db::Database;
use parlor_db::models::{MemberRow, MessageRow, ReactionRow, RoomRow, UserRow};
use parlor_types::models::{Member, Message, MessageKind, ReactionGroup, Reactor, Room, RoomType, User};

pub fn parse_uuid(value: &str, what: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, value, e);
        Uuid::default()
    })
}

pub fn parse_timestamp(value: &str, what: &str) -> DateTime<Utc> {
    value.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, value, e);
        DateTime::default()
    })
}

/// `with_email` is set only when the row is the caller's own profile.
pub fn user(row: UserRow, with_email: bool) -> User {
    User {
        id: parse_uuid(&row.id, "user id"),
        email: with_email.then_some(row.email),
        name: row.name,
        avatar: row.avatar,
        online: row.online,
        last_seen: Some(parse_timestamp(&row.last_seen, "last_seen")),
        created_at: Some(parse_timestamp(&row.created_at, "created_at")),
    }
}

pub fn room(row: RoomRow) -> Room {
    Room {
        id: parse_uuid(&row.id, "room id"),
        room_type: RoomType::parse(&row.room_type).unwrap_or_else(|| {
            warn!("Unknown room type '{}' on room '{}'", row.room_type, row.id);
            RoomType::Group
        }),
        admin_id: parse_uuid(&row.admin_id, "admin_id"),
        created_by: parse_uuid(&row.created_by, "created_by"),
        member_count: row.member_count,
        last_message_at: row
            .last_message_at
            .as_deref()
            .map(|ts| parse_timestamp(ts, "last_message_at")),
        unread_count: row.unread_count,
        created_at: parse_timestamp(&row.created_at, "created_at"),
        updated_at: parse_timestamp(&row.updated_at, "updated_at"),
        name: row.name,
        description: row.description,
    }
}

pub fn member(row: MemberRow, admin_id: &str) -> Member {
    Member {
        id: parse_uuid(&row.user_id, "member id"),
        is_admin: row.user_id == admin_id,
        name: row.name,
        avatar: row.avatar,
        online: row.online,
        last_seen: Some(parse_timestamp(&row.last_seen, "last_seen")),
        joined_at: parse_timestamp(&row.joined_at, "joined_at"),
    }
}

/// Group reaction rows by message, then by emoji. Rows must arrive oldest
/// first; groups keep the order of their first reaction.
pub fn group_reactions(rows: Vec<ReactionRow>) -> HashMap<String, Vec<ReactionGroup>> {
    let mut grouped: HashMap<String, Vec<ReactionGroup>> = HashMap::new();
    for r in rows {
        let groups = grouped.entry(r.message_id.clone()).or_default();
        let reactor = Reactor {
            id: parse_uuid(&r.user_id, "reaction user_id"),
            name: r.user_name,
            avatar: r.user_avatar,
            timestamp: parse_timestamp(&r.created_at, "reaction created_at"),
        };
        match groups.iter_mut().find(|g| g.emoji == r.emoji) {
            Some(group) => {
                group.users.push(reactor);
                group.count = group.users.len();
            }
            None => groups.push(ReactionGroup {
                emoji: r.emoji,
                count: 1,
                users: vec![reactor],
            }),
        }
    }
    grouped
}

/// Attach read receipts and reactions to message rows in two batch queries.
pub fn messages(db: &Database, rows: Vec<MessageRow>) -> anyhow::Result<Vec<Message>> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

    let mut reads: HashMap<String, Vec<Uuid>> = HashMap::new();
    for read in db.get_reads_for_messages(&ids)? {
        reads
            .entry(read.message_id)
            .or_default()
            .push(parse_uuid(&read.user_id, "read user_id"));
    }
    let mut reactions = group_reactions(db.get_reactions_for_messages(&ids)?);

    Ok(rows
        .into_iter()
        .map(|row| {
            let read_by = reads.remove(&row.id).unwrap_or_default();
            let groups = reactions.remove(&row.id).unwrap_or_default();
            message(row, read_by, groups)
        })
        .collect())
}

pub fn message(row: MessageRow, read_by: Vec<Uuid>, reactions: Vec<ReactionGroup>) -> Message {
    Message {
        id: parse_uuid(&row.id, "message id"),
        room_id: parse_uuid(&row.room_id, "message room_id"),
        user_id: parse_uuid(&row.user_id, "message user_id"),
        user_name: row.user_name,
        user_avatar: row.user_avatar,
        kind: MessageKind::parse(&row.kind).unwrap_or_default(),
        content: row.content,
        created_at: parse_timestamp(&row.created_at, "message created_at"),
        read_by,
        reactions,
    }
}
