//! Merge rules between server snapshots and the local cache.
//!
//! Everything here is synchronous and side-effect free; the synchronizers
//! call these while holding the state write lock.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use parlor_types::models::{Message, ReactionGroup, Reactor, Room};

/// Most recent activity first.
pub fn sort_rooms(rooms: &mut [Room]) {
    rooms.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
}

/// Full replace of the room list: first occurrence of an id wins, then sorted.
pub fn reconcile_rooms(incoming: Vec<Room>) -> Vec<Room> {
    let mut seen = HashSet::new();
    let mut rooms: Vec<Room> = incoming
        .into_iter()
        .filter(|room| seen.insert(room.id))
        .collect();
    sort_rooms(&mut rooms);
    rooms
}

/// Full replace of a room's messages: deduplicated, reactions normalized.
pub fn reconcile_messages(incoming: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    incoming
        .into_iter()
        .filter(|message| seen.insert(message.id))
        .map(|mut message| {
            normalize_reactions(&mut message.reactions);
            message
        })
        .collect()
}

/// Append the messages of `incoming` not already present. Returns how many
/// were appended.
pub fn merge_new_messages(local: &mut Vec<Message>, incoming: Vec<Message>) -> usize {
    let mut known: HashSet<Uuid> = local.iter().map(|m| m.id).collect();
    let before = local.len();
    for mut message in incoming {
        if known.insert(message.id) {
            normalize_reactions(&mut message.reactions);
            local.push(message);
        }
    }
    local.len() - before
}

pub fn append_if_absent(local: &mut Vec<Message>, message: Message) -> bool {
    if local.iter().any(|m| m.id == message.id) {
        return false;
    }
    local.push(message);
    true
}

/// Groups with nobody left in them are dropped; counts follow the reactor list.
pub fn normalize_reactions(groups: &mut Vec<ReactionGroup>) {
    for group in groups.iter_mut() {
        if !group.users.is_empty() {
            group.count = group.users.len();
        }
    }
    groups.retain(|g| g.count > 0);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReactionDelta {
    Add(Reactor),
    Remove(Uuid),
}

/// Apply one user's reaction change to a message's groups.
///
/// Idempotent: adding an existing reaction or removing a missing one is a
/// no-op. Returns whether anything changed.
pub fn apply_reaction_delta(groups: &mut Vec<ReactionGroup>, emoji: &str, delta: ReactionDelta) -> bool {
    let position = groups.iter().position(|g| g.emoji == emoji);

    match delta {
        ReactionDelta::Add(reactor) => match position {
            Some(i) => {
                let group = &mut groups[i];
                if group.users.iter().any(|u| u.id == reactor.id) {
                    return false;
                }
                group.users.push(reactor);
                group.count += 1;
                true
            }
            None => {
                groups.push(ReactionGroup {
                    emoji: emoji.to_string(),
                    count: 1,
                    users: vec![reactor],
                });
                true
            }
        },
        ReactionDelta::Remove(user_id) => {
            let Some(i) = position else {
                return false;
            };
            let group = &mut groups[i];
            let Some(at) = group.users.iter().position(|u| u.id == user_id) else {
                return false;
            };
            group.users.remove(at);
            group.count = group.count.saturating_sub(1);
            if group.count == 0 || group.users.is_empty() {
                groups.remove(i);
            }
            true
        }
    }
}

pub fn user_reacted(groups: &[ReactionGroup], emoji: &str, user_id: Uuid) -> bool {
    groups
        .iter()
        .any(|g| g.emoji == emoji && g.users.iter().any(|u| u.id == user_id))
}

/// Messages by someone other than `me` created after `since`.
pub fn count_unseen(messages: &[Message], since: Option<DateTime<Utc>>, me: Option<Uuid>) -> usize {
    messages
        .iter()
        .filter(|m| Some(m.user_id) != me)
        .filter(|m| since.is_none_or(|since| m.created_at > since))
        .count()
}
