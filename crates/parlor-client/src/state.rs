use uuid::Uuid;

use parlor_types::models::{Message, Room, User};

use crate::reconcile;

/// Lifecycle of the message view for the active room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
}

/// Local cache shared by every synchronizer.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub user: Option<User>,
    /// Sorted by most recent activity.
    pub rooms: Vec<Room>,
    pub active_room: Option<Uuid>,
    pub phase: Phase,
    /// Messages of `active_room`, oldest first.
    pub messages: Vec<Message>,
    pub online_users: Vec<User>,
}

impl ChatState {
    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn is_active(&self, room_id: Uuid) -> bool {
        self.active_room == Some(room_id)
    }

    pub fn room(&self, room_id: Uuid) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == room_id)
    }

    pub fn room_mut(&mut self, room_id: Uuid) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|r| r.id == room_id)
    }

    pub fn message(&self, message_id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn message_mut(&mut self, message_id: Uuid) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Insert a room unless already present. Keeps the list sorted.
    pub fn insert_room(&mut self, room: Room) -> bool {
        if self.room(room.id).is_some() {
            return false;
        }
        self.rooms.push(room);
        reconcile::sort_rooms(&mut self.rooms);
        true
    }

    /// Drop a room. Returns whether it was the active one.
    pub fn remove_room(&mut self, room_id: Uuid) -> bool {
        self.rooms.retain(|r| r.id != room_id);
        if self.is_active(room_id) {
            self.clear_active();
            return true;
        }
        false
    }

    pub fn clear_active(&mut self) {
        self.active_room = None;
        self.messages.clear();
        self.phase = Phase::Idle;
    }

    /// Move a room's `last_message_at` forward and re-sort.
    pub fn bump_activity(&mut self, room_id: Uuid, at: chrono::DateTime<chrono::Utc>) {
        if let Some(room) = self.room_mut(room_id) {
            if room.last_message_at.is_none_or(|last| at > last) {
                room.last_message_at = Some(at);
            }
            reconcile::sort_rooms(&mut self.rooms);
        }
    }
}
