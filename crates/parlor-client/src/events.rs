use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Change notifications for a UI layer. Receivers re-read the state snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    RoomsChanged,
    MessagesChanged { room_id: Uuid },
    ReactionsChanged { message_id: Uuid },
    PresenceChanged,
    /// Transient user-facing notification.
    Notice { level: NoticeLevel, text: String },
    /// The server rejected the session; send the user back to login.
    SessionExpired,
}
