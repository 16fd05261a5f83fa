use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;
use uuid::Uuid;

use parlor_types::MAX_FILE_BYTES;
use parlor_types::api::{SendMessageRequest, UploadFileRequest};
use parlor_types::models::{Message, MessageKind};

use crate::client::{ChatClient, InFlight};
use crate::error::ClientError;
use crate::events::{NoticeLevel, SyncEvent};
use crate::reconcile;
use crate::state::Phase;

pub const MESSAGE_POLL: &str = "message-poll";
pub const REACTION_POLL: &str = "reaction-poll";

/// A local file waiting to be uploaded into the active room.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ChatClient {
    /// Switch the message view to `room_id`, or close it with `None`.
    ///
    /// Timers of the previous room are cancelled before anything else; the
    /// new room's timers start once its first fetch has landed.
    pub async fn select_room(&self, room_id: Option<Uuid>) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.write().await;
            self.cancel_room_timers();
            state.active_room = room_id;
            state.messages.clear();
            state.phase = if room_id.is_some() { Phase::Loading } else { Phase::Idle };
        }
        let Some(room_id) = room_id else {
            return Ok(());
        };
        self.emit(SyncEvent::MessagesChanged { room_id });

        let fetched = self.load_messages(room_id).await;

        {
            let mut state = self.inner.state.write().await;
            if !state.is_active(room_id) {
                debug!("Room {} deselected while loading", room_id);
                return Ok(());
            }
            state.phase = Phase::Ready;
            self.start_room_timers(room_id);
        }

        self.mark_room_as_read(room_id).await;
        self.checked(fetched)
    }

    /// Full replace of the active room's messages.
    ///
    /// A response for a room that is no longer active is dropped.
    pub async fn fetch_messages(&self, room_id: Uuid) -> Result<(), ClientError> {
        self.load_messages(room_id)
            .await
            .inspect_err(|e| self.swallow("Message fetch", e))
    }

    async fn load_messages(&self, room_id: Uuid) -> Result<(), ClientError> {
        let messages = self.api().list_messages(room_id).await?;

        let mut state = self.inner.state.write().await;
        if !state.is_active(room_id) {
            debug!("Discarding messages for inactive room {}", room_id);
            return Ok(());
        }
        state.messages = reconcile::reconcile_messages(messages);
        if let Some(latest) = state.messages.last().map(|m| m.created_at) {
            state.bump_activity(room_id, latest);
        }
        drop(state);

        self.emit(SyncEvent::MessagesChanged { room_id });
        Ok(())
    }

    pub(crate) fn start_room_timers(&self, room_id: Uuid) {
        self.every(MESSAGE_POLL, self.config().message_poll, move |client| async move {
            client.poll_for_new_messages(room_id).await;
        });
        self.every(REACTION_POLL, self.config().reaction_poll, move |client| async move {
            client.sync_reactions(room_id).await;
        });
    }

    pub(crate) fn cancel_room_timers(&self) {
        self.inner.scheduler.cancel(MESSAGE_POLL);
        self.inner.scheduler.cancel(REACTION_POLL);
    }

    /// Append messages the server has and the cache does not.
    ///
    /// When the user switched away while the request was in flight, nothing
    /// is appended; the room's unread badge and activity time move instead.
    pub async fn poll_for_new_messages(&self, room_id: Uuid) {
        if !self.inner.state.read().await.is_active(room_id) {
            debug!("Stale message poll for {}", room_id);
            return;
        }
        let Some(_guard) = InFlight::try_acquire(&self.inner.messages_in_flight) else {
            debug!("Message poll already in flight");
            return;
        };

        let incoming = match self.api().list_messages(room_id).await {
            Ok(messages) => messages,
            Err(e) => {
                self.swallow("Message poll", &e);
                return;
            }
        };
        let latest = incoming.iter().map(|m| m.created_at).max();

        let mut state = self.inner.state.write().await;
        let me = state.user_id();

        if state.is_active(room_id) {
            let known = state.messages.len();
            let added = reconcile::merge_new_messages(&mut state.messages, incoming);
            if added == 0 {
                return;
            }
            let unread: Vec<Uuid> = state.messages[known..]
                .iter()
                .filter(|m| Some(m.user_id) != me)
                .map(|m| m.id)
                .collect();
            if let Some(latest) = latest {
                state.bump_activity(room_id, latest);
            }
            drop(state);

            debug!("{} new message(s) in {}", added, room_id);
            self.emit(SyncEvent::MessagesChanged { room_id });
            self.emit(SyncEvent::RoomsChanged);
            self.mark_messages_as_read(unread).await;
            return;
        }

        let Some(room) = state.room_mut(room_id) else {
            return;
        };
        let unseen = reconcile::count_unseen(&incoming, room.last_message_at, me);
        if unseen == 0 {
            return;
        }
        room.unread_count += unseen as i64;
        if let Some(latest) = latest {
            state.bump_activity(room_id, latest);
        }
        drop(state);

        debug!("{} unseen message(s) in background room {}", unseen, room_id);
        self.emit(SyncEvent::RoomsChanged);
    }

    pub async fn send_message(&self, content: &str, kind: MessageKind) -> Result<Message, ClientError> {
        let result = async {
            let room_id = self
                .active_room()
                .await
                .ok_or_else(|| ClientError::validation("No room selected"))?;
            if content.trim().is_empty() {
                return Err(ClientError::validation("Message cannot be empty"));
            }
            if kind == MessageKind::File {
                return Err(ClientError::validation("Files are sent with send_file"));
            }
            let request = SendMessageRequest {
                room_id,
                content: content.to_string(),
                kind,
            };
            self.api().send_message(&request).await
        }
        .await;
        let message = self.checked(result)?;

        self.absorb(message.clone()).await;
        Ok(message)
    }

    pub async fn send_file(&self, file: OutgoingFile) -> Result<Message, ClientError> {
        let result = async {
            let room_id = self
                .active_room()
                .await
                .ok_or_else(|| ClientError::validation("No room selected"))?;
            if file.name.trim().is_empty() {
                return Err(ClientError::validation("File name is required"));
            }
            if file.bytes.is_empty() {
                return Err(ClientError::validation("File is empty"));
            }
            if file.bytes.len() > MAX_FILE_BYTES {
                return Err(ClientError::validation(format!(
                    "File exceeds {} MiB",
                    MAX_FILE_BYTES / (1024 * 1024)
                )));
            }
            let request = UploadFileRequest {
                file_data: BASE64.encode(&file.bytes),
                file_name: file.name.clone(),
                file_type: if file.mime.is_empty() {
                    "application/octet-stream".into()
                } else {
                    file.mime.clone()
                },
                room_id,
            };
            self.api().upload_file(&request).await
        }
        .await;
        let message = self.checked(result)?;

        self.absorb(message.clone()).await;
        Ok(message)
    }

    /// Fold a message we just created into the cache.
    async fn absorb(&self, message: Message) {
        let room_id = message.room_id;
        let created_at = message.created_at;

        let mut state = self.inner.state.write().await;
        let appended = state.is_active(room_id) && reconcile::append_if_absent(&mut state.messages, message);
        state.bump_activity(room_id, created_at);
        drop(state);

        if appended {
            self.emit(SyncEvent::MessagesChanged { room_id });
        }
        self.emit(SyncEvent::RoomsChanged);
    }

    pub async fn delete_message(&self, message_id: Uuid) -> Result<(), ClientError> {
        self.checked(self.api().delete_message(message_id).await)?;

        let mut state = self.inner.state.write().await;
        let before = state.messages.len();
        state.messages.retain(|m| m.id != message_id);
        let room_id = (state.messages.len() != before)
            .then_some(state.active_room)
            .flatten();
        drop(state);

        if let Some(room_id) = room_id {
            self.emit(SyncEvent::MessagesChanged { room_id });
        }
        Ok(())
    }

    /// Best effort; failures are logged.
    pub async fn mark_messages_as_read(&self, message_ids: Vec<Uuid>) {
        if message_ids.is_empty() {
            return;
        }
        if let Err(e) = self.api().mark_messages_read(message_ids.clone()).await {
            self.swallow("Mark messages read", &e);
            return;
        }

        let mut state = self.inner.state.write().await;
        let Some(me) = state.user_id() else {
            return;
        };
        for message in state.messages.iter_mut() {
            if message_ids.contains(&message.id) && !message.read_by.contains(&me) {
                message.read_by.push(me);
            }
        }
    }

    /// Clear the room's unread badge locally, then tell the server.
    pub async fn mark_room_as_read(&self, room_id: Uuid) {
        let changed = match self.inner.state.write().await.room_mut(room_id) {
            Some(room) if room.unread_count != 0 => {
                room.unread_count = 0;
                true
            }
            _ => false,
        };
        if changed {
            self.emit(SyncEvent::RoomsChanged);
        }

        if let Err(e) = self.api().mark_room_read(room_id).await {
            self.swallow("Mark room read", &e);
        }
    }

    pub async fn forward_message(&self, message_id: Uuid, target_room_id: Uuid) -> Result<Message, ClientError> {
        let message = self.checked(self.api().forward_message(message_id, target_room_id).await)?;

        self.absorb(message.clone()).await;
        self.notice(NoticeLevel::Info, "Message forwarded");
        Ok(message)
    }

    pub async fn search_messages(&self, room_id: Uuid, query: &str) -> Result<Vec<Message>, ClientError> {
        let result = async {
            let query = query.trim();
            if query.is_empty() {
                return Err(ClientError::validation("Search query is required"));
            }
            self.api().search_messages(room_id, query).await
        }
        .await;
        self.checked(result)
    }
}
