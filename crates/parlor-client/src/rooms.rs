use tracing::debug;
use uuid::Uuid;

use parlor_types::api::{CreateRoomRequest, LeaveRoomResponse, MembersResponse};
use parlor_types::models::{Room, RoomType, User};

use crate::client::ChatClient;
use crate::error::ClientError;
use crate::events::SyncEvent;
use crate::reconcile;

pub const ROOM_POLL: &str = "room-poll";

impl ChatClient {
    /// Replace the local room list with the server's.
    ///
    /// Overlapping calls collapse into the one already running. A failure
    /// leaves the previous list in place.
    pub async fn fetch_rooms(&self) -> Result<(), ClientError> {
        let Ok(_guard) = self.inner.rooms_fetch.try_lock() else {
            debug!("Room fetch already in flight");
            return Ok(());
        };
        self.load_rooms().await
    }

    /// Fetch after a local mutation. Waits out a running fetch, which may
    /// predate the mutation, then fetches again.
    async fn refetch_rooms(&self) -> Result<(), ClientError> {
        let _guard = self.inner.rooms_fetch.lock().await;
        self.load_rooms().await
    }

    async fn load_rooms(&self) -> Result<(), ClientError> {
        let rooms = match self.api().list_rooms().await {
            Ok(rooms) => rooms,
            Err(e) => {
                self.swallow("Room fetch", &e);
                return Err(e);
            }
        };

        self.inner.state.write().await.rooms = reconcile::reconcile_rooms(rooms);
        self.mark_room_fetch();
        self.emit(SyncEvent::RoomsChanged);
        Ok(())
    }

    /// Timer entry point. Skipped when a fetch completed very recently.
    pub async fn poll_rooms(&self) {
        let min = self.config().room_min_fetch;
        if self.last_room_fetch().is_some_and(|at| at.elapsed() < min) {
            debug!("Room poll skipped, last fetch is fresh");
            return;
        }
        let _ = self.fetch_rooms().await;
    }

    pub(crate) fn start_room_poll(&self) {
        let period = self.config().room_poll;
        self.every(ROOM_POLL, period, |client| async move {
            client.poll_rooms().await;
        });
    }

    pub async fn create_room(
        &self,
        name: &str,
        description: Option<&str>,
        room_type: RoomType,
        member_ids: Vec<Uuid>,
    ) -> Result<Room, ClientError> {
        let result = async {
            let name = name.trim();
            if name.is_empty() {
                return Err(ClientError::validation("Room name is required"));
            }
            if room_type == RoomType::Dm {
                return Err(ClientError::validation("Direct messages are started with create_dm"));
            }
            let request = CreateRoomRequest {
                name: name.to_string(),
                description: description.map(str::to_string).filter(|d| !d.trim().is_empty()),
                room_type,
                member_ids,
            };
            self.api().create_room(&request).await
        }
        .await;
        let room = self.checked(result)?;

        let _ = self.refetch_rooms().await;
        Ok(room)
    }

    /// Open (or find) the direct-message room with `target` and select it.
    pub async fn create_dm(&self, target: Uuid) -> Result<Room, ClientError> {
        let resp = self.checked(self.api().create_dm(target).await)?;
        let room = resp.room;

        let inserted = resp.is_new && self.inner.state.write().await.insert_room(room.clone());
        if inserted {
            self.emit(SyncEvent::RoomsChanged);
        } else {
            let _ = self.refetch_rooms().await;
        }

        self.select_room(Some(room.id)).await?;
        Ok(room)
    }

    pub async fn join_room(&self, room_id: Uuid) -> Result<Room, ClientError> {
        let room = self.checked(self.api().join_room(room_id).await)?;
        let _ = self.refetch_rooms().await;
        Ok(room)
    }

    pub async fn leave_room(&self, room_id: Uuid) -> Result<LeaveRoomResponse, ClientError> {
        let resp = self.checked(self.api().leave_room(room_id).await)?;
        self.forget_room(room_id).await;
        Ok(resp)
    }

    pub async fn delete_room(&self, room_id: Uuid) -> Result<(), ClientError> {
        self.checked(self.api().delete_room(room_id).await)?;
        self.forget_room(room_id).await;
        Ok(())
    }

    async fn forget_room(&self, room_id: Uuid) {
        let mut state = self.inner.state.write().await;
        if state.remove_room(room_id) {
            self.cancel_room_timers();
            debug!("Active room {} removed", room_id);
        }
        drop(state);
        self.emit(SyncEvent::RoomsChanged);
    }

    pub async fn transfer_admin(&self, room_id: Uuid, new_admin_id: Uuid) -> Result<Room, ClientError> {
        let room = self.checked(self.api().transfer_admin(room_id, new_admin_id).await)?;

        if let Some(local) = self.inner.state.write().await.room_mut(room_id) {
            local.admin_id = room.admin_id;
            local.updated_at = room.updated_at;
        }
        self.emit(SyncEvent::RoomsChanged);
        Ok(room)
    }

    pub async fn list_members(&self, room_id: Uuid) -> Result<MembersResponse, ClientError> {
        let resp = self.checked(self.api().list_members(room_id).await)?;

        if let Some(local) = self.inner.state.write().await.room_mut(room_id) {
            local.member_count = resp.members.len() as i64;
            local.admin_id = resp.room.admin_id;
        }
        Ok(resp)
    }

    pub async fn add_member(&self, room_id: Uuid, user_id: Uuid) -> Result<User, ClientError> {
        let user = self.checked(self.api().add_member(room_id, user_id).await)?;

        if let Some(local) = self.inner.state.write().await.room_mut(room_id) {
            local.member_count += 1;
        }
        self.emit(SyncEvent::RoomsChanged);
        Ok(user)
    }

    pub async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> Result<(), ClientError> {
        self.checked(self.api().remove_member(room_id, user_id).await)?;

        if let Some(local) = self.inner.state.write().await.room_mut(room_id) {
            local.member_count = (local.member_count - 1).max(0);
        }
        self.emit(SyncEvent::RoomsChanged);
        Ok(())
    }
}
