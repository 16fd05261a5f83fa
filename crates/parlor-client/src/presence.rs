use std::cmp::Reverse;

use tracing::{debug, info};
use uuid::Uuid;

use parlor_types::models::{PresenceStatus, User};

use crate::client::ChatClient;
use crate::error::ClientError;
use crate::events::SyncEvent;
use crate::rooms::ROOM_POLL;

pub const HEARTBEAT: &str = "heartbeat";

impl ChatClient {
    pub async fn update_presence(&self, status: PresenceStatus) -> Result<PresenceStatus, ClientError> {
        let status = self.checked(self.api().set_presence(status).await)?;
        if let Some(user) = self.inner.state.write().await.user.as_mut() {
            user.online = status == PresenceStatus::Online;
        }
        Ok(status)
    }

    pub async fn send_heartbeat(&self) -> Result<(), ClientError> {
        self.api()
            .heartbeat()
            .await
            .map(|_| ())
            .inspect_err(|e| self.swallow("Heartbeat", e))
    }

    /// Online users first, then by most recent activity. The caller is excluded.
    pub async fn fetch_online_users(&self, room_id: Option<Uuid>) -> Result<Vec<User>, ClientError> {
        let mut users = self.checked(self.api().online_users(room_id).await)?;

        let me = self.current_user_id().await;
        users.retain(|u| Some(u.id) != me);
        users.sort_by_key(|u| (Reverse(u.online), Reverse(u.last_seen)));

        self.inner.state.write().await.online_users = users.clone();
        self.emit(SyncEvent::PresenceChanged);
        Ok(users)
    }

    /// Go online, load rooms and start the session-wide timers.
    pub async fn start(&self) -> Result<(), ClientError> {
        if let Err(e) = self.api().set_presence(PresenceStatus::Online).await {
            self.swallow("Going online", &e);
        }

        let fetched = self.fetch_rooms().await;

        self.start_room_poll();
        self.every(HEARTBEAT, self.config().heartbeat, |client| async move {
            let _ = client.send_heartbeat().await;
        });
        info!("Sync started");
        fetched
    }

    /// Stop every timer and go offline, best effort.
    pub async fn shutdown(&self) {
        self.inner.scheduler.cancel_all();
        if let Err(e) = self.api().set_presence(PresenceStatus::Offline).await {
            debug!("Going offline failed: {}", e);
        }
        info!("Sync stopped");
    }

    pub fn is_polling(&self) -> bool {
        self.is_scheduled(ROOM_POLL) && self.is_scheduled(HEARTBEAT)
    }
}
