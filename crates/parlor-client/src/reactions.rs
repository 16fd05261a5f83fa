use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use parlor_types::models::{ReactionGroup, Reactor};

use crate::client::{ChatClient, InFlight};
use crate::error::ClientError;
use crate::events::SyncEvent;
use crate::reconcile::{self, ReactionDelta};

/// Timer key of the delayed refresh that follows an own reaction change.
pub fn refresh_key(message_id: Uuid) -> String {
    format!("reactions:{}", message_id)
}

impl ChatClient {
    /// Add the reaction if the current user has not placed it, else remove it.
    pub async fn toggle_reaction(&self, message_id: Uuid, emoji: &str) -> Result<(), ClientError> {
        let emoji = emoji.trim();
        let reacted = {
            let state = self.inner.state.read().await;
            match (state.user_id(), state.message(message_id)) {
                (Some(me), Some(message)) => reconcile::user_reacted(&message.reactions, emoji, me),
                _ => false,
            }
        };

        if reacted {
            self.remove_reaction(message_id, emoji).await
        } else {
            self.add_reaction(message_id, emoji).await
        }
    }

    /// `already_exists` from the server counts as success.
    pub async fn add_reaction(&self, message_id: Uuid, emoji: &str) -> Result<(), ClientError> {
        let result = async {
            let emoji = emoji.trim();
            if emoji.is_empty() {
                return Err(ClientError::validation("Emoji is required"));
            }
            self.api().add_reaction(message_id, emoji).await
        }
        .await;
        self.checked(result)?;

        let me = self.inner.state.read().await.user.clone();
        if let Some(me) = me {
            let reactor = Reactor {
                id: me.id,
                name: me.name,
                avatar: me.avatar,
                timestamp: Utc::now(),
            };
            self.apply_delta(message_id, emoji.trim(), ReactionDelta::Add(reactor))
                .await;
        }
        self.schedule_reaction_refresh(message_id);
        Ok(())
    }

    /// A reaction the server no longer has counts as removed.
    pub async fn remove_reaction(&self, message_id: Uuid, emoji: &str) -> Result<(), ClientError> {
        let emoji = emoji.trim();
        match self.api().remove_reaction(message_id, emoji).await {
            Ok(_) => {}
            Err(ClientError::NotFound(msg)) => debug!("Reaction already gone: {}", msg),
            Err(e) => return self.checked(Err(e)),
        }

        if let Some(me) = self.current_user_id().await {
            self.apply_delta(message_id, emoji, ReactionDelta::Remove(me))
                .await;
        }
        self.schedule_reaction_refresh(message_id);
        Ok(())
    }

    async fn apply_delta(&self, message_id: Uuid, emoji: &str, delta: ReactionDelta) {
        let changed = match self.inner.state.write().await.message_mut(message_id) {
            Some(message) => reconcile::apply_reaction_delta(&mut message.reactions, emoji, delta),
            None => false,
        };
        if changed {
            self.emit(SyncEvent::ReactionsChanged { message_id });
        }
    }

    /// Replace any pending refresh for the same message.
    fn schedule_reaction_refresh(&self, message_id: Uuid) {
        let delay = self.config().reaction_reconcile;
        self.after(&refresh_key(message_id), delay, move |client| async move {
            let _ = client.refresh_reactions(message_id).await;
        });
    }

    /// Overwrite a message's local reactions with the server's aggregate.
    pub async fn refresh_reactions(&self, message_id: Uuid) -> Result<(), ClientError> {
        let resp = match self.api().reactions(message_id).await {
            Ok(resp) => resp,
            Err(e) => {
                self.swallow("Reaction refresh", &e);
                return Err(e);
            }
        };
        self.replace_reactions(message_id, resp.reactions).await;
        Ok(())
    }

    async fn replace_reactions(&self, message_id: Uuid, mut reactions: Vec<ReactionGroup>) {
        reconcile::normalize_reactions(&mut reactions);
        let changed = match self.inner.state.write().await.message_mut(message_id) {
            Some(message) if message.reactions != reactions => {
                message.reactions = reactions;
                true
            }
            _ => false,
        };
        if changed {
            self.emit(SyncEvent::ReactionsChanged { message_id });
        }
    }

    /// Reaction poll: one message snapshot, reactions of known messages replaced.
    pub async fn sync_reactions(&self, room_id: Uuid) {
        if !self.inner.state.read().await.is_active(room_id) {
            debug!("Stale reaction poll for {}", room_id);
            return;
        }
        let Some(_guard) = InFlight::try_acquire(&self.inner.reactions_in_flight) else {
            debug!("Reaction poll already in flight");
            return;
        };

        let snapshot = match self.api().list_messages(room_id).await {
            Ok(messages) => messages,
            Err(e) => {
                self.swallow("Reaction poll", &e);
                return;
            }
        };

        let mut changed = Vec::new();
        {
            let mut state = self.inner.state.write().await;
            if !state.is_active(room_id) {
                return;
            }
            for mut remote in snapshot {
                reconcile::normalize_reactions(&mut remote.reactions);
                if let Some(local) = state.message_mut(remote.id) {
                    if local.reactions != remote.reactions {
                        local.reactions = remote.reactions;
                        changed.push(remote.id);
                    }
                }
            }
        }

        for message_id in changed {
            self.emit(SyncEvent::ReactionsChanged { message_id });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::Method;

    use super::*;
    use crate::testing::FakeBackend;
    use parlor_types::models::User;

    /// Ada viewing a room that holds one message from Bob.
    async fn setup() -> (FakeBackend, ChatClient, User, User, Uuid, Uuid) {
        let backend = FakeBackend::new();
        let (client, ada) = backend.signed_in("Ada").await;
        let bob = backend.add_user("Bob");
        let room = backend.create_group(ada.id, "general", &[bob.id]);
        let message = backend.post_as(bob.id, room, "ship it?");
        client.select_room(Some(room)).await.unwrap();
        (backend, client, ada, bob, room, message)
    }

    async fn local_reactions(client: &ChatClient, message_id: Uuid) -> Vec<ReactionGroup> {
        client
            .snapshot()
            .await
            .message(message_id)
            .map(|m| m.reactions.clone())
            .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn own_reaction_is_applied_then_reconciled() {
        let (backend, client, ada, bob, _, message) = setup().await;

        client.add_reaction(message, "👍").await.unwrap();
        let groups = local_reactions(&client, message).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 1);
        assert_eq!(groups[0].users[0].id, ada.id);
        assert!(client.is_scheduled(&refresh_key(message)));

        backend.react_as(bob.id, message, "👍");
        tokio::time::sleep(Duration::from_secs(3)).await;

        let groups = local_reactions(&client, message).await;
        assert_eq!(groups[0].count, backend.reaction_count(message, "👍"));
        assert_eq!(groups[0].count, 2);
        assert!(!client.is_scheduled(&refresh_key(message)));
    }

    #[tokio::test]
    async fn toggle_adds_then_removes() {
        let (backend, client, ada, _, _, message) = setup().await;

        client.toggle_reaction(message, "🎉").await.unwrap();
        assert_eq!(backend.reaction_count(message, "🎉"), 1);
        assert!(reconcile::user_reacted(&local_reactions(&client, message).await, "🎉", ada.id));

        client.toggle_reaction(message, "🎉").await.unwrap();
        assert_eq!(backend.reaction_count(message, "🎉"), 0);
        assert!(local_reactions(&client, message).await.is_empty());
    }

    #[tokio::test]
    async fn toggle_ignores_surrounding_whitespace() {
        let (backend, client, ada, _, _, message) = setup().await;

        client.toggle_reaction(message, "🎉").await.unwrap();
        assert!(reconcile::user_reacted(&local_reactions(&client, message).await, "🎉", ada.id));

        client.toggle_reaction(message, " 🎉 ").await.unwrap();
        assert_eq!(backend.reaction_count(message, "🎉"), 0);
        assert_eq!(backend.calls(Method::POST, "/reactions"), 1);
        assert!(local_reactions(&client, message).await.is_empty());
    }

    #[tokio::test]
    async fn adding_twice_counts_once() {
        let (backend, client, _, _, _, message) = setup().await;

        client.add_reaction(message, "👍").await.unwrap();
        client.add_reaction(message, "👍").await.unwrap();

        assert_eq!(backend.reaction_count(message, "👍"), 1);
        assert_eq!(local_reactions(&client, message).await[0].count, 1);
    }

    #[tokio::test]
    async fn removing_a_missing_reaction_is_not_an_error() {
        let (backend, client, _, _, _, message) = setup().await;

        client.remove_reaction(message, "👀").await.unwrap();
        assert_eq!(backend.calls(Method::DELETE, "/reactions"), 1);
        assert!(local_reactions(&client, message).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_refresh_is_replaced() {
        let (backend, client, _, _, _, message) = setup().await;

        client.add_reaction(message, "👍").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        client.add_reaction(message, "🎉").await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(backend.calls(Method::GET, "/reactions"), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.calls(Method::GET, "/reactions"), 1);
        assert_eq!(local_reactions(&client, message).await.len(), 2);
    }

    #[tokio::test]
    async fn reaction_poll_only_touches_known_messages() {
        let (backend, client, _, bob, room, message) = setup().await;
        backend.react_as(bob.id, message, "❤️");
        backend.post_as(bob.id, room, "arrived after load");

        client.sync_reactions(room).await;

        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.messages.len(), 1);
        let groups = &snapshot.messages[0].reactions;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].emoji, "❤️");
        assert_eq!(groups[0].users[0].id, bob.id);
    }

    #[tokio::test]
    async fn failed_add_leaves_local_state_alone() {
        let (backend, client, _, _, _, message) = setup().await;
        backend.fail_next(Method::POST, "/reactions", 500);

        let err = client.add_reaction(message, "👍").await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 500, .. }));
        assert!(local_reactions(&client, message).await.is_empty());
        assert!(!client.is_scheduled(&refresh_key(message)));
    }
}
