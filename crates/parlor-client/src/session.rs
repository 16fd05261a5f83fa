use tracing::{info, warn};

use parlor_types::api::{AuthRequest, AuthResponse, UpdateProfileRequest};
use parlor_types::models::User;

use crate::client::ChatClient;
use crate::error::ClientError;
use crate::events::SyncEvent;
use crate::state::ChatState;

const MIN_PASSWORD_LEN: usize = 8;
const MIN_SEARCH_LEN: usize = 2;

impl ChatClient {
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User, ClientError> {
        let result = async {
            let (email, name) = (email.trim(), name.trim());
            if email.is_empty() || name.is_empty() {
                return Err(ClientError::validation("Email and name are required"));
            }
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(ClientError::validation(format!(
                    "Password must be at least {} characters",
                    MIN_PASSWORD_LEN
                )));
            }
            let request = AuthRequest::Register {
                email: email.to_string(),
                password: password.to_string(),
                name: name.to_string(),
                avatar: None,
            };
            self.api().auth(&request).await
        }
        .await;
        let resp = self.checked(result)?;
        Ok(self.install_session(resp).await)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let result = async {
            let email = email.trim();
            if email.is_empty() || password.is_empty() {
                return Err(ClientError::validation("Email and password are required"));
            }
            let request = AuthRequest::Login {
                email: email.to_string(),
                password: password.to_string(),
            };
            self.api().auth(&request).await
        }
        .await;
        let resp = self.checked(result)?;
        Ok(self.install_session(resp).await)
    }

    /// Restore a session from a previously issued token.
    pub async fn resume(&self, token: String) -> Result<User, ClientError> {
        self.api().set_token(Some(token));
        match self.profile().await {
            Ok(user) => Ok(user),
            Err(e) => {
                self.api().set_token(None);
                Err(e)
            }
        }
    }

    async fn install_session(&self, resp: AuthResponse) -> User {
        self.api().set_token(Some(resp.token));
        self.adopt_user(resp.user.clone()).await;
        info!("Signed in as {}", resp.user.name);
        resp.user
    }

    /// Cache `user` as the current user. Switching to a different account
    /// drops the previous account's cache and timers.
    async fn adopt_user(&self, user: User) {
        let mut state = self.inner.state.write().await;
        let switched = state.user_id().is_some_and(|id| id != user.id);
        if switched {
            self.inner.scheduler.cancel_all();
            *state = ChatState::default();
        }
        state.user = Some(user);
        drop(state);

        if switched {
            self.emit(SyncEvent::RoomsChanged);
        }
    }

    /// Stop all timers and drop the local cache. The server call is best effort.
    pub async fn logout(&self) {
        self.inner.scheduler.cancel_all();
        if let Err(e) = self.api().logout().await {
            warn!("Logout request failed: {}", e);
        }
        self.api().set_token(None);
        *self.inner.state.write().await = ChatState::default();
        self.emit(SyncEvent::RoomsChanged);
    }

    pub async fn profile(&self) -> Result<User, ClientError> {
        let user = self.checked(self.api().profile().await)?;
        self.adopt_user(user.clone()).await;
        Ok(user)
    }

    pub async fn update_profile(&self, name: Option<&str>, avatar: Option<&str>) -> Result<User, ClientError> {
        let result = async {
            let name = name.map(str::trim);
            if name.is_none() && avatar.is_none() {
                return Err(ClientError::validation("Nothing to update"));
            }
            if name.is_some_and(str::is_empty) {
                return Err(ClientError::validation("Name cannot be empty"));
            }
            let request = UpdateProfileRequest {
                name: name.map(str::to_string),
                avatar: avatar.map(str::to_string),
            };
            self.api().update_profile(&request).await
        }
        .await;
        let user = self.checked(result)?;
        self.inner.state.write().await.user = Some(user.clone());
        Ok(user)
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>, ClientError> {
        let result = async {
            let query = query.trim();
            if query.chars().count() < MIN_SEARCH_LEN {
                return Err(ClientError::validation(format!(
                    "Search needs at least {} characters",
                    MIN_SEARCH_LEN
                )));
            }
            self.api().search_users(query, None).await
        }
        .await;
        self.checked(result)
    }
}
