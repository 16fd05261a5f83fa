use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, RwLock, broadcast};
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::api::ChatApi;
use crate::config::SyncConfig;
use crate::error::ClientError;
use crate::events::{NoticeLevel, SyncEvent};
use crate::scheduler::Scheduler;
use crate::state::ChatState;
use crate::transport::{HttpTransport, Transport};

/// Handle to one signed-in chat session.
///
/// Cheap to clone. Background timers only hold a weak reference, so dropping
/// the last handle stops all polling.
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) api: ChatApi,
    pub(crate) config: SyncConfig,
    pub(crate) state: RwLock<ChatState>,
    pub(crate) scheduler: Scheduler,
    events: broadcast::Sender<SyncEvent>,
    /// Serializes room list fetches so a later fetch never lands first.
    pub(crate) rooms_fetch: AsyncMutex<()>,
    pub(crate) messages_in_flight: AtomicBool,
    pub(crate) reactions_in_flight: AtomicBool,
    pub(crate) last_room_fetch: Mutex<Option<Instant>>,
}

impl ChatClient {
    pub fn new(config: SyncConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config.api_url.clone())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: SyncConfig, transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(ClientInner {
                api: ChatApi::new(transport),
                config,
                state: RwLock::new(ChatState::default()),
                scheduler: Scheduler::new(),
                events,
                rooms_fetch: AsyncMutex::new(()),
                messages_in_flight: AtomicBool::new(false),
                reactions_in_flight: AtomicBool::new(false),
                last_room_fetch: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Copy of the whole local cache.
    pub async fn snapshot(&self) -> ChatState {
        self.inner.state.read().await.clone()
    }

    pub async fn active_room(&self) -> Option<Uuid> {
        self.inner.state.read().await.active_room
    }

    pub async fn current_user_id(&self) -> Option<Uuid> {
        self.inner.state.read().await.user_id()
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        self.inner.scheduler.is_scheduled(key)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub(crate) fn api(&self) -> &ChatApi {
        &self.inner.api
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn notice(&self, level: NoticeLevel, text: impl Into<String>) {
        self.emit(SyncEvent::Notice {
            level,
            text: text.into(),
        });
    }

    /// Surface the outcome of a user-initiated action.
    pub(crate) fn checked<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        result.inspect_err(|e| {
            if e.is_unauthorized() {
                self.emit(SyncEvent::SessionExpired);
            } else {
                self.notice(NoticeLevel::Error, e.to_string());
            }
        })
    }

    /// Log a background failure. Only an expired session reaches the UI.
    pub(crate) fn swallow(&self, context: &str, e: &ClientError) {
        warn!("{} failed: {}", context, e);
        if e.is_unauthorized() {
            self.emit(SyncEvent::SessionExpired);
        }
    }

    pub(crate) fn mark_room_fetch(&self) {
        *self
            .inner
            .last_room_fetch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
    }

    pub(crate) fn last_room_fetch(&self) -> Option<Instant> {
        *self
            .inner
            .last_room_fetch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn downgrade(&self) -> Weak<ClientInner> {
        Arc::downgrade(&self.inner)
    }

    /// Recurring timer bound to this client for as long as it is alive.
    pub(crate) fn every<F, Fut>(&self, key: &str, period: Duration, task: F)
    where
        F: Fn(ChatClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak = self.downgrade();
        self.inner.scheduler.every(key, period, move || {
            let run = upgrade(&weak).map(&task);
            async move {
                if let Some(run) = run {
                    run.await;
                }
            }
        });
    }

    pub(crate) fn after<F, Fut>(&self, key: &str, delay: Duration, task: F)
    where
        F: FnOnce(ChatClient) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak = self.downgrade();
        self.inner.scheduler.after(key, delay, move || {
            let run = upgrade(&weak).map(task);
            async move {
                if let Some(run) = run {
                    run.await;
                }
            }
        });
    }
}

fn upgrade(weak: &Weak<ClientInner>) -> Option<ChatClient> {
    weak.upgrade().map(|inner| ChatClient { inner })
}

/// Single-flight guard over an [`AtomicBool`]; released on drop.
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
