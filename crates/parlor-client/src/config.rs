use std::time::Duration;

use tracing::warn;

/// Polling cadence and server location for a [`ChatClient`](crate::ChatClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub api_url: String,
    pub room_poll: Duration,
    /// Room polls closer than this to the last completed fetch are skipped.
    pub room_min_fetch: Duration,
    pub message_poll: Duration,
    pub reaction_poll: Duration,
    /// Delay between an own reaction change and the authoritative refresh.
    pub reaction_reconcile: Duration,
    pub heartbeat: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8888".into(),
            room_poll: Duration::from_secs(30),
            room_min_fetch: Duration::from_secs(5),
            message_poll: Duration::from_secs(15),
            reaction_poll: Duration::from_secs(45),
            reaction_reconcile: Duration::from_secs(2),
            heartbeat: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `PARLOR_*` variables. Unparseable values are
    /// logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| match get(key) {
            None => fallback,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    warn!("Ignoring invalid {}={:?}", key, raw);
                    fallback
                }
            },
        };

        Self {
            api_url: get("PARLOR_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or(defaults.api_url),
            room_poll: millis("PARLOR_ROOM_POLL_MS", defaults.room_poll),
            room_min_fetch: millis("PARLOR_ROOM_MIN_FETCH_MS", defaults.room_min_fetch),
            message_poll: millis("PARLOR_MESSAGE_POLL_MS", defaults.message_poll),
            reaction_poll: millis("PARLOR_REACTION_POLL_MS", defaults.reaction_poll),
            reaction_reconcile: millis("PARLOR_REACTION_RECONCILE_MS", defaults.reaction_reconcile),
            heartbeat: millis("PARLOR_HEARTBEAT_MS", defaults.heartbeat),
        }
    }
}
