//! Client-side synchronization for the Parlor chat server.
//!
//! [`ChatClient`] keeps a local cache of rooms, the active room's messages,
//! their reactions and presence in step with the server through independent
//! polling loops, and reports changes as [`SyncEvent`]s.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod messages;
pub mod presence;
pub mod reactions;
pub mod reconcile;
pub mod rooms;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::ChatApi;
pub use client::ChatClient;
pub use config::SyncConfig;
pub use error::ClientError;
pub use events::{NoticeLevel, SyncEvent};
pub use messages::OutgoingFile;
pub use state::{ChatState, Phase};
pub use transport::{ApiRequest, HttpTransport, Transport};
