pub mod auth;
pub mod convert;
pub mod error;
pub mod files;
pub mod members;
pub mod messages;
pub mod middleware;
pub mod presence;
pub mod reactions;
pub mod rooms;
pub mod routes;
pub mod state;
pub mod users;

pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::{AppState, AppStateInner};
