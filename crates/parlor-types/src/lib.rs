pub mod api;
pub mod models;

/// Upper bound on decoded upload size, enforced by both client and server.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Maximum number of hits returned by message search.
pub const SEARCH_RESULT_LIMIT: usize = 50;
