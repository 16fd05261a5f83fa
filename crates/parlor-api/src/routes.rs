use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, files, members, messages, presence, reactions, rooms, users};

/// Uploads carry base64 payloads of up to 10 MiB decoded.
const BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Every resource endpoint. CORS and tracing layers are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth", post(auth::auth))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/users",
            get(users::get_profile)
                .put(users::update_profile)
                .post(users::search_users),
        )
        .route(
            "/rooms",
            get(rooms::list_rooms)
                .post(rooms::create_room)
                .put(rooms::join_room)
                .delete(rooms::leave_room),
        )
        .route("/create-dm", post(rooms::create_dm))
        .route("/delete-room", delete(rooms::delete_room))
        .route(
            "/room-members",
            get(members::list_members)
                .post(members::add_member)
                .delete(members::remove_member),
        )
        .route("/room-members-transfer-admin", post(members::transfer_admin))
        .route(
            "/messages",
            get(messages::get_messages)
                .post(messages::send_message)
                .put(messages::mark_messages_read)
                .delete(messages::delete_message),
        )
        .route("/messages-search", get(messages::search_messages))
        .route("/messages-forward", post(messages::forward_message))
        .route("/mark-read", post(messages::mark_room_read))
        .route(
            "/reactions",
            get(reactions::get_reactions)
                .post(reactions::add_reaction)
                .delete(reactions::remove_reaction),
        )
        .route("/upload-file", post(files::upload_file))
        .route(
            "/presence",
            get(presence::list_presence)
                .post(presence::set_presence)
                .put(presence::heartbeat),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}
