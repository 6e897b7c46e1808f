pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod presence;
pub mod reactions;
pub mod receipts;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::auth::AppState;

/// Assemble the API router: public auth routes plus the JWT-protected
/// message/reaction/receipt/presence surface. Transport layers (CORS,
/// tracing) are left to the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/rooms/{room}/messages", get(messages::get_messages))
        .route("/api/rooms/{room}/messages", post(messages::send_message))
        .route("/api/rooms/{room}/users", get(presence::room_users))
        .route("/api/messages/{message_id}/read", post(receipts::mark_read))
        .route("/api/messages/{message_id}/reactions", post(reactions::toggle_reaction))
        .route("/api/messages/{message_id}/delivery", post(messages::set_delivery_state))
        .route("/api/conversations/{chat_user}/read", post(receipts::mark_conversation_read))
        .layer(axum_middleware::from_fn(middleware::require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
