// =============================================================================
// FitPulse Social Fitness Backend - API Surface
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

pub mod client_server;
pub mod gateway;

use axum::{
    routing::{delete, get, post},
    Router,
};

/// Gateway and REST routes. Middleware (tracing, CORS) is layered on by the
/// host binary.
pub fn router() -> Router {
    Router::new()
        // persistent gateway namespaces
        .route("/ws/chat", get(gateway::chat_ws))
        .route("/ws/direct", get(gateway::direct_ws))
        // room read paths
        .route(
            "/api/rooms/:room_id/messages",
            get(client_server::messages::room_history),
        )
        .route(
            "/api/rooms/:room_id/messages/export",
            get(client_server::messages::room_export),
        )
        .route(
            "/api/rooms/:room_id/online",
            get(client_server::messages::room_online),
        )
        // direct conversations
        .route(
            "/api/conversations",
            get(client_server::conversations::list_conversations),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            get(client_server::conversations::conversation_history),
        )
        .route(
            "/api/conversations/:conversation_id/read",
            post(client_server::conversations::mark_conversation_read),
        )
        .route(
            "/api/conversations/:conversation_id",
            delete(client_server::conversations::delete_conversation),
        )
        // challenge admission
        .route(
            "/api/challenges/:room_id/participants",
            get(client_server::participants::challenge_participants)
                .post(client_server::participants::join_challenge)
                .delete(client_server::participants::leave_challenge),
        )
}
