//! Router configuration for the appeals service.
//!
//! Builds the complete Axum router with all endpoints.

use super::health::{health_check, metrics, readiness_check};
use super::state::AppState;
use crate::api::{export, messages, tickets, websocket};
use appeals_web::track_request;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;

/// Largest accepted request body. Attachments travel inline as base64.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Build the complete Axum router.
///
/// Configures:
/// - Health, readiness and metrics (no authentication)
/// - Ticket, thread and export endpoints
/// - The WebSocket endpoint
///
/// Every route runs inside [`track_request`].
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Tickets
        .route("/tickets", post(tickets::create_ticket).get(tickets::list_tickets))
        .route("/tickets/export", get(export::export_tickets))
        .route("/tickets/:id", get(tickets::get_ticket))
        .route("/tickets/:id/history", get(tickets::get_history))
        // State machine
        .route("/tickets/:id/assign", put(tickets::assign))
        .route("/tickets/:id/claim", post(tickets::claim))
        .route("/tickets/:id/status", put(tickets::change_status))
        .route("/tickets/:id/department", put(tickets::change_department))
        .route("/tickets/:id/watchers", put(tickets::set_watchers))
        // Thread
        .route(
            "/tickets/:id/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route("/tickets/:id/messages/read-bulk", post(messages::mark_read_bulk))
        .route(
            "/tickets/:id/messages/:message_id/read",
            post(messages::mark_read_one),
        )
        .route(
            "/messages/:id",
            put(messages::edit_message).delete(messages::delete_message),
        )
        // Real-time
        .route("/ws", get(websocket::ws_handler));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(from_fn(track_request))
        .with_state(state)
}
