pub mod chat;
pub mod notifications;
pub mod websocket;

pub use chat::{list_room_messages, room_handler};
pub use notifications::push_notification_handler;
pub use websocket::{chat_ws_handler, notifications_ws_handler};

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::AppState;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> Response {
    let db_ok = state.db.pool.acquire().await.is_ok();

    if db_ok {
        Json(serde_json::json!({
            "status": "healthy",
            "database": "connected"
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "database": "disconnected"
            })),
        )
            .into_response()
    }
}
