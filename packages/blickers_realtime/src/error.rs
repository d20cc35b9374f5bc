use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors raised by the realtime core.
///
/// Authorization and not-found failures are terminal for a single
/// operation, never for the hub. Transport closure is not represented
/// here: a dropped connection takes the normal close path.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("user {user_id} is not a member of room {room_id}")]
    NotARoomMember { user_id: String, room_id: String },

    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl IntoResponse for RealtimeError {
    fn into_response(self) -> Response {
        let status = match &self {
            RealtimeError::NotARoomMember { .. } => StatusCode::FORBIDDEN,
            RealtimeError::UnknownUser(_) => StatusCode::UNAUTHORIZED,
            RealtimeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            // Don't leak storage details to clients
            RealtimeError::Storage(_) => "storage failure".to_string(),
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
