use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::AppState;
use crate::error::RealtimeError;
use crate::ws::protocol::SessionUser;
use crate::ws::session::{run_chat_session, run_notification_session};

/// Identity of the connecting client.
///
/// Token issuance and verification live in the portal's edge; by the time
/// an upgrade reaches this process the resolved user id rides along as a
/// query parameter and is validated against the user directory.
#[derive(Deserialize)]
pub struct IdentityQuery {
    pub user_id: String,
}

async fn resolve_identity(state: &AppState, user_id: &str) -> Result<SessionUser, RealtimeError> {
    match state.realtime.repository.get_user(user_id).await? {
        Some(user) => Ok(SessionUser {
            user_id: user.id,
            username: user.username,
        }),
        None => Err(RealtimeError::UnknownUser(user_id.to_string())),
    }
}

/// `GET /ws/chat/{room_id}` — upgrade into a chat session.
///
/// Unknown users are refused here with a status code; room membership is
/// checked after the upgrade in `ChatSession::connect`, so a non-member
/// sees an immediate close.
pub async fn chat_ws_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(identity): Query<IdentityQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match resolve_identity(&state, &identity.user_id).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    let realtime = state.realtime.clone();
    ws.on_upgrade(move |socket| run_chat_session(socket, room_id, user, realtime))
}

/// `GET /ws/notifications` — upgrade into a per-user notification session.
pub async fn notifications_ws_handler(
    State(state): State<AppState>,
    Query(identity): Query<IdentityQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match resolve_identity(&state, &identity.user_id).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    let realtime = state.realtime.clone();
    ws.on_upgrade(move |socket| run_notification_session(socket, user, realtime))
}
