use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::AppState;
use crate::models::{ChatRoom, User};
use crate::ws::protocol::format_wire_timestamp;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Serialize)]
pub struct RoomResponse {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub members: Vec<User>,
}

/// GET /api/rooms/{room_id} — room metadata plus member list.
pub async fn room_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let repository = &state.realtime.repository;

    let room = match repository.get_room(&room_id).await {
        Ok(Some(room)) => room,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to load room {}: {:#}", room_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let members = match repository.room_members(&room_id).await {
        Ok(members) => members,
        Err(e) => {
            error!("Failed to load members for room {}: {:#}", room_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    Ok(Json(RoomResponse { room, members }))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    /// Fetch messages appended strictly before this cursor.
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct HistoryEntry {
    /// Pagination cursor: position in the room's append order.
    pub seq: i64,
    pub message_id: String,
    pub user_id: String,
    pub message: String,
    pub timestamp: String,
    pub is_read: bool,
    pub read_by: Vec<String>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryEntry>,
    pub has_more: bool,
}

/// GET /api/rooms/{room_id}/messages — paginated history, oldest first.
pub async fn list_room_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let repository = &state.realtime.repository;

    match repository.get_room(&room_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to load room {}: {:#}", room_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (page, has_more) = match repository
        .message_history(&room_id, query.before, limit)
        .await
    {
        Ok(page) => page,
        Err(e) => {
            error!("Failed to load history for room {}: {:#}", room_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mut messages = Vec::with_capacity(page.len());
    for entry in page {
        let read_by = match repository.read_receipts(&entry.message.id).await {
            Ok(readers) => readers,
            Err(e) => {
                error!("Failed to load receipts for {}: {:#}", entry.message.id, e);
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        messages.push(HistoryEntry {
            seq: entry.seq,
            message_id: entry.message.id,
            user_id: entry.message.sender_id,
            message: entry.message.content,
            timestamp: format_wire_timestamp(entry.message.timestamp),
            is_read: entry.message.is_read,
            read_by,
        });
    }

    Ok(Json(HistoryResponse { messages, has_more }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    use crate::repository::test_helpers::seed_room;

    async fn test_router() -> (Router, AppState) {
        let state = crate::test_helpers::test_app_state().await;
        seed_room(
            &state.realtime.repository,
            "r-1",
            &[("u-a", "alice"), ("u-b", "bob")],
        )
        .await;
        let router = Router::new()
            .route("/api/rooms/{room_id}", get(room_handler))
            .route("/api/rooms/{room_id}/messages", get(list_room_messages))
            .with_state(state.clone());
        (router, state)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn room_with_members() {
        let (app, _state) = test_router().await;
        let (status, json) = get_json(&app, "/api/rooms/r-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "r-1");
        assert_eq!(json["members"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_room_is_404() {
        let (app, _state) = test_router().await;
        let (status, _) = get_json(&app, "/api/rooms/r-404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json(&app, "/api/rooms/r-404/messages").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_pages_oldest_first() {
        let (app, state) = test_router().await;
        let repository = &state.realtime.repository;
        for i in 0..5 {
            repository
                .append_message("r-1", "u-a", &format!("m{}", i))
                .await
                .unwrap();
        }

        let (status, json) = get_json(&app, "/api/rooms/r-1/messages?limit=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["has_more"], true);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        // Newest page, oldest entry first
        assert_eq!(messages[0]["message"], "m2");
        assert_eq!(messages[2]["message"], "m4");

        let cursor = messages[0]["seq"].as_i64().unwrap();
        let uri = format!("/api/rooms/r-1/messages?limit=3&before={}", cursor);
        let (_, json) = get_json(&app, &uri).await;
        assert_eq!(json["has_more"], false);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["message"], "m0");
    }

    #[tokio::test]
    async fn history_carries_read_receipts() {
        let (app, state) = test_router().await;
        let repository = &state.realtime.repository;
        let stored = repository.append_message("r-1", "u-a", "hi").await.unwrap();
        repository
            .mark_message_read(&stored.id, "u-b")
            .await
            .unwrap();

        let (_, json) = get_json(&app, "/api/rooms/r-1/messages").await;
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages[0]["is_read"], true);
        assert_eq!(messages[0]["read_by"][0], "u-b");
    }
}
