use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::AppState;
use crate::ws::protocol::{ServerEvent, format_wire_timestamp};

#[derive(Deserialize)]
pub struct PushNotificationRequest {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default = "default_notification_type")]
    pub notification_type: String,
    #[serde(default)]
    pub link: String,
}

fn default_notification_type() -> String {
    "general".to_string()
}

#[derive(Serialize)]
pub struct PushNotificationResponse {
    pub notification_id: String,
    /// Sessions the event was handed to. Zero when the user has no live
    /// notification session; delivery is best-effort, at most once.
    pub delivered: usize,
}

/// POST /internal/notifications/push — fan a notification out to a user's
/// live sessions. Durable notification rows are the publisher's concern;
/// this endpoint only reaches clients that are connected right now.
pub async fn push_notification_handler(
    State(state): State<AppState>,
    Json(req): Json<PushNotificationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    match state.realtime.repository.user_exists(&req.user_id).await {
        Ok(true) => {}
        Ok(false) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to look up user {}: {:#}", req.user_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let notification_id = Uuid::new_v4().to_string();
    let event = ServerEvent::Notification {
        notification_id: notification_id.clone(),
        title: req.title,
        message: req.message,
        notification_type: req.notification_type,
        created_at: format_wire_timestamp(Utc::now().timestamp()),
        link: req.link,
    };

    let delivered = state
        .realtime
        .notification_hub
        .broadcast(&req.user_id, event, None)
        .await;

    info!(user = %req.user_id, delivered, "Pushed notification");

    Ok(Json(PushNotificationResponse {
        notification_id,
        delivered,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::post};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::repository::test_helpers::make_user;

    async fn test_router() -> (Router, AppState) {
        let state = crate::test_helpers::test_app_state().await;
        state
            .realtime
            .repository
            .create_user(&make_user("u-a", "alice"))
            .await
            .unwrap();
        let router = Router::new()
            .route("/internal/notifications/push", post(push_notification_handler))
            .with_state(state.clone());
        (router, state)
    }

    async fn push(app: &Router, body: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/internal/notifications/push")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn delivers_to_connected_sessions() {
        let (app, state) = test_router().await;
        let (tx, mut rx) = mpsc::channel(4);
        state
            .realtime
            .notification_hub
            .attach("u-a", "conn-1", tx)
            .await;

        let (status, json) = push(
            &app,
            r#"{"user_id":"u-a","title":"Event","message":"Pub quiz tonight"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["delivered"], 1);

        match rx.try_recv().unwrap() {
            ServerEvent::Notification {
                notification_id,
                title,
                notification_type,
                ..
            } => {
                assert_eq!(notification_id, json["notification_id"]);
                assert_eq!(title, "Event");
                assert_eq!(notification_type, "general");
            }
            other => panic!("Expected notification event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn offline_user_gets_nothing() {
        let (app, _state) = test_router().await;
        let (status, json) = push(
            &app,
            r#"{"user_id":"u-a","title":"Event","message":"hello"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["delivered"], 0);
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let (app, _state) = test_router().await;
        let (status, _) = push(
            &app,
            r#"{"user_id":"u-404","title":"Event","message":"hello"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
