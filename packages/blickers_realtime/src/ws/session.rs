//! Chat and notification sessions
//!
//! One cooperative task per connected client. A chat session moves through
//! CONNECTING → ACTIVE → CLOSED: membership is checked once at connect
//! time, inbound frames are processed one at a time (validate → persist →
//! broadcast) while ACTIVE, and teardown detaches the session and updates
//! presence. Notification sessions are the per-user variant: attach and
//! forward, nothing inbound.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::RealtimeError;
use crate::repository::PortalRepository;

use super::RealtimeState;
use super::hub::ChannelHub;
use super::presence::PresenceTracker;
use super::protocol::{
    ClientFrame, OnlineStatus, ServerEvent, SessionUser, format_wire_timestamp,
};

/// An ACTIVE chat session: one user, one room, one transport.
pub struct ChatSession {
    user: SessionUser,
    room_id: String,
    connection_id: String,
    repository: Arc<PortalRepository>,
    hub: Arc<ChannelHub>,
    presence: Arc<PresenceTracker>,
    /// The session's own outbound queue, for sender-only events.
    tx: mpsc::Sender<ServerEvent>,
}

impl ChatSession {
    /// CONNECTING → ACTIVE.
    ///
    /// Validates membership against the room membership store; a
    /// non-member is refused before anything touches the hub. On success
    /// the session attaches, presence goes online (durably mirrored on the
    /// offline→online transition only) and a `user_status online` event is
    /// broadcast to the whole room, this session included.
    pub async fn connect(
        user: SessionUser,
        room_id: String,
        repository: Arc<PortalRepository>,
        hub: Arc<ChannelHub>,
        presence: Arc<PresenceTracker>,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Result<Self, RealtimeError> {
        if !repository.is_member(&room_id, &user.user_id).await? {
            return Err(RealtimeError::NotARoomMember {
                user_id: user.user_id,
                room_id,
            });
        }

        let connection_id = Uuid::new_v4().to_string();
        hub.attach(&room_id, &connection_id, tx.clone()).await;

        if presence.connect(&user.user_id).await {
            if let Err(e) = repository.set_online(&user.user_id, true).await {
                warn!(user = %user.user_id, "Failed to persist online status: {e:#}");
            }
        }

        hub.broadcast(
            &room_id,
            ServerEvent::UserStatus {
                user_id: user.user_id.clone(),
                status: OnlineStatus::Online,
            },
            None,
        )
        .await;

        Ok(Self {
            user,
            room_id,
            connection_id,
            repository,
            hub,
            presence,
            tx,
        })
    }

    /// Process one inbound frame fully before the caller reads the next.
    ///
    /// Frame-level failures are never terminal for the session: a frame
    /// that cannot be persisted is dropped without any fan-out, and the
    /// originating session alone gets an `error` event.
    pub async fn handle_frame(&self, frame: ClientFrame) {
        match frame {
            ClientFrame::Message { message } => {
                // Persist first; an unpersisted message must never fan out.
                match self
                    .repository
                    .append_message(&self.room_id, &self.user.user_id, &message)
                    .await
                {
                    Ok(stored) => {
                        self.hub
                            .broadcast(
                                &self.room_id,
                                ServerEvent::Message {
                                    message: stored.content,
                                    username: self.user.username.clone(),
                                    user_id: stored.sender_id,
                                    timestamp: format_wire_timestamp(stored.timestamp),
                                    message_id: stored.id,
                                },
                                None,
                            )
                            .await;
                    }
                    Err(e) => {
                        warn!(room = %self.room_id, "Dropping message frame, persistence failed: {e:#}");
                        let _ = self.tx.try_send(ServerEvent::Error {
                            message: "message could not be saved".to_string(),
                        });
                    }
                }
            }
            ClientFrame::Typing { status } => {
                self.hub
                    .broadcast(
                        &self.room_id,
                        ServerEvent::Typing {
                            user_id: self.user.user_id.clone(),
                            username: self.user.username.clone(),
                            status,
                        },
                        None,
                    )
                    .await;
            }
            ClientFrame::ReadReceipt { message_id } => {
                match self
                    .repository
                    .mark_message_read(&message_id, &self.user.user_id)
                    .await
                {
                    Ok(true) => {
                        self.hub
                            .broadcast(
                                &self.room_id,
                                ServerEvent::ReadReceipt {
                                    message_id,
                                    user_id: self.user.user_id.clone(),
                                },
                                None,
                            )
                            .await;
                    }
                    // Unknown message, or the reader is the sender: no-op
                    Ok(false) => {
                        debug!(message_id = %message_id, "Ignoring read receipt");
                    }
                    Err(e) => {
                        warn!(message_id = %message_id, "Dropping read receipt, persistence failed: {e:#}");
                    }
                }
            }
        }
    }

    /// ACTIVE → CLOSED.
    ///
    /// Detaches from the hub and decrements the presence refcount; only
    /// when this was the user's last live session does the room see a
    /// `user_status offline` event and the durable mirror get stamped.
    pub async fn close(self) {
        self.hub.detach(&self.room_id, &self.connection_id).await;

        if self.presence.disconnect(&self.user.user_id).await {
            if let Err(e) = self.repository.set_online(&self.user.user_id, false).await {
                warn!(user = %self.user.user_id, "Failed to persist offline status: {e:#}");
            }
            self.hub
                .broadcast(
                    &self.room_id,
                    ServerEvent::UserStatus {
                        user_id: self.user.user_id.clone(),
                        status: OnlineStatus::Offline,
                    },
                    None,
                )
                .await;
        }

        debug!(room = %self.room_id, user = %self.user.user_id, "Chat session closed");
    }
}

/// Drive a chat session over a websocket until the transport closes.
pub async fn run_chat_session(
    mut socket: WebSocket,
    room_id: String,
    user: SessionUser,
    state: RealtimeState,
) {
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.websocket.send_queue_capacity);

    let session = match ChatSession::connect(
        user.clone(),
        room_id.clone(),
        state.repository.clone(),
        state.room_hub.clone(),
        state.presence.clone(),
        tx,
    )
    .await
    {
        Ok(session) => session,
        Err(RealtimeError::NotARoomMember { .. }) => {
            info!(room = %room_id, user = %user.user_id, "Refusing chat connection: not a room member");
            let _ = socket.close().await;
            return;
        }
        Err(e) => {
            warn!(room = %room_id, "Refusing chat connection: {e}");
            let _ = socket.close().await;
            return;
        }
    };

    info!(room = %room_id, user = %user.user_id, "Chat session active");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Pump hub events out to the transport
    let sender_task = async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    let idle_timeout = state.websocket.idle_timeout_secs.map(Duration::from_secs);
    let session_ref = &session;
    let input_task = async move {
        loop {
            let next = match idle_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, ws_receiver.next()).await {
                    Ok(msg) => msg,
                    Err(_) => {
                        debug!(room = %room_id, "Closing idle chat session");
                        break;
                    }
                },
                None => ws_receiver.next().await,
            };

            match next {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => session_ref.handle_frame(frame).await,
                    Err(e) => debug!(room = %room_id, "Ignoring malformed frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(room = %room_id, "Websocket error, closing: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    };

    // Either side ending tears the session down; the other future is
    // dropped, cancelling any pending read or write.
    let shutdown = state.shutdown.clone();
    tokio::select! {
        _ = sender_task => {},
        _ = input_task => {},
        _ = shutdown.cancelled() => {
            debug!("Server shutting down, closing chat session");
        }
    }

    session.close().await;
}

/// Drive a notification session: attach to the user's channel and forward
/// events until the transport closes. Nothing inbound is expected;
/// delivery is at-most-once to currently connected sessions only.
pub async fn run_notification_session(socket: WebSocket, user: SessionUser, state: RealtimeState) {
    let connection_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.websocket.send_queue_capacity);

    state
        .notification_hub
        .attach(&user.user_id, &connection_id, tx)
        .await;
    info!(user = %user.user_id, "Notification session active");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let sender_task = async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    let input_task = async move {
        // Drain (and ignore) inbound frames so close/error are observed
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    };

    let shutdown = state.shutdown.clone();
    tokio::select! {
        _ = sender_task => {},
        _ = input_task => {},
        _ = shutdown.cancelled() => {
            debug!("Server shutting down, closing notification session");
        }
    }

    state.notification_hub.detach(&user.user_id, &connection_id).await;
    debug!(user = %user.user_id, "Notification session closed");
}
