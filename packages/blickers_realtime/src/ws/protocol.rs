//! Realtime wire protocol.
//!
//! Frame shapes are a stable contract with the portal frontend: tagged on
//! `"type"`, snake_case payload fields.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identity bound to a websocket session, resolved by the user directory
/// before the upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: String,
    pub username: String,
}

/// Frames sent FROM the client TO the server while a chat session is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Send a chat message to the session's room.
    Message { message: String },
    /// Typing indicator; best-effort, never persisted.
    Typing { status: TypingStatus },
    /// Mark a message as read.
    ReadReceipt { message_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingStatus {
    Typing,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Offline,
}

/// Events sent FROM the server TO connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A chat message, fanned out to every session in the room (sender
    /// included, for multi-device confirmation). Id and timestamp are
    /// server-assigned.
    Message {
        message: String,
        username: String,
        user_id: String,
        timestamp: String,
        message_id: String,
    },
    Typing {
        user_id: String,
        username: String,
        status: TypingStatus,
    },
    UserStatus {
        user_id: String,
        status: OnlineStatus,
    },
    ReadReceipt {
        message_id: String,
        user_id: String,
    },
    /// Asynchronous notification pushed by an external collaborator.
    Notification {
        notification_id: String,
        title: String,
        message: String,
        notification_type: String,
        created_at: String,
        link: String,
    },
    /// Delivered to the originating session only (e.g. a dropped frame
    /// after a persistence failure). Never broadcast.
    Error { message: String },
}

/// Wire format for message timestamps, e.g. "14:05 27/08/2026".
pub fn format_wire_timestamp(unix_secs: i64) -> String {
    match Utc.timestamp_opt(unix_secs, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M %d/%m/%Y").to_string(),
        _ => String::new(),
    }
}
