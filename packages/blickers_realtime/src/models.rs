//! Row structs shared between the repository layer and the realtime core.
//!
//! Timestamps are Unix seconds (i64) throughout; formatting for the wire
//! happens in `ws::protocol`.

use serde::{Deserialize, Serialize};

/// A portal user, as seen by the realtime layer.
///
/// `is_online` / `last_online` are the durable mirror of the in-process
/// presence tracker, written only on offline→online / online→offline
/// transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub is_online: bool,
    pub last_online: Option<i64>,
    pub created_at: i64,
}

/// A chat conversation (1:1 or group) with a fixed member set.
///
/// Membership is managed outside the realtime core and never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: String,
    /// Optional display name; usually set for group chats only.
    pub name: Option<String>,
    pub is_group: bool,
    pub created_at: i64,
    /// Bumped every time a message is appended to the room.
    pub updated_at: i64,
}

/// A persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    /// Server-assigned, monotonically non-decreasing within a room.
    pub timestamp: i64,
    pub is_read: bool,
}
