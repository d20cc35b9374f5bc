use anyhow::{Context, Result};
use sqlx::Row;
use uuid::Uuid;

use crate::models::ChatMessage;

use super::PortalRepository;

/// A message plus its position in the room's append order, used as the
/// pagination cursor for history fetches.
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub seq: i64,
    pub message: ChatMessage,
}

fn row_to_message(r: &sqlx::sqlite::SqliteRow) -> ChatMessage {
    ChatMessage {
        id: r.get("id"),
        room_id: r.get("room_id"),
        sender_id: r.get("sender_id"),
        content: r.get("content"),
        timestamp: r.get("timestamp"),
        is_read: r.get::<i64, _>("is_read") != 0,
    }
}

impl PortalRepository {
    /// Append a message to a room's log with a server-assigned timestamp.
    ///
    /// The timestamp is clamped to the room's latest message so it stays
    /// monotonically non-decreasing even across clock adjustments. Fails if
    /// the room is unknown; the caller must not broadcast on failure.
    pub async fn append_message(
        &self,
        room_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        let room_known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_rooms WHERE id = ?")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        if room_known == 0 {
            anyhow::bail!("unknown room {room_id}");
        }

        let now = chrono::Utc::now().timestamp();
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(timestamp) FROM messages WHERE room_id = ?")
                .bind(room_id)
                .fetch_one(&self.pool)
                .await?;
        let timestamp = now.max(latest.unwrap_or(i64::MIN));

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            timestamp,
            is_read: false,
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, room_id, sender_id, content, timestamp, is_read)
            VALUES (?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(message.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to insert message")?;

        sqlx::query("UPDATE chat_rooms SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(room_id)
            .execute(&self.pool)
            .await
            .context("Failed to bump room activity")?;

        Ok(message)
    }

    /// Mark a message read by `reader_id` and record the reader.
    ///
    /// Returns false without mutating anything when the message is unknown
    /// or when the reader is the message's own sender (senders do not mark
    /// their own messages).
    pub async fn mark_message_read(&self, message_id: &str, reader_id: &str) -> Result<bool> {
        let sender: Option<String> =
            sqlx::query_scalar("SELECT sender_id FROM messages WHERE id = ?")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(sender_id) = sender else {
            return Ok(false);
        };
        if sender_id == reader_id {
            return Ok(false);
        }

        sqlx::query("INSERT OR IGNORE INTO message_reads (message_id, reader_id) VALUES (?, ?)")
            .bind(message_id)
            .bind(reader_id)
            .execute(&self.pool)
            .await
            .context("Failed to record read receipt")?;
        sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(true)
    }

    pub async fn latest_message(&self, room_id: &str) -> Result<Option<ChatMessage>> {
        let row = sqlx::query(
            r#"
            SELECT id, room_id, sender_id, content, timestamp, is_read
            FROM messages
            WHERE room_id = ?
            ORDER BY rowid DESC
            LIMIT 1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_message(&r)))
    }

    /// Paginated message history for a room, keyset on append order.
    /// Returns (messages_oldest_first, has_more).
    pub async fn message_history(
        &self,
        room_id: &str,
        before_seq: Option<i64>,
        limit: i64,
    ) -> Result<(Vec<HistoryMessage>, bool)> {
        // Fetch limit+1 to detect whether there are more pages
        let fetch_limit = limit + 1;

        let rows = if let Some(seq) = before_seq {
            sqlx::query(
                r#"
                SELECT rowid AS seq, id, room_id, sender_id, content, timestamp, is_read
                FROM messages
                WHERE room_id = ? AND rowid < ?
                ORDER BY rowid DESC
                LIMIT ?
                "#,
            )
            .bind(room_id)
            .bind(seq)
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT rowid AS seq, id, room_id, sender_id, content, timestamp, is_read
                FROM messages
                WHERE room_id = ?
                ORDER BY rowid DESC
                LIMIT ?
                "#,
            )
            .bind(room_id)
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await?
        };

        let has_more = rows.len() as i64 > limit;
        let mut messages: Vec<HistoryMessage> = rows
            .into_iter()
            .take(limit as usize)
            .map(|r| HistoryMessage {
                seq: r.get("seq"),
                message: row_to_message(&r),
            })
            .collect();

        // Reverse so oldest is first (natural reading order)
        messages.reverse();

        Ok((messages, has_more))
    }

    /// User ids that have marked the message read.
    pub async fn read_receipts(&self, message_id: &str) -> Result<Vec<String>> {
        let readers = sqlx::query_scalar(
            "SELECT reader_id FROM message_reads WHERE message_id = ? ORDER BY read_at",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(readers)
    }
}
