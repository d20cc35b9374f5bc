use anyhow::{Context, Result};
use sqlx::Row;

use crate::models::{ChatRoom, User};

use super::PortalRepository;

impl PortalRepository {
    pub async fn create_room(&self, room: &ChatRoom) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_rooms (id, name, is_group, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&room.id)
        .bind(&room.name)
        .bind(room.is_group as i64)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert chat room")?;
        Ok(())
    }

    pub async fn add_member(&self, room_id: &str, user_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO room_members (room_id, user_id) VALUES (?, ?)")
            .bind(room_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to add room member")?;
        Ok(())
    }

    /// The authoritative membership check. Checked once at connect time;
    /// membership changes after connect are not re-validated.
    pub async fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM room_members WHERE room_id = ? AND user_id = ?")
                .bind(room_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Option<ChatRoom>> {
        let row = sqlx::query(
            "SELECT id, name, is_group, created_at, updated_at FROM chat_rooms WHERE id = ?",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ChatRoom {
            id: r.get("id"),
            name: r.get("name"),
            is_group: r.get::<i64, _>("is_group") != 0,
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    pub async fn room_members(&self, room_id: &str) -> Result<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.username, u.display_name, u.is_online, u.last_online, u.created_at
            FROM users u
            JOIN room_members m ON m.user_id = u.id
            WHERE m.room_id = ?
            ORDER BY u.username
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| User {
                id: r.get("id"),
                username: r.get("username"),
                display_name: r.get("display_name"),
                is_online: r.get::<i64, _>("is_online") != 0,
                last_online: r.get("last_online"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
