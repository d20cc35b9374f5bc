use anyhow::{Context, Result};
use sqlx::Row;

use crate::models::User;

use super::PortalRepository;

fn row_to_user(r: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: r.get("id"),
        username: r.get("username"),
        display_name: r.get("display_name"),
        is_online: r.get::<i64, _>("is_online") != 0,
        last_online: r.get("last_online"),
        created_at: r.get("created_at"),
    }
}

impl PortalRepository {
    pub async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, display_name, is_online, last_online, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(user.is_online as i64)
        .bind(user.last_online)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;
        Ok(())
    }

    pub async fn user_exists(&self, user_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, display_name, is_online, last_online, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    /// Durable mirror of the presence tracker. `last_online` is stamped
    /// only on the transition to offline.
    pub async fn set_online(&self, user_id: &str, online: bool) -> Result<()> {
        if online {
            sqlx::query("UPDATE users SET is_online = 1 WHERE id = ?")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("UPDATE users SET is_online = 0, last_online = ? WHERE id = ?")
                .bind(chrono::Utc::now().timestamp())
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
