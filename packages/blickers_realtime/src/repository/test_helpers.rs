use sqlx::sqlite::SqlitePoolOptions;

use crate::models::{ChatRoom, User};

/// Create a fresh PortalRepository backed by an in-memory SQLite database.
/// Each call returns an isolated database with all migrations applied.
pub async fn test_repository() -> super::PortalRepository {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    crate::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("Failed to enable foreign keys");

    super::PortalRepository::new(pool)
}

pub fn make_user(id: &str, username: &str) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        display_name: username.to_string(),
        is_online: false,
        last_online: None,
        created_at: chrono::Utc::now().timestamp(),
    }
}

pub fn make_room(id: &str, is_group: bool) -> ChatRoom {
    let now = chrono::Utc::now().timestamp();
    ChatRoom {
        id: id.to_string(),
        name: None,
        is_group,
        created_at: now,
        updated_at: now,
    }
}

/// Seed a room with the given members, creating the users as needed.
pub async fn seed_room(repo: &super::PortalRepository, room_id: &str, members: &[(&str, &str)]) {
    repo.create_room(&make_room(room_id, members.len() > 2))
        .await
        .expect("Failed to create room");
    for (id, username) in members {
        repo.create_user(&make_user(id, username))
            .await
            .expect("Failed to create user");
        repo.add_member(room_id, id)
            .await
            .expect("Failed to add member");
    }
}
