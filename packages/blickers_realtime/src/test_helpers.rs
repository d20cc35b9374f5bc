use std::path::PathBuf;
use std::sync::Arc;

use crate::AppState;
use crate::config::{BlickersConfig, WebsocketFileConfig};
use crate::db::Database;
use crate::repository::PortalRepository;
use crate::ws::RealtimeState;

/// Build a fully-wired `AppState` backed by an in-memory SQLite database.
/// Suitable for handler tests that exercise real SQL queries without I/O.
pub async fn test_app_state() -> AppState {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");

    crate::db::run_migrations(&pool).await.expect("migrations");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("pragma");

    let db = Arc::new(Database { pool: pool.clone() });
    let repository = Arc::new(PortalRepository::new(pool));
    let websocket = WebsocketFileConfig::default();

    AppState {
        config: Arc::new(BlickersConfig {
            data_dir: PathBuf::new(),
            db_path: PathBuf::from(":memory:"),
            db_max_connections: 1,
            host: "127.0.0.1".to_string(),
            port: 0,
            websocket: websocket.clone(),
        }),
        db,
        realtime: RealtimeState::new(repository, websocket),
    }
}
