use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Two equivalent ways to configure:
//
//   config.toml:     [server]
//                    port = 8900
//
//   env var:         BLICKERS_SERVER__PORT=8900   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub database: DatabaseFileConfig,
    #[serde(default)]
    pub websocket: WebsocketFileConfig,
}

/// Server bind knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database knobs (lives under `[database]` in config.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatabaseFileConfig {
    /// Path to the sqlite file; defaults to `<data_dir>/blickers.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Realtime tunables (lives under `[websocket]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebsocketFileConfig {
    /// Per-connection outbound queue depth. When a slow client's queue is
    /// full, events to that session are dropped (not the whole fan-out).
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    /// Close connections idle for this many seconds. Absent = no timeout.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl Default for WebsocketFileConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: default_send_queue_capacity(),
            idle_timeout_secs: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8900
}
fn default_max_connections() -> u32 {
    5
}
fn default_send_queue_capacity() -> usize {
    64
}

/// Build a figment that layers: defaults → config.toml → BLICKERS_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `BLICKERS_SERVER__PORT=8900`           →  `server.port = 8900`
///   `BLICKERS_WEBSOCKET__IDLE_TIMEOUT_SECS=300`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("BLICKERS_").split("__"))
}

/// Resolved runtime configuration.
#[derive(Clone, Debug)]
pub struct BlickersConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub websocket: WebsocketFileConfig,
}

impl BlickersConfig {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to resolve working directory")?,
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let file_config: FileConfig = load_config(&data_dir)
            .extract()
            .context("Failed to load configuration")?;

        let db_path = file_config
            .database
            .path
            .clone()
            .unwrap_or_else(|| data_dir.join("blickers.db"));

        Ok(Self {
            data_dir,
            db_path,
            db_max_connections: file_config.database.max_connections,
            host: file_config.server.host,
            port: file_config.server.port,
            websocket: file_config.websocket,
        })
    }

    pub fn db_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.db_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let fc: FileConfig = load_config(Path::new("/nonexistent")).extract().unwrap();
        assert_eq!(fc.server.port, 8900);
        assert_eq!(fc.websocket.send_queue_capacity, 64);
        assert!(fc.websocket.idle_timeout_secs.is_none());
        assert!(fc.database.path.is_none());
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[server]\nport = 9100\n\n[websocket]\nidle_timeout_secs = 120\n",
        )
        .unwrap();

        let fc: FileConfig = load_config(dir.path()).extract().unwrap();
        assert_eq!(fc.server.port, 9100);
        assert_eq!(fc.websocket.idle_timeout_secs, Some(120));
        // Untouched values keep their defaults
        assert_eq!(fc.server.host, "127.0.0.1");
    }
}
