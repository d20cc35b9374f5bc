use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod repository;
#[cfg(test)]
mod test_helpers;
mod ws;

use crate::config::BlickersConfig;
use crate::db::Database;
use crate::repository::PortalRepository;
use crate::ws::RealtimeState;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "blickers")]
#[command(about = "Realtime chat, presence and notification server for the Blickers portal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to the working directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the realtime server in the foreground
    Serve(ServeArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Port for the server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
#[allow(dead_code)]
pub(crate) struct AppState {
    pub config: Arc<BlickersConfig>,
    pub db: Arc<Database>,
    pub realtime: RealtimeState,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BlickersConfig::new(cli.data_dir.clone())?;

    match cli.command {
        None => run_server(ServeArgs::default(), config).await,
        Some(Commands::Serve(args)) => run_server(args, config).await,
    }
}

async fn run_server(args: ServeArgs, mut config: BlickersConfig) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "blickers=debug,tower_http=debug,info"
    } else {
        "blickers=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting Blickers realtime server");

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    let config = Arc::new(config);

    info!("Initializing database...");
    let db = Arc::new(Database::new(&config).await?);
    let repository = Arc::new(PortalRepository::new(db.pool.clone()));

    let realtime = RealtimeState::new(repository, config.websocket.clone());
    let shutdown = realtime.shutdown.clone();

    let app_state = AppState {
        config: config.clone(),
        db,
        realtime,
    };

    let app = Router::new()
        // Realtime endpoints
        .route("/ws/chat/{room_id}", get(handlers::chat_ws_handler))
        .route("/ws/notifications", get(handlers::notifications_ws_handler))
        // Room REST surface
        .route("/api/rooms/{room_id}", get(handlers::room_handler))
        .route(
            "/api/rooms/{room_id}/messages",
            get(handlers::list_room_messages),
        )
        // Publisher seam for announcement/report services
        .route(
            "/internal/notifications/push",
            post(handlers::push_notification_handler),
        )
        .route("/health", get(handlers::health_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = format!("{}:{}", config.host, config.port).parse::<SocketAddr>()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Blickers listening on http://{}", actual_addr);
    info!("Endpoints:");
    info!("  GET    /ws/chat/:room_id            - Chat session (websocket)");
    info!("  GET    /ws/notifications            - Notification session (websocket)");
    info!("  GET    /api/rooms/:id               - Room details");
    info!("  GET    /api/rooms/:id/messages      - Message history");
    info!("  POST   /internal/notifications/push - Push a notification");

    // Ctrl+C stops the listener and cancels live sessions
    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received shutdown signal, closing sessions...");
        shutdown.cancel();
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
