//! ltrk-ts (Tracking Service) - Attribution and form tracking
//!
//! Captures form submissions and tracked interactions into the attribution
//! store, exposes the data-layer SSE stream and the outgoing-mail filter
//! endpoint. Listens on port 5780.

use anyhow::Result;
use clap::Parser;
use ltrk_common::api::auth::load_shared_secret;
use ltrk_common::events::EventBus;
use ltrk_common::{config, db};
use ltrk_ts::{build_router, AppState};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ltrk-ts", about = "LTRK tracking service")]
struct Args {
    /// Root folder holding the database (overrides env and config file)
    #[arg(long)]
    root_folder: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting LTRK Tracking Service (ltrk-ts) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), "LTRK_ROOT_FOLDER");
    config::ensure_root_folder(&root_folder)?;

    let db_path = config::database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = db::init_database(&db_path).await?;
    info!("Database initialized");

    let shared_secret = load_shared_secret(&pool).await?;
    if shared_secret == 0 {
        info!("API authentication disabled (shared_secret = 0)");
    } else {
        info!("Loaded shared secret for API authentication");
    }

    let bus = Arc::new(EventBus::new(1000));
    let state = AppState::new(pool, shared_secret, bus);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:5780").await?;
    info!("ltrk-ts listening on http://127.0.0.1:5780");
    info!("Health check: http://127.0.0.1:5780/health");

    axum::serve(listener, app).await?;

    Ok(())
}
