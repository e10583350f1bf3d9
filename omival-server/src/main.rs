//! omival-server: OMI-based Italian property valuation service
//!
//! Geocodes addresses, resolves the containing OMI price zone, and serves
//! basic and coefficient-adjusted valuations over HTTP.

use anyhow::Result;
use clap::Parser;
use omival_common::config::Overrides;
use omival_common::db::init_database;
use omival_common::Settings;
use omival_server::{build_router, AppState};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "omival-server", about = "OMI-based Italian property valuation service")]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    database: Option<PathBuf>,

    /// HTTP listen address, e.g. 127.0.0.1:8000
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting omival-server v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let settings = Settings::load(&Overrides {
        config_file: args.config,
        database: args.database,
        bind: args.bind,
    })?;

    info!("Database path: {}", settings.database_path.display());
    let pool = init_database(&settings.database_path).await?;

    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(pool, settings)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("omival-server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
