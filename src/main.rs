// =============================================================================
// FitPulse Social Fitness Backend - Main Entry Point
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend for social
//          fitness challenges
// License: Apache 2.0 / MIT
//
// Description:
//   Host process for the messaging core: loads configuration, connects
//   PostgreSQL and (optionally) Redis, installs the service registry and
//   serves the gateway and REST routes until SIGTERM/Ctrl+C.
//
// Runtime Requirements:
//   • FITPULSE_CONFIG pointing at a TOML config file, or FITPULSE_*
//     environment variables
//   • PostgreSQL reachable at database_url
//   • Redis optional; without it the instance runs in single-instance mode
//
// =============================================================================

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

use fitpulse::database::PostgresDb;
use fitpulse::{api, init_services, services, Config, Services};

/// FitPulse messaging core
#[derive(Parser, Debug)]
#[clap(about, version, name = "fitpulse")]
struct Args {
    /// Path to the TOML configuration file (overrides FITPULSE_CONFIG)
    #[clap(long, short)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("FITPULSE_CONFIG", path);
    }

    let config = Config::load().context("loading configuration")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 starting fitpulse {}", env!("CARGO_PKG_VERSION"));

    let db = PostgresDb::connect(&config)
        .await
        .context("connecting to PostgreSQL")?;
    db.bootstrap_schema()
        .await
        .context("bootstrapping messaging schema")?;
    let db: &'static PostgresDb = Box::leak(Box::new(db));

    let built = Services::build(db, config)
        .await
        .context("building services")?;
    init_services(built).context("installing service registry")?;

    let app = api::router().layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let server_config = services().globals.config();
    let addr = SocketAddr::new(server_config.address, server_config.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("✅ listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    info!("fitpulse stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let sig: &str;
    tokio::select! {
        _ = ctrl_c => { sig = "Ctrl+C"; },
        _ = terminate => { sig = "SIGTERM"; },
    }

    warn!("received {sig}, shutting down");
    services().globals.shutdown();
}
