use anyhow::Context;
use axum::Router;
use cfpa_server::cli::Args;
use clap::Parser;
use std::net::SocketAddr;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level)?;
    info!(
        "cfpa-server {} (blob backend: {:?}, trainee groups: {:?})",
        env!("CARGO_PKG_VERSION"),
        args.blob_backend,
        args.trainee_group_policy
    );

    let router = cfpa_server::init_router(&args)
        .await
        .context("Failed to initialize application")?;

    serve(router, args.server_address)
        .await
        .context("Server failed to run")?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log filter '{}'", log_level))?;
    fmt().with_env_filter(filter).init();
    Ok(())
}

async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Axum server error")?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, draining in-flight requests"),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C, running until killed: {}", e);
            std::future::pending::<()>().await
        }
    }
}
