use clap::Parser;
use std::sync::Arc;
use tracing::info;

use pulse_dashboard_backend::{
    auth::AssertionSigner,
    build_router,
    config::{AppConfig, Cli},
    tableau::TableauClient,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_cli(Cli::parse())?;
    info!(
        "Using site {} on {} ({} metrics configured)",
        config.identity.site_name,
        config.endpoints.base_url,
        config.metric_ids.len()
    );

    let client = TableauClient::new(
        config.endpoints.clone(),
        AssertionSigner::new(config.identity.clone()),
        config.request_timeout,
    )?;
    let addr = config.bind_addr;
    let state = AppState {
        config: Arc::new(config),
        client,
    };
    let app = build_router(state)?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
