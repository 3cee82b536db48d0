use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, ServerConfig, build_router};
use fileshare_core::{CoreConfig, FileService};

const LOGIN_ATTEMPT_PRUNE_INTERVAL_SECS: u64 = 60;

/// Main entry point for the fileshare server
///
/// Loads `.env`, resolves configuration, rebuilds the catalog from the JSON
/// index and serves the REST API until Ctrl+C or SIGTERM.
///
/// # Environment Variables
/// - `FILESHARE_ADDR`: Server address (default: "0.0.0.0:3002")
/// - `UPLOAD_DIR`: Directory holding uploaded files (default: "./uploads")
/// - `METADATA_FILE`: JSON index path (default: "./filedata.json")
/// - `LOGIN_PIN`, `JWT_SECRET_KEY`: Required login secrets
///
/// # Errors
/// Returns an error if configuration is missing or invalid, the upload
/// directory cannot be created, or the address cannot be bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fileshare=info".parse()?)
                .add_directive("fileshare_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("fileshare_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenv {
        tracing::warn!("no .env file loaded: {}", e);
    }

    let server_cfg = ServerConfig::from_env()?;
    let core_cfg = Arc::new(CoreConfig::from_env_values(
        std::env::var("UPLOAD_DIR").ok(),
        std::env::var("METADATA_FILE").ok(),
    )?);
    tracing::debug!("configuration: {:?}", server_cfg);

    let files = Arc::new(FileService::init(core_cfg).await?);
    let state = AppState::new(files, &server_cfg);

    let auth = state.auth.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(LOGIN_ATTEMPT_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            auth.limiter.prune().await;
        }
    });

    let app = build_router(state, &server_cfg.public_dir);

    tracing::info!("++ Starting fileshare on {}", server_cfg.addr);
    let listener = tokio::net::TcpListener::bind(&server_cfg.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("-- fileshare stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
