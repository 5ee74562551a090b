use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use order_intake_backend::{build_app, logging::default_filter, AppState};
use order_intake_shared::AddrInfo;

use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = order_intake_backend::cli::CliOpts::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.debug).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let appstate = match AppState::new(&cli).await {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to initialize application state: {:?}", err);
            return ExitCode::FAILURE;
        }
    };
    info!("Storing uploads under {}", appstate.media.root().display());
    let shared_state = Arc::new(RwLock::new(appstate));

    let addrinfo = AddrInfo::from_env();

    let app: axum::Router = build_app(&shared_state).await;

    let listener = match tokio::net::TcpListener::bind(&addrinfo.as_addr()).await {
        Ok(val) => {
            info!("Listening on {}", addrinfo.as_url());
            val
        }
        Err(err) => {
            error!("Failed to bind to {}: {:?}", addrinfo.as_url(), err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {:?}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
