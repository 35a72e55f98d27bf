//! MailForge Server - control API plus in-process signup workers.
//!
//! One process runs everything: the axum control surface, the progress
//! channel, and the worker tasks it spawns on demand.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailforge::web::{router, AppState};
use mailforge::{AccountStore, Config, MailboxClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("server_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        mailbox_base_url = %config.mailbox_base_url,
        mailbox_domains = config.mailbox_domains.len(),
        auth_signup_url_set = !config.auth_signup_url.is_empty(),
        poll_timeout_secs = config.poll_timeout.as_secs(),
        launch_delay_secs = config.launch_delay.as_secs(),
        port = config.port,
        "config_loaded"
    );

    // Open the account store and bootstrap the schema
    let store = AccountStore::connect(&config.database_url)
        .await
        .context("Failed to open account store")?;

    let mailbox = MailboxClient::new(
        config.mailbox_base_url.clone(),
        Duration::from_millis(config.request_timeout_ms),
    )
    .context("Failed to build mailbox client")?;

    // Redirects stay disabled: workers read Location headers themselves.
    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(100)
        .build()
        .context("Failed to create HTTP client")?;

    let port = config.port;
    let state = AppState::new(Arc::new(config), http, mailbox, store);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("server_shutting_down");
}
