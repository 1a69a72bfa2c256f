pub mod api;
pub mod auth;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod email;
pub mod entities;
pub mod security;
pub mod services;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub use config::Config;
use db::Store;
use email::{CaptureMailer, Mailer, SmtpMailer};

pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env();
    config.validate()?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!(
        "TaskMaster auth service v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.server.environment
    );

    let store = Store::with_pool_options(
        &config.database.url(),
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;

    let mailer = select_mailer(&config).await;

    let state = api::create_app_state(config.clone(), store, mailer);
    let app = api::router(state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup_handle = cleanup::spawn(
        state.verification.clone(),
        state.reset.clone(),
        shutdown_rx.clone(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    let mut serve_shutdown = shutdown_rx;
    let mut server = tokio::spawn(async move {
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = serve_shutdown.changed().await;
            })
            .await;

        if let Err(e) = result {
            error!("Server error: {e}");
        }
    });

    shutdown_signal().await;
    info!("Shutdown signal received, draining in-flight requests");
    let _ = shutdown_tx.send(true);

    // Bounded drain: force termination if connections linger.
    match tokio::time::timeout(Duration::from_secs(5), &mut server).await {
        Ok(_) => info!("Server shutdown complete"),
        Err(_) => {
            server.abort();
            warn!("Server shutdown forced after drain timeout");
        }
    }

    if tokio::time::timeout(Duration::from_secs(1), cleanup_handle)
        .await
        .is_err()
    {
        warn!("Cleanup task did not stop in time");
    }

    Ok(())
}

/// Capture mail in testing mode, otherwise deliver over SMTP with a
/// best-effort relay probe at startup.
async fn select_mailer(config: &Config) -> Arc<dyn Mailer> {
    if config.email.testing_mode || (!config.is_production() && config.email.smtp_host.is_empty()) {
        info!("Email testing mode: captured, not delivered");
        return Arc::new(CaptureMailer::new());
    }

    let mailer = SmtpMailer::new(&config.email);
    if let Err(e) = mailer.test_connection().await {
        warn!("SMTP connection test failed: {e}");
    }
    Arc::new(mailer)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Error listening for shutdown: {e}");
        }
    };

    #[cfg(unix)]
    {
        let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                error!("Error installing SIGTERM handler: {e}");
                ctrl_c.await;
                return;
            }
        };

        tokio::select! {
            () = ctrl_c => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
