//! Web server setup and routing

use anyhow::{anyhow, Result};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::api;
use crate::config::TlsConfig;
use crate::state::AppState;
use crate::ws;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices", get(api::list_devices))
        .route("/api/devices/{id}", get(api::get_device))
        .route("/api/devices/{id}", delete(api::remove_device))
        .route("/api/devices/{id}/status", get(api::get_device_status))
        .route("/api/devices/{id}/power/{state}", put(api::set_power))
        .route("/api/scan", post(api::trigger_scan))
        .route("/api/config", get(api::get_config))
        // WebSocket for real-time updates
        .route("/ws", get(ws::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the web server (HTTP or HTTPS depending on config) with background tasks
///
/// Returns an error as soon as the change bus stops.
pub async fn run(state: Arc<AppState>, bind: &str, tls: Option<&TlsConfig>) -> Result<()> {
    let app = router(state.clone());

    // Subscribe before anything can produce changes
    let bus = state.bus.clone();
    let changes = state.cache.subscribe();
    let bus_task = tokio::spawn(async move { bus.forward(changes).await });

    // Start discovery in background
    let scanner = state.scanner.clone();
    tokio::spawn(async move {
        if let Err(e) = scanner.run().await {
            error!(error = %e, "Discovery scanner failed");
        }
    });

    if state.config.reconcile.enabled {
        let reconciler = state.reconciler.clone();
        tokio::spawn(async move { reconciler.run().await });
    } else {
        info!("Reconciliation disabled");
    }

    let serve = async {
        match tls {
            Some(tls_config) => run_https(app, bind, tls_config).await,
            None => run_http(app, bind).await,
        }
    };

    tokio::select! {
        result = serve => result,
        result = bus_task => {
            let e = match result {
                Ok(Ok(())) => anyhow!("change bus stopped"),
                Ok(Err(e)) => e,
                Err(e) => anyhow!(e),
            };
            error!(error = %e, "Change bus lost, shutting down");
            Err(e.context("change bus lost"))
        }
    }
}

/// Run plain HTTP server
async fn run_http(app: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run HTTPS server with TLS
async fn run_https(app: Router, bind: &str, tls: &TlsConfig) -> Result<()> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::path::PathBuf;

    let cert_path = PathBuf::from(&tls.cert);
    let key_path = PathBuf::from(&tls.key);

    if !cert_path.exists() {
        anyhow::bail!("TLS certificate file not found: {}", tls.cert);
    }
    if !key_path.exists() {
        anyhow::bail!("TLS key file not found: {}", tls.key);
    }

    let rustls_config = RustlsConfig::from_pem_file(&cert_path, &key_path).await?;

    let addr: std::net::SocketAddr = bind.parse()?;
    info!(address = %bind, protocol = "HTTPS", cert = %tls.cert, "Starting web server with TLS");

    axum_server::bind_rustls(addr, rustls_config)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
