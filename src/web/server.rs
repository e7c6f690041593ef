use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Router, http::Uri};
use tower_http::trace::TraceLayer;

use super::api::{self, ApiError, AppState};
use crate::dashboard::scheduler::DEFAULT_SCAN_INTERVAL;
use crate::dashboard::{BackgroundScanner, Dashboard};

/// Configuration for the dashboard server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub scan_interval: Duration,
    pub static_dir: PathBuf,
    pub open_browser: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            static_dir: PathBuf::from("static"),
            open_browser: false,
        }
    }
}

/// Build the full application router: API, static files and request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}

/// Run the first scan, start periodic rescans and serve until Ctrl+C.
pub async fn start_server(dashboard: Arc<Dashboard>, config: ServerConfig) -> Result<()> {
    let initial = dashboard.run_cycle().await;
    tracing::info!(
        repos = initial.repos_scanned,
        root = %dashboard.root().display(),
        "Initial scan complete"
    );

    let scanner = BackgroundScanner::start(dashboard.clone(), config.scan_interval);

    let state = Arc::new(AppState {
        dashboard,
        static_dir: config.static_dir.clone(),
    });
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            scanner.stop().await;
            return Err(e).with_context(|| format!("Failed to bind to {}", addr));
        }
    };
    let local_addr = listener.local_addr()?;
    let url = format!("http://{}", local_addr);
    println!("Repo dashboard running at {}", url);

    if config.open_browser {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                tracing::warn!(error = %e, "Failed to open browser");
            }
        });
    }

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    scanner.stop().await;
    println!("Server shut down gracefully.");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
