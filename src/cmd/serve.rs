use std::sync::Arc;

use anyhow::Result;
use repo_dashboard::config::DashboardConfig;
use repo_dashboard::web::{ServerConfig, start_server};

use super::build_dashboard;

pub async fn cmd_serve(config: &DashboardConfig, open_browser: bool) -> Result<()> {
    if !config.root.is_dir() {
        tracing::warn!(root = %config.root.display(), "Repository root does not exist; serving an empty dashboard");
    }

    tracing::info!(addr = %config.bind_addr(), root = %config.root.display(), "Starting dashboard server");

    let dashboard = Arc::new(build_dashboard(config, true));
    let server = ServerConfig {
        host: config.host.clone(),
        port: config.port,
        scan_interval: config.scan_interval(),
        static_dir: config.static_dir.clone(),
        open_browser,
    };
    start_server(dashboard, server).await
}
