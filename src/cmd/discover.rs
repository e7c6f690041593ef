use anyhow::{Context, Result};
use repo_dashboard::config::DashboardConfig;

use super::build_dashboard;

/// Print the repositories found under the root without scanning them.
pub async fn cmd_discover(config: &DashboardConfig) -> Result<()> {
    let dashboard = build_dashboard(config, false);
    let repos = dashboard.discovered().await;
    let json = serde_json::to_string_pretty(repos).context("Failed to serialize repositories")?;
    println!("{}", json);
    Ok(())
}
