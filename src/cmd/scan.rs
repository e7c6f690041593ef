use anyhow::{Context, Result};
use repo_dashboard::config::DashboardConfig;

use super::build_dashboard;

/// Run one scan cycle and print the snapshot as JSON.
pub async fn cmd_scan(config: &DashboardConfig, fetch_prs: bool) -> Result<()> {
    let dashboard = build_dashboard(config, fetch_prs);
    dashboard.run_cycle().await;

    let snapshot = dashboard.snapshot().await;
    let json = serde_json::to_string_pretty(snapshot.as_ref()).context("Failed to serialize snapshot")?;
    println!("{}", json);
    Ok(())
}
