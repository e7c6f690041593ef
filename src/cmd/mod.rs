//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `scan`     | `Scan`           |
//! | `discover` | `Discover`       |

pub mod discover;
pub mod scan;
pub mod serve;

pub use discover::cmd_discover;
pub use scan::cmd_scan;
pub use serve::cmd_serve;

use std::sync::Arc;

use repo_dashboard::config::DashboardConfig;
use repo_dashboard::dashboard::Dashboard;
use repo_dashboard::git::CliGit;
use repo_dashboard::github::{GhCli, PrFetcher};

/// Wire the configured git and gh commands into a dashboard.
pub(crate) fn build_dashboard(config: &DashboardConfig, with_prs: bool) -> Dashboard {
    let git = Arc::new(CliGit::new(config.git_cmd.clone(), config.git_timeout()));
    let prs = with_prs.then(|| {
        let client = GhCli::new(config.gh_cmd.clone(), config.gh_timeout());
        PrFetcher::new(Box::new(client), config.pr_cache_ttl())
    });
    Dashboard::new(config.root.clone(), git, prs).with_max_depth(config.max_depth)
}
