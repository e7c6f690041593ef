use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use repo_dashboard::config::{CliOverrides, DashboardConfig};
use repo_dashboard::logging::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "repo-dashboard")]
#[command(version, about = "Health dashboard for the git repositories under a directory")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format: text or json
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Path to a TOML config file (defaults to ./dashboard.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory to search for repositories. Overrides REPO_DASHBOARD_ROOT.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan repositories periodically and serve the dashboard over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Seconds between background scans
        #[arg(long)]
        interval: Option<u64>,
        /// Open the dashboard in a browser once the server is up
        #[arg(long)]
        open: bool,
    },
    /// Run one scan and print the snapshot as JSON
    Scan {
        /// Skip fetching open pull requests from GitHub
        #[arg(long)]
        no_prs: bool,
    },
    /// List the repositories found under the root as JSON
    Discover,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides {
            root: self.root.clone(),
            log_dir: self.log_dir.clone(),
            ..CliOverrides::default()
        };
        if let Commands::Serve {
            host,
            port,
            interval,
            ..
        } = &self.command
        {
            overrides.host = host.clone();
            overrides.port = *port;
            overrides.scan_interval_secs = *interval;
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = DashboardConfig::load(cli.config.as_deref(), &cli.overrides())?;
    let _log_guard = logging::init(cli.verbose, cli.log_format, config.log_dir.as_deref())?;
    tracing::debug!(?config, "Loaded configuration");

    match &cli.command {
        Commands::Serve { open, .. } => cmd::cmd_serve(&config, *open).await?,
        Commands::Scan { no_prs } => cmd::cmd_scan(&config, !*no_prs).await?,
        Commands::Discover => cmd::cmd_discover(&config).await?,
    }

    Ok(())
}
