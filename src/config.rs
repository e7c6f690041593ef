//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then `dashboard.toml` (or the file
//! passed with `--config`), then environment variables, then CLI flags.
//!
//! ```toml
//! root = "~/repos"
//! host = "127.0.0.1"
//! port = 8765
//! scan_interval_secs = 30
//! max_depth = 3
//! git_cmd = "git"
//! git_timeout_secs = 5
//! gh_cmd = "gh"
//! gh_timeout_secs = 30
//! pr_cache_ttl_secs = 300
//! static_dir = "static"
//! log_dir = "/var/log/repo-dashboard"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::dashboard::scheduler::DEFAULT_SCAN_INTERVAL;
use crate::discovery::DEFAULT_MAX_DEPTH;
use crate::git::DEFAULT_GIT_TIMEOUT;
use crate::github::{DEFAULT_GH_TIMEOUT, DEFAULT_PR_CACHE_TTL};

pub const ROOT_ENV: &str = "REPO_DASHBOARD_ROOT";
pub const HOST_ENV: &str = "REPO_DASHBOARD_HOST";
pub const PORT_ENV: &str = "REPO_DASHBOARD_PORT";
pub const GIT_ENV: &str = "REPO_DASHBOARD_GIT";
pub const GH_ENV: &str = "REPO_DASHBOARD_GH";

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "dashboard.toml";

/// Scan root used when neither an override nor the environment names one.
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repos")
}

/// Resolve the scan root: override > `REPO_DASHBOARD_ROOT` value > `~/repos`.
pub fn resolve_root(override_root: Option<&Path>, env_root: Option<&str>) -> PathBuf {
    if let Some(root) = override_root {
        return expand_home(root);
    }
    match env_root.map(str::trim).filter(|s| !s.is_empty()) {
        Some(root) => expand_home(Path::new(root)),
        None => default_root(),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Optional keys read from the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub scan_interval_secs: Option<u64>,
    pub max_depth: Option<usize>,
    pub git_cmd: Option<String>,
    pub git_timeout_secs: Option<u64>,
    pub gh_cmd: Option<String>,
    pub gh_timeout_secs: Option<u64>,
    pub pr_cache_ttl_secs: Option<u64>,
    pub static_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Values supplied on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub scan_interval_secs: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub root: PathBuf,
    pub host: String,
    pub port: u16,
    pub scan_interval_secs: u64,
    pub max_depth: usize,
    pub git_cmd: String,
    pub git_timeout_secs: u64,
    pub gh_cmd: String,
    pub gh_timeout_secs: u64,
    pub pr_cache_ttl_secs: u64,
    pub static_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            host: "127.0.0.1".to_string(),
            port: 8765,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL.as_secs(),
            max_depth: DEFAULT_MAX_DEPTH,
            git_cmd: "git".to_string(),
            git_timeout_secs: DEFAULT_GIT_TIMEOUT.as_secs(),
            gh_cmd: "gh".to_string(),
            gh_timeout_secs: DEFAULT_GH_TIMEOUT.as_secs(),
            pr_cache_ttl_secs: DEFAULT_PR_CACHE_TTL.as_secs(),
            static_dir: PathBuf::from("static"),
            log_dir: None,
        }
    }
}

impl DashboardConfig {
    /// Build the effective configuration from every layer.
    ///
    /// `config_path` must exist when given; otherwise `dashboard.toml` in the
    /// current directory is used if present.
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let file = match config_path {
            Some(path) => FileConfig::load(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    FileConfig::load(default_path)?
                } else {
                    FileConfig::default()
                }
            }
        };
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self::layered(file, env, cli)
    }

    fn layered(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
        cli: &CliOverrides,
    ) -> Result<Self> {
        let mut config = Self::default();

        // file
        if let Some(root) = file.root {
            config.root = expand_home(&root);
        }
        config.host = file.host.unwrap_or(config.host);
        config.port = file.port.unwrap_or(config.port);
        config.scan_interval_secs = file.scan_interval_secs.unwrap_or(config.scan_interval_secs);
        config.max_depth = file.max_depth.unwrap_or(config.max_depth);
        config.git_cmd = file.git_cmd.unwrap_or(config.git_cmd);
        config.git_timeout_secs = file.git_timeout_secs.unwrap_or(config.git_timeout_secs);
        config.gh_cmd = file.gh_cmd.unwrap_or(config.gh_cmd);
        config.gh_timeout_secs = file.gh_timeout_secs.unwrap_or(config.gh_timeout_secs);
        config.pr_cache_ttl_secs = file.pr_cache_ttl_secs.unwrap_or(config.pr_cache_ttl_secs);
        config.static_dir = file.static_dir.unwrap_or(config.static_dir);
        config.log_dir = file.log_dir.or(config.log_dir);

        // environment and command line both outrank the file for the root
        let env_root = env(ROOT_ENV);
        if cli.root.is_some() || env_root.is_some() {
            config.root = resolve_root(cli.root.as_deref(), env_root.as_deref());
        }

        // environment
        if let Some(host) = env(HOST_ENV) {
            config.host = host;
        }
        if let Some(port) = env(PORT_ENV) {
            config.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", PORT_ENV, port))?;
        }
        if let Some(git) = env(GIT_ENV) {
            config.git_cmd = git;
        }
        if let Some(gh) = env(GH_ENV) {
            config.gh_cmd = gh;
        }

        // command line
        if let Some(host) = &cli.host {
            config.host = host.clone();
        }
        config.port = cli.port.unwrap_or(config.port);
        config.scan_interval_secs = cli.scan_interval_secs.unwrap_or(config.scan_interval_secs);
        if let Some(log_dir) = &cli.log_dir {
            config.log_dir = Some(log_dir.clone());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        if self.scan_interval_secs == 0 {
            bail!("scan_interval_secs must be at least 1");
        }
        if self.max_depth == 0 {
            bail!("max_depth must be at least 1");
        }
        if self.git_timeout_secs == 0 || self.gh_timeout_secs == 0 {
            bail!("command timeouts must be at least 1 second");
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn gh_timeout(&self) -> Duration {
        Duration::from_secs(self.gh_timeout_secs)
    }

    pub fn pr_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.pr_cache_ttl_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
