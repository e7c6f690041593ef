//! Aggregation of discovery, status scanning and PR data into one snapshot.
//!
//! ## Cycle
//!
//! ```text
//! discover (first cycle only, cached)
//!     │
//!     v
//! StatusScanner::scan_all ──> statuses + errors
//!     │
//!     v
//! parse_github_url per status ──> PrFetcher::fetch (one query, TTL cache)
//!     │
//!     v
//! merge PRs by "owner/name" ──> swap in new Arc<Snapshot>
//! ```
//!
//! Cycles never overlap: a second trigger waits for the running one.
//! Readers clone the current `Arc<Snapshot>` and never observe a partial one.

pub mod scheduler;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, OnceCell, RwLock};

use crate::discovery::{DEFAULT_MAX_DEPTH, Discoverer};
use crate::git::GitRunner;
use crate::github::{PrFetcher, PrMap, parse_github_url};
use crate::models::{DiscoveredRepository, RepositoryStatus, ScanReport, Snapshot};
use crate::scanner::StatusScanner;

pub use scheduler::BackgroundScanner;

pub struct Dashboard {
    root: PathBuf,
    max_depth: usize,
    git: Arc<dyn GitRunner>,
    prs: Option<PrFetcher>,
    discovered: OnceCell<Vec<DiscoveredRepository>>,
    snapshot: RwLock<Arc<Snapshot>>,
    cycle: Mutex<()>,
}

impl Dashboard {
    /// `prs: None` disables the remote PR fetch entirely.
    pub fn new(root: impl Into<PathBuf>, git: Arc<dyn GitRunner>, prs: Option<PrFetcher>) -> Self {
        Self {
            root: root.into(),
            max_depth: DEFAULT_MAX_DEPTH,
            git,
            prs,
            discovered: OnceCell::new(),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            cycle: Mutex::new(()),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The most recently published snapshot.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().await.clone()
    }

    /// Repositories found under the root. Discovery runs on first use only.
    pub async fn discovered(&self) -> &[DiscoveredRepository] {
        self.discovered
            .get_or_init(|| async {
                Discoverer::new(self.git.as_ref())
                    .with_max_depth(self.max_depth)
                    .discover(&self.root)
                    .await
            })
            .await
    }

    /// Run one full cycle and publish its snapshot.
    pub async fn run_cycle(&self) -> ScanReport {
        let _running = self.cycle.lock().await;
        let start = Instant::now();

        let repos = self.discovered().await;
        let outcome = StatusScanner::new(self.git.as_ref()).scan_all(repos).await;
        let mut statuses = outcome.statuses;

        if let Some(fetcher) = &self.prs {
            let pairs = github_pairs(&statuses);
            let pr_map = fetcher.fetch(&pairs).await;
            merge_pull_requests(&mut statuses, &pr_map);
        }

        let report = ScanReport {
            repos_scanned: statuses.len(),
            scan_duration_ms: start.elapsed().as_millis() as u64,
            errors: outcome.errors.clone(),
        };

        let next = Arc::new(Snapshot {
            repos: statuses,
            errors: outcome.errors,
            last_scan: Some(Utc::now()),
        });
        *self.snapshot.write().await = next;

        tracing::info!(
            repos = report.repos_scanned,
            errors = report.errors.len(),
            duration_ms = report.scan_duration_ms,
            "Scan cycle complete"
        );
        report
    }
}

fn repo_key(owner: &str, name: &str) -> String {
    format!("{}/{}", owner, name)
}

/// Distinct `(owner, name)` pairs of all statuses with a GitHub remote, in order.
pub fn github_pairs(statuses: &[RepositoryStatus]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for pair in statuses
        .iter()
        .filter_map(|s| s.github_url.as_deref().and_then(parse_github_url))
    {
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
    pairs
}

/// Attach each PR list to every status whose remote is that `owner/name`.
pub fn merge_pull_requests(statuses: &mut [RepositoryStatus], prs: &PrMap) {
    for status in statuses.iter_mut() {
        let Some((owner, name)) = status.github_url.as_deref().and_then(parse_github_url) else {
            continue;
        };
        if let Some(list) = prs.get(&repo_key(&owner, &name)) {
            status.open_prs = list.clone();
        }
    }
}
