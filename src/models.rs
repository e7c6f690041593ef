use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Grouping derived from the first path segment under the scan root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tools,
    Utilities,
    Docs,
    Projects,
    Templates,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Utilities => "utilities",
            Self::Docs => "docs",
            Self::Projects => "projects",
            Self::Templates => "templates",
            Self::Other => "other",
        }
    }

    /// Look up a directory name in the category table. Unknown names map to `Other`.
    pub fn from_segment(segment: &str) -> Self {
        segment.parse().unwrap_or(Self::Other)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tools" => Ok(Self::Tools),
            "utilities" => Ok(Self::Utilities),
            "docs" => Ok(Self::Docs),
            "projects" => Ok(Self::Projects),
            "templates" => Ok(Self::Templates),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A working tree found under the scan root. Immutable once discovered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredRepository {
    pub name: String,
    pub path: PathBuf,
    pub category: Category,
    pub github_url: Option<String>,
    pub has_remote: bool,
    pub default_branch: String,
    pub is_worktree: bool,
    pub parent_repo: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrState {
    Open,
    Draft,
}

/// An open pull request on the hosting service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub head_branch: String,
    pub state: PrState,
    pub updated_at: String,
    pub review_decision: Option<String>,
    pub ci_status: Option<String>,
    pub url: String,
}

/// Point-in-time health of one repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryStatus {
    pub name: String,
    pub path: PathBuf,
    pub category: Category,
    pub github_url: Option<String>,
    pub has_remote: bool,
    pub default_branch: String,
    pub is_worktree: bool,
    pub parent_repo: Option<String>,
    pub current_branch: String,
    pub is_dirty: bool,
    pub uncommitted_files: u32,
    pub insertions: u32,
    pub deletions: u32,
    pub last_commit_date: Option<DateTime<FixedOffset>>,
    pub last_commit_message: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub branch_count: u32,
    pub stale_branches: Vec<String>,
    pub worktree_count: u32,
    pub stash_count: u32,
    pub open_prs: Vec<PullRequest>,
    pub last_scanned: DateTime<Utc>,
}

/// The latest completed scan. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub repos: Vec<RepositoryStatus>,
    pub errors: Vec<String>,
    pub last_scan: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn find(&self, name: &str) -> Option<&RepositoryStatus> {
        self.repos.iter().find(|r| r.name == name)
    }

    /// Flatten every repository's PRs into API rows.
    pub fn pr_listings(&self) -> Vec<PrListing> {
        self.repos
            .iter()
            .flat_map(|status| {
                status.open_prs.iter().map(|pr| PrListing {
                    repo: status.name.clone(),
                    category: status.category,
                    pr: pr.clone(),
                })
            })
            .collect()
    }

    pub fn overview(&self) -> OverviewStats {
        let dirty_repos = self.repos.iter().filter(|s| s.is_dirty).count();
        OverviewStats {
            total_repos: self.repos.len(),
            dirty_repos,
            clean_repos: self.repos.len() - dirty_repos,
            total_open_prs: self.repos.iter().map(|s| s.open_prs.len()).sum(),
            repos_ahead: self.repos.iter().filter(|s| s.ahead > 0).count(),
            repos_behind: self.repos.iter().filter(|s| s.behind > 0).count(),
            total_stale_branches: self.repos.iter().map(|s| s.stale_branches.len()).sum(),
            last_scanned: self.last_scan,
        }
    }
}

/// A pull request tagged with the repository it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct PrListing {
    pub repo: String,
    pub category: Category,
    #[serde(flatten)]
    pub pr: PullRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverviewStats {
    pub total_repos: usize,
    pub dirty_repos: usize,
    pub clean_repos: usize,
    pub total_open_prs: usize,
    pub repos_ahead: usize,
    pub repos_behind: usize,
    pub total_stale_branches: usize,
    pub last_scanned: Option<DateTime<Utc>>,
}

/// Outcome of one scan cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanReport {
    pub repos_scanned: usize,
    pub scan_duration_ms: u64,
    pub errors: Vec<String>,
}
