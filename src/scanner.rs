//! Local health scan for discovered repositories.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use regex::Regex;

use crate::errors::ScanError;
use crate::git::{GitRunner, branch_names, non_blank_lines};
use crate::models::{DiscoveredRepository, RepositoryStatus};

static INSERTIONS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) insertion").expect("valid regex"));
static DELETIONS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) deletion").expect("valid regex"));

/// Result of scanning a list of repositories.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Statuses in input order; failed repositories are absent.
    pub statuses: Vec<RepositoryStatus>,
    /// One `"<name>: <reason>"` entry per failed repository.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

pub struct StatusScanner<'a> {
    git: &'a dyn GitRunner,
}

impl<'a> StatusScanner<'a> {
    pub fn new(git: &'a dyn GitRunner) -> Self {
        Self { git }
    }

    /// Scan every repository in sequence. One failure never stops the rest.
    pub async fn scan_all(&self, repos: &[DiscoveredRepository]) -> ScanOutcome {
        let start = Instant::now();
        let mut outcome = ScanOutcome::default();

        for repo in repos {
            match self.scan_isolated(repo).await {
                Ok(status) => outcome.statuses.push(status),
                Err(e) => {
                    tracing::warn!(repo = %repo.name, error = %e, "Repository scan failed");
                    outcome.errors.push(format!("{}: {}", repo.name, e));
                }
            }
        }

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        outcome
    }

    async fn scan_isolated(&self, repo: &DiscoveredRepository) -> Result<RepositoryStatus, ScanError> {
        match AssertUnwindSafe(self.scan_repo(repo)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(ScanError::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Collect a health snapshot for one repository.
    ///
    /// Each git query degrades to its default independently; only a vanished
    /// working tree fails the whole scan.
    pub async fn scan_repo(&self, repo: &DiscoveredRepository) -> Result<RepositoryStatus, ScanError> {
        let path = repo.path.as_path();
        if !path.is_dir() {
            return Err(ScanError::PathMissing {
                path: repo.path.clone(),
            });
        }

        let current_branch = self
            .git
            .run(path, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .ok()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let uncommitted_files = self.count_lines(path, &["status", "--porcelain"]).await;
        let (insertions, deletions) = self.line_changes(path).await;
        let (last_commit_date, last_commit_message) = self.last_commit(path).await;
        let (ahead, behind) = self.ahead_behind(path).await;
        let branch_count = self.count_lines(path, &["branch", "--list"]).await;
        let stale_branches = self.stale_branches(path, &repo.default_branch).await;
        let worktree_count = self.count_lines(path, &["worktree", "list"]).await;
        let stash_count = self.count_lines(path, &["stash", "list"]).await;

        Ok(RepositoryStatus {
            name: repo.name.clone(),
            path: repo.path.clone(),
            category: repo.category,
            github_url: repo.github_url.clone(),
            has_remote: repo.has_remote,
            default_branch: repo.default_branch.clone(),
            is_worktree: repo.is_worktree,
            parent_repo: repo.parent_repo.clone(),
            current_branch,
            is_dirty: uncommitted_files > 0,
            uncommitted_files,
            insertions,
            deletions,
            last_commit_date,
            last_commit_message,
            ahead,
            behind,
            branch_count,
            stale_branches,
            worktree_count,
            stash_count,
            open_prs: Vec::new(),
            last_scanned: Utc::now(),
        })
    }

    async fn count_lines(&self, path: &Path, args: &[&str]) -> u32 {
        self.git
            .run(path, args)
            .await
            .map(|out| non_blank_lines(&out).count() as u32)
            .unwrap_or(0)
    }

    /// Unstaged plus staged line changes.
    async fn line_changes(&self, path: &Path) -> (u32, u32) {
        let mut totals = (0, 0);
        for args in [
            &["diff", "--shortstat"][..],
            &["diff", "--cached", "--shortstat"][..],
        ] {
            if let Ok(output) = self.git.run(path, args).await {
                let (ins, del) = parse_shortstat(&output);
                totals.0 += ins;
                totals.1 += del;
            }
        }
        totals
    }

    async fn last_commit(&self, path: &Path) -> (Option<DateTime<chrono::FixedOffset>>, Option<String>) {
        let Ok(line) = self.git.run(path, &["log", "-1", "--format=%aI|%s"]).await else {
            return (None, None);
        };
        match line.split_once('|') {
            Some((date, subject)) => (
                DateTime::parse_from_rfc3339(date.trim()).ok(),
                Some(subject.to_string()),
            ),
            None => (None, None),
        }
    }

    async fn ahead_behind(&self, path: &Path) -> (u32, u32) {
        self.git
            .run(path, &["rev-list", "--left-right", "--count", "HEAD...@{upstream}"])
            .await
            .ok()
            .and_then(|out| parse_ahead_behind(&out))
            .unwrap_or((0, 0))
    }

    async fn stale_branches(&self, path: &Path, default_branch: &str) -> Vec<String> {
        let Ok(output) = self
            .git
            .run(
                path,
                &["branch", "--merged", default_branch, "--no-contains", default_branch],
            )
            .await
        else {
            return Vec::new();
        };
        branch_names(&output)
            .filter(|name| !name.is_empty() && *name != default_branch)
            .map(str::to_string)
            .collect()
    }
}

/// Insertions and deletions from `git diff --shortstat` output.
pub fn parse_shortstat(output: &str) -> (u32, u32) {
    let count = |re: &Regex| {
        re.captures(output)
            .and_then(|c| c[1].parse::<u32>().ok())
            .unwrap_or(0)
    };
    (count(&INSERTIONS_REGEX), count(&DELETIONS_REGEX))
}

/// `(ahead, behind)` from `git rev-list --left-right --count` output.
pub fn parse_ahead_behind(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((ahead, behind))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeGit;
    use crate::models::Category;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn repo_at(path: PathBuf, name: &str) -> DiscoveredRepository {
        DiscoveredRepository {
            name: name.to_string(),
            path,
            category: Category::Tools,
            github_url: Some(format!("https://github.com/acme/{}", name)),
            has_remote: true,
            default_branch: "main".into(),
            is_worktree: false,
            parent_repo: None,
        }
    }

    #[test]
    fn test_parse_shortstat_full() {
        let out = " 3 files changed, 12 insertions(+), 4 deletions(-)";
        assert_eq!(parse_shortstat(out), (12, 4));
    }

    #[test]
    fn test_parse_shortstat_singular_and_partial() {
        assert_eq!(parse_shortstat(" 1 file changed, 1 insertion(+)"), (1, 0));
        assert_eq!(parse_shortstat(" 1 file changed, 1 deletion(-)"), (0, 1));
        assert_eq!(parse_shortstat(""), (0, 0));
    }

    #[test]
    fn test_parse_ahead_behind() {
        assert_eq!(parse_ahead_behind("2\t5"), Some((2, 5)));
        assert_eq!(parse_ahead_behind("0 0"), Some((0, 0)));
        assert_eq!(parse_ahead_behind("x 1"), None);
        assert_eq!(parse_ahead_behind("3"), None);
    }

    #[tokio::test]
    async fn test_scan_repo_collects_all_signals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        let git = FakeGit::new();
        git.respond(&path, "rev-parse --abbrev-ref HEAD", "feature/x")
            .respond(&path, "status --porcelain", "M src/lib.rs\n?? new.txt\n\n")
            .respond(&path, "diff --shortstat", "1 file changed, 10 insertions(+), 2 deletions(-)")
            .respond(&path, "diff --cached --shortstat", "1 file changed, 5 insertions(+)")
            .respond(&path, "log -1 --format=%aI|%s", "2026-03-01T10:00:00+01:00|Fix parser | again")
            .respond(&path, "rev-list --left-right --count HEAD...@{upstream}", "2\t1")
            .respond(&path, "branch --list", "  main\n* feature/x\n  old-fix")
            .respond(&path, "branch --merged main --no-contains main", "  old-fix\n  main")
            .respond(&path, "worktree list", "/a  abc [main]\n/b  def [feature/x]")
            .respond(&path, "stash list", "stash@{0}: WIP");

        let scanner = StatusScanner::new(&git);
        let status = scanner.scan_repo(&repo_at(path, "widgets")).await.unwrap();

        assert_eq!(status.current_branch, "feature/x");
        assert!(status.is_dirty);
        assert_eq!(status.uncommitted_files, 2);
        assert_eq!(status.insertions, 15);
        assert_eq!(status.deletions, 2);
        assert_eq!(
            status.last_commit_date.map(|d| d.to_rfc3339()),
            Some("2026-03-01T10:00:00+01:00".to_string())
        );
        assert_eq!(status.last_commit_message.as_deref(), Some("Fix parser | again"));
        assert_eq!((status.ahead, status.behind), (2, 1));
        assert_eq!(status.branch_count, 3);
        assert_eq!(status.stale_branches, vec!["old-fix".to_string()]);
        assert_eq!(status.worktree_count, 2);
        assert_eq!(status.stash_count, 1);
        assert!(status.open_prs.is_empty());
        assert_eq!(status.github_url.as_deref(), Some("https://github.com/acme/widgets"));
    }

    #[tokio::test]
    async fn test_scan_repo_defaults_when_git_has_nothing() {
        let dir = TempDir::new().unwrap();
        let git = FakeGit::new();
        let scanner = StatusScanner::new(&git);
        let status = scanner
            .scan_repo(&repo_at(dir.path().to_path_buf(), "empty"))
            .await
            .unwrap();

        assert_eq!(status.current_branch, "unknown");
        assert!(!status.is_dirty);
        assert_eq!((status.insertions, status.deletions), (0, 0));
        assert!(status.last_commit_date.is_none());
        assert!(status.last_commit_message.is_none());
        assert_eq!((status.ahead, status.behind), (0, 0));
        assert_eq!(status.branch_count, 0);
        assert!(status.stale_branches.is_empty());
        assert_eq!(status.stash_count, 0);
    }

    #[tokio::test]
    async fn test_scan_all_isolates_failures_and_keeps_order() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        let third = dir.path().join("third");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&third).unwrap();

        let git = FakeGit::new();
        let scanner = StatusScanner::new(&git);
        let repos = vec![
            repo_at(first, "first"),
            repo_at(second, "second"),
            repo_at(third, "third"),
        ];
        let outcome = scanner.scan_all(&repos).await;

        let names: Vec<&str> = outcome.statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "third"]);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("second: "));
    }

    #[tokio::test]
    async fn test_scan_all_converts_panics_into_errors() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good");
        let bad = dir.path().join("bad");
        std::fs::create_dir_all(&good).unwrap();
        std::fs::create_dir_all(&bad).unwrap();

        let git = FakeGit::new();
        git.panic_on(&bad);
        let scanner = StatusScanner::new(&git);
        let outcome = scanner
            .scan_all(&[repo_at(bad, "bad"), repo_at(good, "good")])
            .await;

        assert_eq!(outcome.statuses.len(), 1);
        assert_eq!(outcome.statuses[0].name, "good");
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("bad: scan panicked"));
    }
}
