//! Repository discovery: walks the scan root for working trees.
//!
//! Discovery runs once per process. It never fails as a whole: directories
//! that cannot be read are skipped, and every per-repository lookup
//! degrades to a default.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::git::{GitRunner, branch_names};
use crate::models::{Category, DiscoveredRepository};

/// Maximum directory depth below the root (root/category/repo).
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Dependency caches that never contain repositories worth reporting.
const SKIPPED_DIRS: &[&str] = &["node_modules", "__pycache__", "venv"];

const WORKTREE_MARKER: &str = "/.git/worktrees/";

/// Walks `root` and resolves each working tree it finds.
pub struct Discoverer<'a> {
    git: &'a dyn GitRunner,
    max_depth: usize,
}

impl<'a> Discoverer<'a> {
    pub fn new(git: &'a dyn GitRunner) -> Self {
        Self {
            git,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Find all working trees under `root`, in lexicographic path order.
    pub async fn discover(&self, root: &Path) -> Vec<DiscoveredRepository> {
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut repos = Vec::new();

        for (path, git_entry) in find_working_trees(root, self.max_depth) {
            let (is_worktree, parent_repo) = match git_entry {
                GitEntry::Directory => (false, None),
                GitEntry::Pointer => match read_worktree_parent(&path, &canonical_root) {
                    Some(parent) => (true, parent),
                    None => (false, None),
                },
            };

            let github_url = self.remote_url(&path).await;
            let default_branch = self.default_branch(&path).await;

            repos.push(DiscoveredRepository {
                name: dir_name(&path),
                category: categorize(&path, root),
                has_remote: github_url.is_some(),
                github_url,
                default_branch,
                is_worktree,
                parent_repo,
                path,
            });
        }

        tracing::info!(root = %root.display(), count = repos.len(), "Discovered repositories");
        repos
    }

    /// The branch `origin/HEAD` points at, else a local `main`/`master`, else `main`.
    pub async fn default_branch(&self, repo: &Path) -> String {
        if let Ok(reference) = self
            .git
            .run(repo, &["symbolic-ref", "refs/remotes/origin/HEAD"])
            .await
            && let Some(last) = reference.rsplit('/').next().filter(|s| !s.is_empty())
        {
            return last.to_string();
        }

        if let Ok(branches) = self.git.run(repo, &["branch", "--list"]).await {
            let names: Vec<&str> = branch_names(&branches).collect();
            for candidate in ["main", "master"] {
                if names.contains(&candidate) {
                    return candidate.to_string();
                }
            }
        }

        "main".to_string()
    }

    /// The origin URL in web form, or `None` when no origin is configured.
    pub async fn remote_url(&self, repo: &Path) -> Option<String> {
        let raw = self
            .git
            .run(repo, &["remote", "get-url", "origin"])
            .await
            .ok()?;
        normalize_remote_url(&raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GitEntry {
    /// `.git` is a directory: a primary working tree.
    Directory,
    /// `.git` is a file: a linked worktree pointer.
    Pointer,
}

fn is_skipped(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}

/// Walk the tree and return every directory holding a `.git` entry,
/// without descending into directories already identified as working trees.
fn find_working_trees(root: &Path, max_depth: usize) -> Vec<(PathBuf, GitEntry)> {
    let mut found = Vec::new();
    if !root.is_dir() {
        return found;
    }

    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped(&entry.file_name().to_string_lossy()));

    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let git_path = entry.path().join(".git");
        let Ok(metadata) = std::fs::metadata(&git_path) else {
            continue;
        };
        let kind = if metadata.is_dir() {
            GitEntry::Directory
        } else {
            GitEntry::Pointer
        };
        found.push((entry.path().to_path_buf(), kind));
        // Nested trees (vendored checkouts, submodules) belong to this one.
        walker.skip_current_dir();
    }

    found
}

/// Parse a worktree pointer file.
///
/// Returns `None` when the pointer is unreadable or malformed (the tree is then
/// treated as a primary tree), `Some(None)` for a valid pointer whose parent is
/// unknown or outside the root, and `Some(Some(name))` otherwise.
fn read_worktree_parent(repo: &Path, canonical_root: &Path) -> Option<Option<String>> {
    let content = std::fs::read_to_string(repo.join(".git")).ok()?;
    let gitdir = content.trim().strip_prefix("gitdir:")?.trim();

    let Some((parent, _)) = gitdir.split_once(WORKTREE_MARKER) else {
        return Some(None);
    };

    let parent = resolve_path(repo, Path::new(parent));
    if parent.starts_with(canonical_root) {
        Some(parent.file_name().map(|n| n.to_string_lossy().to_string()))
    } else {
        Some(None)
    }
}

/// Resolve `path` relative to `base`, following symlinks when the target exists.
fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    joined
        .canonicalize()
        .unwrap_or_else(|_| normalize_lexically(&joined))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Category from the first path segment under `root`.
///
/// A repository directly under the root looks up its own name.
pub fn categorize(repo: &Path, root: &Path) -> Category {
    repo.strip_prefix(root)
        .ok()
        .and_then(|relative| relative.components().next())
        .map(|first| Category::from_segment(&first.as_os_str().to_string_lossy()))
        .unwrap_or(Category::Other)
}

/// Convert an SSH GitHub address to HTTPS and drop a trailing `.git`.
pub fn normalize_remote_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = match raw.strip_prefix("git@github.com:") {
        Some(rest) => format!("https://github.com/{}", rest),
        None => raw.to_string(),
    };
    Some(match url.strip_suffix(".git") {
        Some(stripped) => stripped.to_string(),
        None => url,
    })
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
