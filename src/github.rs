//! Open pull requests for every repository, fetched in one GraphQL round trip.
//!
//! The query goes through the `gh` CLI (`gh api graphql`), so authentication is
//! whatever the user already configured for it. Results are cached for a fixed
//! TTL; on any failure the last good result is served instead.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};

use crate::errors::{CommandError, GraphqlError};
use crate::models::{PrState, PullRequest};

pub const DEFAULT_GH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PR_CACHE_TTL: Duration = Duration::from_secs(300);

/// Open PRs requested per repository.
const PRS_PER_REPO: u32 = 10;

/// Map from `"owner/name"` to that repository's open pull requests.
pub type PrMap = HashMap<String, Vec<PullRequest>>;

/// Extract `(owner, name)` from a GitHub web or SSH URL.
///
/// Handles:
/// - `https://github.com/owner/repo`
/// - `https://github.com/owner/repo.git`
/// - `git@github.com:owner/repo.git`
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("git@github.com:"))?;

    let mut parts = rest.split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let name = parts.next()?;
    let name = name.strip_suffix(".git").unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    Some((owner.to_string(), name.to_string()))
}

fn alias(index: usize) -> String {
    format!("repo_{}", index)
}

/// Build one query with an aliased `repository` field per `(owner, name)` pair.
pub fn build_pr_query(repos: &[(String, String)]) -> String {
    let fragments: Vec<String> = repos
        .iter()
        .enumerate()
        .map(|(i, (owner, name))| {
            // JSON string literals are valid GraphQL string literals.
            let owner = serde_json::Value::String(owner.clone());
            let name = serde_json::Value::String(name.clone());
            format!(
                r#"  {alias}: repository(owner: {owner}, name: {name}) {{
    nameWithOwner
    pullRequests(states: OPEN, first: {PRS_PER_REPO}, orderBy: {{field: UPDATED_AT, direction: DESC}}) {{
      nodes {{
        number
        title
        headRefName
        updatedAt
        isDraft
        reviewDecision
        commits(last: 1) {{
          nodes {{
            commit {{
              statusCheckRollup {{
                state
              }}
            }}
          }}
        }}
      }}
    }}
  }}"#,
                alias = alias(i),
            )
        })
        .collect();
    format!("{{\n{}\n}}", fragments.join("\n"))
}

// ── Response shapes ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<HashMap<String, Option<RepoNode>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    pull_requests: Connection<PrNode>,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrNode {
    number: u64,
    title: String,
    head_ref_name: String,
    updated_at: String,
    #[serde(default)]
    is_draft: bool,
    review_decision: Option<String>,
    commits: Option<Connection<CommitNode>>,
}

#[derive(Debug, Deserialize)]
struct CommitNode {
    commit: Option<Commit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Commit {
    status_check_rollup: Option<Rollup>,
}

#[derive(Debug, Deserialize)]
struct Rollup {
    state: Option<String>,
}

impl PrNode {
    fn ci_status(&self) -> Option<String> {
        self.commits
            .as_ref()?
            .nodes
            .first()?
            .commit
            .as_ref()?
            .status_check_rollup
            .as_ref()?
            .state
            .clone()
    }

    fn into_pull_request(self, owner: &str, name: &str) -> PullRequest {
        let ci_status = self.ci_status();
        PullRequest {
            url: format!("https://github.com/{}/{}/pull/{}", owner, name, self.number),
            number: self.number,
            title: self.title,
            head_branch: self.head_ref_name,
            state: if self.is_draft {
                PrState::Draft
            } else {
                PrState::Open
            },
            updated_at: self.updated_at,
            review_decision: self.review_decision,
            ci_status,
        }
    }
}

/// Turn the `data` object of a response into a [`PrMap`].
///
/// Repositories whose alias is missing or null (deleted, renamed, no access)
/// are left out of the map.
pub fn parse_pr_response(
    repos: &[(String, String)],
    body: &serde_json::Value,
) -> Result<PrMap, GraphqlError> {
    let response: GraphqlResponse = serde_json::from_value(body.clone())?;
    let mut data = response.data.ok_or(GraphqlError::MissingData)?;

    let mut map = PrMap::new();
    for (i, (owner, name)) in repos.iter().enumerate() {
        let Some(Some(repo)) = data.remove(&alias(i)) else {
            continue;
        };
        let prs = repo
            .pull_requests
            .nodes
            .into_iter()
            .map(|node| node.into_pull_request(owner, name))
            .collect();
        map.insert(format!("{}/{}", owner, name), prs);
    }
    Ok(map)
}

// ── Transport ─────────────────────────────────────────────────────────

#[async_trait]
pub trait GraphqlClient: Send + Sync {
    /// Execute a GraphQL query and return the raw JSON response body.
    async fn execute(&self, query: &str) -> Result<serde_json::Value, GraphqlError>;
}

/// Issues queries through `gh api graphql`.
#[derive(Debug, Clone)]
pub struct GhCli {
    program: String,
    timeout: Duration,
}

impl GhCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl GraphqlClient for GhCli {
    async fn execute(&self, query: &str) -> Result<serde_json::Value, GraphqlError> {
        let child = Command::new(&self.program)
            .args(["api", "graphql", "-f"])
            .arg(format!("query={}", query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CommandError::TimedOut {
                program: self.program.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

// ── Cached fetcher ────────────────────────────────────────────────────

struct CacheEntry {
    fetched_at: Instant,
    prs: PrMap,
}

/// Fetches open PRs with a time-bounded cache.
///
/// The cache is keyed by time only: inside the TTL the cached map is returned
/// whatever repository list is requested.
pub struct PrFetcher {
    client: Box<dyn GraphqlClient>,
    ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl PrFetcher {
    pub fn new(client: Box<dyn GraphqlClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Open PRs for each `(owner, name)`. Never fails: errors fall back to the
    /// previous result, or to an empty map when there is none.
    pub async fn fetch(&self, repos: &[(String, String)]) -> PrMap {
        let mut cache = self.cache.lock().await;

        if let Some(entry) = cache.as_ref()
            && entry.fetched_at.elapsed() < self.ttl
        {
            return entry.prs.clone();
        }

        if repos.is_empty() {
            return PrMap::new();
        }

        let query = build_pr_query(repos);
        let result = match self.client.execute(&query).await {
            Ok(body) => parse_pr_response(repos, &body),
            Err(e) => Err(e),
        };

        match result {
            Ok(prs) => {
                tracing::info!(
                    repos = repos.len(),
                    with_prs = prs.values().filter(|v| !v.is_empty()).count(),
                    "Fetched open pull requests"
                );
                *cache = Some(CacheEntry {
                    fetched_at: Instant::now(),
                    prs: prs.clone(),
                });
                prs
            }
            Err(e) => {
                tracing::warn!(error = %e, "Pull request query failed; serving cached data");
                cache.as_ref().map(|entry| entry.prs.clone()).unwrap_or_default()
            }
        }
    }
}
