//! Typed error hierarchy for the dashboard.
//!
//! Three enums cover the three failure channels:
//! - `CommandError`: an external command produced no usable output
//! - `ScanError`: a whole-repository scan was abandoned
//! - `GraphqlError`: the batched pull-request query failed

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why an external command yielded no result.
///
/// Every variant means the same thing to callers ("unavailable"); the detail
/// only feeds debug logging.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} exited with code {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "none".into()))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Errors that abort the scan of a single repository.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("repository path {} no longer exists", .path.display())]
    PathMissing { path: PathBuf },

    #[error("scan panicked: {message}")]
    Panicked { message: String },
}

/// Errors from the remote pull-request query.
#[derive(Debug, Error)]
pub enum GraphqlError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("GraphQL response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("GraphQL response has no data field")]
    MissingData,
}
