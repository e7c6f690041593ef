//! The only I/O boundary to the version-control tool.
//!
//! Every query goes through [`GitRunner::run`], which either yields trimmed
//! stdout or a [`CommandError`] explaining why the tool had nothing to say.
//! Callers decide the fallback value at the point of use.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::errors::CommandError;

/// Default per-command timeout for git invocations.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run `git -C <dir> <args...>` and return trimmed stdout on exit status zero.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, CommandError>;
}

/// Runs the real `git` executable with a bounded timeout.
#[derive(Debug, Clone)]
pub struct CliGit {
    program: String,
    timeout: Duration,
}

impl CliGit {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl GitRunner for CliGit {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, CommandError> {
        let child = Command::new(&self.program)
            .arg("-C")
            .arg(dir)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                tracing::debug!(dir = %dir.display(), ?args, "git command timed out");
                return Err(CommandError::TimedOut {
                    program: self.program.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::debug!(dir = %dir.display(), ?args, %stderr, "git command failed");
            return Err(CommandError::Failed {
                program: self.program.clone(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Non-blank lines of a command's output.
pub fn non_blank_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().filter(|line| !line.trim().is_empty())
}

/// Branch names from `git branch` output, with the `*` (current) and
/// `+` (checked out elsewhere) markers removed.
pub fn branch_names(output: &str) -> impl Iterator<Item = &str> {
    non_blank_lines(output).map(|line| line.trim_start_matches(['*', '+', ' ']).trim_end())
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted stand-in for the git executable.

    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::GitRunner;
    use crate::errors::CommandError;

    #[derive(Default)]
    pub struct FakeGit {
        responses: Mutex<HashMap<(PathBuf, String), String>>,
        panic_on: Mutex<Option<PathBuf>>,
        delays: Mutex<HashMap<String, Duration>>,
        calls: Mutex<Vec<(PathBuf, String)>>,
        finished: Mutex<Vec<String>>,
    }

    impl FakeGit {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the output of `git -C dir <args>`; unscripted calls fail.
        pub fn respond(&self, dir: &Path, args: &str, output: &str) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .insert((dir.to_path_buf(), args.to_string()), output.to_string());
            self
        }

        pub fn panic_on(&self, dir: &Path) {
            *self.panic_on.lock().unwrap() = Some(dir.to_path_buf());
        }

        /// Make every `git <args>` call take `delay` before answering.
        pub fn delay(&self, args: &str, delay: Duration) -> &Self {
            self.delays.lock().unwrap().insert(args.to_string(), delay);
            self
        }

        /// Calls of `git <args>` that ran to completion.
        pub fn finished_for(&self, args: &str) -> usize {
            self.finished
                .lock()
                .unwrap()
                .iter()
                .filter(|a| *a == args)
                .count()
        }

        pub fn calls_for(&self, args: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, a)| a == args)
                .count()
        }
    }

    #[async_trait]
    impl GitRunner for FakeGit {
        async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, CommandError> {
            let joined = args.join(" ");
            self.calls
                .lock()
                .unwrap()
                .push((dir.to_path_buf(), joined.clone()));
            if self.panic_on.lock().unwrap().as_deref() == Some(dir) {
                panic!("scripted failure for {}", dir.display());
            }
            let delay = self.delays.lock().unwrap().get(&joined).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.finished.lock().unwrap().push(joined.clone());
            self.responses
                .lock()
                .unwrap()
                .get(&(dir.to_path_buf(), joined))
                .cloned()
                .ok_or_else(|| CommandError::Failed {
                    program: "git".into(),
                    code: Some(128),
                    stderr: "not scripted".into(),
                })
        }
    }
}
