//! Git adapter: the external VCS capability consumed by the orchestrator.
//!
//! The version-control tool itself is opaque; this module shells out to the
//! `git` binary via `tokio::process` and maps non-zero exits to
//! [`FleetError::Git`] carrying the tool's stderr. A per-operation timeout
//! (0 = disabled) bounds every invocation so a stuck network operation fails
//! the one repository instead of hanging the run.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::error::{FleetError, Result};

/// Version-control operations required by the mutation pipeline.
#[async_trait]
pub trait GitClient: Send + Sync {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;
    async fn checkout_new_branch(&self, name: &str) -> Result<()>;
    async fn checkout_branch(&self, name: &str) -> Result<()>;
    async fn fetch(&self, branch: &str) -> Result<()>;
    /// (ahead, behind) of the local branch relative to its origin counterpart.
    async fn ahead_behind(&self, branch: &str) -> Result<(usize, usize)>;
    async fn pull(&self) -> Result<()>;
    async fn stage_all(&self) -> Result<()>;
    async fn has_staged_changes(&self) -> Result<bool>;
    async fn commit(&self, message: &str) -> Result<()>;
    async fn push(&self, branch: &str) -> Result<()>;
}

/// Production [`GitClient`] backed by the `git` CLI.
///
/// One instance owns one working tree. Credential wiring comes in as
/// pre-built `git -c` arguments from the run's
/// [`AuthContext`](crate::auth::AuthContext).
pub struct GitCli {
    work_tree: PathBuf,
    config_args: Vec<String>,
    timeout_secs: u64,
}

impl GitCli {
    pub fn new(work_tree: impl Into<PathBuf>, config_args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            work_tree: work_tree.into(),
            config_args,
            timeout_secs,
        }
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// Run git with the given args. `cwd` of `None` means the invocation does
    /// not need a working tree (clone).
    async fn run(&self, operation: &str, args: &[&str], cwd: Option<&Path>) -> Result<GitOutput> {
        let mut cmd = Command::new("git");
        cmd.args(&self.config_args)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!(operation, args = ?args, "running git");

        let child = cmd.spawn()?;
        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| FleetError::Timeout {
                operation: format!("git {operation}"),
                secs: self.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Ok(GitOutput {
            success: output.status.success(),
            stdout,
            stderr,
        })
    }

    /// Like [`Self::run`] but treats non-zero exit as an error.
    async fn run_checked(&self, operation: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
        let output = self.run(operation, args, cwd).await?;
        if !output.success {
            let message = if output.stderr.trim().is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            return Err(FleetError::Git(format!(
                "git {operation} failed: {}",
                message.trim()
            )));
        }
        Ok(output.stdout)
    }
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

#[async_trait]
impl GitClient for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let dest_str = dest.display().to_string();
        self.run_checked("clone", &["clone", url, &dest_str], None)
            .await?;
        Ok(())
    }

    async fn checkout_new_branch(&self, name: &str) -> Result<()> {
        self.run_checked("checkout -b", &["checkout", "-b", name], Some(&self.work_tree))
            .await?;
        Ok(())
    }

    async fn checkout_branch(&self, name: &str) -> Result<()> {
        self.run_checked("checkout", &["checkout", name], Some(&self.work_tree))
            .await?;
        Ok(())
    }

    async fn fetch(&self, branch: &str) -> Result<()> {
        self.run_checked("fetch", &["fetch", "origin", branch], Some(&self.work_tree))
            .await?;
        Ok(())
    }

    async fn ahead_behind(&self, branch: &str) -> Result<(usize, usize)> {
        let range = format!("{branch}...origin/{branch}");
        let stdout = self
            .run_checked(
                "rev-list",
                &["rev-list", "--left-right", "--count", &range],
                Some(&self.work_tree),
            )
            .await?;
        let mut parts = stdout.split_whitespace();
        let ahead = parts
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| FleetError::Git(format!("unparseable rev-list output: {stdout:?}")))?;
        let behind = parts
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| FleetError::Git(format!("unparseable rev-list output: {stdout:?}")))?;
        Ok((ahead, behind))
    }

    async fn pull(&self) -> Result<()> {
        self.run_checked("pull", &["pull", "--ff-only"], Some(&self.work_tree))
            .await?;
        Ok(())
    }

    async fn stage_all(&self) -> Result<()> {
        self.run_checked("add", &["add", "-A"], Some(&self.work_tree))
            .await?;
        Ok(())
    }

    async fn has_staged_changes(&self) -> Result<bool> {
        // `git diff --cached --quiet` exits 1 when the index differs from HEAD.
        let output = self
            .run(
                "diff --cached",
                &["diff", "--cached", "--quiet"],
                Some(&self.work_tree),
            )
            .await?;
        Ok(!output.success)
    }

    async fn commit(&self, message: &str) -> Result<()> {
        self.run_checked("commit", &["commit", "-m", message], Some(&self.work_tree))
            .await?;
        Ok(())
    }

    async fn push(&self, branch: &str) -> Result<()> {
        self.run_checked(
            "push",
            &["push", "-u", "origin", branch],
            Some(&self.work_tree),
        )
        .await?;
        Ok(())
    }
}
