//! Git Manager (§4.4): a narrow async wrapper over the `git` CLI, spawned
//! via `tokio::process::Command` in the same shell-out idiom the teacher
//! uses for `git diff --no-index` in its own test helpers — stdout/stderr
//! captured, exit status checked, output parsed defensively.
//!
//! All operations within one run are serialized through [`GitManager`]'s
//! internal mutex (§5 "no two git operations run concurrently within a
//! single run").

pub mod branch;
pub mod worktree;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::Mutex;

use crate::config::{PipelineConfig, Settings};
use crate::error::GitError;

/// Serializes every git invocation for one run's worktree (§5 "Git index"
/// shared resource: a per-run mutex around stage commits).
pub struct GitManager {
    worktree: PathBuf,
    lock: Mutex<()>,
}

/// Output of `git status --porcelain`-backed queries.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub dirty_paths: Vec<String>,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.dirty_paths.is_empty()
    }
}

impl GitManager {
    pub fn new(worktree: PathBuf) -> Self {
        Self {
            worktree,
            lock: Mutex::new(()),
        }
    }

    pub fn worktree(&self) -> &Path {
        &self.worktree
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let _guard = self.lock.lock().await;
        self.run_unlocked(args).await
    }

    /// Run without acquiring the lock — for callers that already hold it
    /// across a multi-step sequence (e.g. stage+commit in one critical
    /// section, §5).
    async fn run_unlocked(&self, args: &[&str]) -> Result<String, GitError> {
        tracing::debug!(args = ?args, cwd = %self.worktree.display(), "git invocation");
        let output = Command::new("git")
            .current_dir(&self.worktree)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    /// Run holding the manager's lock for the duration of `body`, so
    /// multiple git calls execute as one atomic section (used by
    /// `create_pipeline_commit` so stage+commit can't interleave with
    /// another stage's commit, §5).
    async fn with_lock<T, F, Fut>(&self, body: F) -> Result<T, GitError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, GitError>>,
    {
        let _guard = self.lock.lock().await;
        body().await
    }

    pub async fn status(&self) -> Result<StatusReport, GitError> {
        let out = self.run(&["status", "--porcelain"]).await?;
        let dirty_paths = out
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l[3.min(l.len())..].to_string())
            .collect();
        Ok(StatusReport { dirty_paths })
    }

    pub async fn has_uncommitted_changes(&self) -> Result<bool, GitError> {
        Ok(!self.status().await?.is_clean())
    }

    pub async fn get_current_commit(&self) -> Result<String, GitError> {
        self.run(&["rev-parse", "HEAD"]).await
    }

    /// Fails on detached HEAD (§4.4).
    pub async fn get_current_branch(&self) -> Result<String, GitError> {
        let branch = self.run(&["symbolic-ref", "--short", "-q", "HEAD"]).await;
        match branch {
            Ok(b) if !b.is_empty() => Ok(b),
            _ => Err(GitError::DetachedHead),
        }
    }

    pub async fn stage_all_changes(&self) -> Result<(), GitError> {
        self.run(&["add", "-A"]).await.map(|_| ())
    }

    /// Creates a commit from currently staged changes, returning the empty
    /// string when nothing was staged (§4.4). Commit message is
    /// `settings.commitPrefix` with `{{stage}}` expanded plus the
    /// `Agent-Pipeline`/`Pipeline-Run-ID`/`Pipeline-Stage` trailers (§6).
    pub async fn create_pipeline_commit(
        &self,
        stage_name: &str,
        settings: &Settings,
        run_id: &str,
    ) -> Result<String, GitError> {
        self.with_lock(|| async {
            self.stage_all_changes_unlocked().await?;
            if !self.has_uncommitted_changes_unlocked().await? {
                return Ok(String::new());
            }
            let prefix = settings.commit_prefix.replace("{{stage}}", stage_name);
            let message = format!(
                "{prefix} Apply {stage_name} changes\n\nAgent-Pipeline: true\nPipeline-Run-ID: {run_id}\nPipeline-Stage: {stage_name}"
            );
            self.run_unlocked(&["commit", "-m", &message]).await?;
            self.run_unlocked(&["rev-parse", "HEAD"]).await
        })
        .await
    }

    async fn stage_all_changes_unlocked(&self) -> Result<(), GitError> {
        self.run_unlocked(&["add", "-A"]).await.map(|_| ())
    }

    async fn has_uncommitted_changes_unlocked(&self) -> Result<bool, GitError> {
        let out = self
            .run_unlocked(&["status", "--porcelain"])
            .await?;
        Ok(!out.is_empty())
    }

    /// Files that differ between two commits (`base`, `head`), used to
    /// populate `changedFiles` (§3 `Artifacts`).
    pub async fn get_changed_files(
        &self,
        base: &str,
        head: &str,
    ) -> Result<Vec<String>, GitError> {
        let out = self
            .run(&["diff", "--name-only", base, head])
            .await?;
        Ok(out.lines().filter(|l| !l.is_empty()).map(String::from).collect())
    }

    pub async fn revert_to_commit(&self, sha: &str) -> Result<(), GitError> {
        self.run(&["reset", "--hard", sha]).await.map(|_| ())
    }

    /// Merge `source_branch` into the current branch, preferring
    /// fast-forward; surfaces [`GitError::NonFastForward`] when that's
    /// impossible (§4.4 "no-op if fast-forward impossible -> surface error").
    pub async fn merge(&self, source_branch: &str) -> Result<(), GitError> {
        match self
            .run(&["merge", "--ff-only", source_branch])
            .await
        {
            Ok(_) => Ok(()),
            Err(GitError::CommandFailed { .. }) => {
                Err(GitError::NonFastForward(source_branch.to_string()))
            }
            Err(other) => Err(other),
        }
    }

    pub async fn is_branch_checked_out(&self, branch: &str) -> Result<bool, GitError> {
        let out = self
            .run(&["worktree", "list", "--porcelain"])
            .await
            .unwrap_or_default();
        Ok(out.lines().any(|l| l == format!("branch refs/heads/{branch}")))
    }

    pub async fn fetch(&self, remote: &str) -> Result<(), GitError> {
        self.run(&["fetch", remote]).await.map(|_| ())
    }

    pub async fn push(&self, args: &[&str]) -> Result<(), GitError> {
        let mut full = vec!["push"];
        full.extend_from_slice(args);
        self.run(&full).await.map(|_| ())
    }

    pub async fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let out = self
            .run(&["branch", "--list", branch])
            .await
            .unwrap_or_default();
        Ok(!out.is_empty())
    }

    pub async fn delete_local_branch(&self, name: &str, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, name]).await.map(|_| ())
    }

    pub async fn list_pipeline_branches(&self, prefix: &str) -> Result<Vec<String>, GitError> {
        let pattern = format!("{prefix}/*");
        let out = self
            .run(&["branch", "--list", &pattern, "--format=%(refname:short)"])
            .await?;
        Ok(out.lines().filter(|l| !l.is_empty()).map(String::from).collect())
    }

    pub async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.run(&["checkout", branch]).await.map(|_| ())
    }

    pub async fn create_branch_from(&self, branch: &str, start_point: &str) -> Result<(), GitError> {
        self.run(&["checkout", "-b", branch, start_point])
            .await
            .map(|_| ())
    }
}

/// Expand `settings.commitPrefix`'s `{{stage}}` placeholder (shared helper
/// used by both commit creation and PR title templating, §6).
pub fn expand_commit_prefix(config: &PipelineConfig, stage_name: &str) -> String {
    config
        .settings
        .commit_prefix
        .replace("{{stage}}", stage_name)
}
