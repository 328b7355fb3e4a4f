//! Worktree Manager (§4.5): isolated working directories per run.
//!
//! Each run gets `<repo>/.agent-pipeline/worktrees/<pipeline>-<runId8>`,
//! bound to the pipeline branch via `git worktree add`. The root
//! repository is never mutated during a run except during finalize
//! (merge) and cleanup (§4.5 invariant).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::WorktreeError;

/// Result of standing up a run's worktree.
#[derive(Debug, Clone)]
pub struct WorktreeHandle {
    pub worktree_path: PathBuf,
    pub pipeline_branch: String,
}

fn worktrees_root(repo_root: &Path) -> PathBuf {
    repo_root.join(".agent-pipeline").join("worktrees")
}

/// Shared by [`crate::finalizer`] for the root-repo git invocations a
/// local merge needs (the worktree's own [`crate::git::GitManager`] only
/// ever operates inside the worktree, never on the root checkout).
pub(crate) async fn run_git(repo_root: &Path, args: &[&str]) -> Result<String, WorktreeError> {
    let output = Command::new("git")
        .current_dir(repo_root)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(crate::error::GitError::Spawn)?;
    if !output.status.success() {
        return Err(WorktreeError::Git(crate::error::GitError::CommandFailed {
            command: args.join(" "),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Create (or reuse) the worktree directory `<repo>/.agent-pipeline/worktrees/<pipeline>-<runId8>`
/// bound to `branch` (§4.5).
pub async fn setup_pipeline_worktree(
    repo_root: &Path,
    pipeline: &str,
    run_id_short: &str,
    branch: &str,
) -> Result<WorktreeHandle, WorktreeError> {
    let root = worktrees_root(repo_root);
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(crate::error::GitError::Spawn)?;
    let path = root.join(format!("{pipeline}-{run_id_short}"));

    if path.exists() {
        if !is_registered_worktree(repo_root, &path).await? {
            return Err(WorktreeError::PathOccupied(path.display().to_string()));
        }
    } else {
        run_git(
            repo_root,
            &[
                "worktree",
                "add",
                path.to_str().unwrap_or_default(),
                branch,
            ],
        )
        .await?;
    }

    Ok(WorktreeHandle {
        worktree_path: path,
        pipeline_branch: branch.to_string(),
    })
}

async fn is_registered_worktree(repo_root: &Path, path: &Path) -> Result<bool, WorktreeError> {
    let listing = list_worktrees(repo_root).await?;
    Ok(listing.iter().any(|w| w == path))
}

/// List every worktree git knows about under this repo (not filtered to
/// pipeline ones — callers that want only pipeline worktrees filter on the
/// `.agent-pipeline/worktrees` path prefix, per [`worktrees_root`]).
pub async fn list_worktrees(repo_root: &Path) -> Result<Vec<PathBuf>, WorktreeError> {
    let out = run_git(repo_root, &["worktree", "list", "--porcelain"]).await?;
    Ok(out
        .lines()
        .filter_map(|l| l.strip_prefix("worktree "))
        .map(PathBuf::from)
        .collect())
}

pub async fn list_pipeline_worktrees(repo_root: &Path) -> Result<Vec<PathBuf>, WorktreeError> {
    let root = worktrees_root(repo_root);
    let all = list_worktrees(repo_root).await?;
    Ok(all.into_iter().filter(|p| p.starts_with(&root)).collect())
}

/// Remove a worktree and optionally delete its branch (§4.5, §4.8).
/// `force` bypasses the dirty-worktree check that `git worktree remove`
/// performs on its own.
pub async fn cleanup_worktree(
    repo_root: &Path,
    path: &Path,
    delete_branch: Option<&str>,
    force: bool,
) -> Result<(), WorktreeError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "worktree already gone; nothing to clean up");
    } else {
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        let path_str = path.to_str().unwrap_or_default();
        args.push(path_str);
        match run_git(repo_root, &args).await {
            Ok(_) => {}
            Err(WorktreeError::Git(crate::error::GitError::CommandFailed { stderr, .. }))
                if !force =>
            {
                return Err(WorktreeError::DirtyWorktree(format!(
                    "{}: {stderr}",
                    path.display()
                )));
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(branch) = delete_branch {
        let flag = if force { "-D" } else { "-d" };
        if let Err(e) = run_git(repo_root, &["branch", flag, branch]).await {
            tracing::warn!(error = %e, branch, "failed to delete pipeline branch during cleanup");
        }
    }
    Ok(())
}

/// Prune stale worktree administrative files (e.g. after a manual `rm -rf`
/// of a worktree directory) — `git worktree prune` (§4.5).
pub async fn prune_worktrees(repo_root: &Path) -> Result<(), WorktreeError> {
    run_git(repo_root, &["worktree", "prune"]).await.map(|_| ())
}
