//! Branch Manager (§4.4): branch naming by strategy and the pipeline
//! branch setup protocol.

use crate::config::{BranchStrategy, GitSettings};
use crate::error::GitError;
use crate::git::GitManager;

/// Compute the branch name for a pipeline run under the configured
/// [`BranchStrategy`] (§4.4).
pub fn branch_name(git: &GitSettings, pipeline_name: &str, run_id_short: &str) -> String {
    match git.branch_strategy {
        BranchStrategy::Reusable => format!("{}/{}", git.branch_prefix, pipeline_name),
        BranchStrategy::UniquePerRun | BranchStrategy::UniqueAndDelete => {
            format!("{}/{}/{}", git.branch_prefix, pipeline_name, run_id_short)
        }
    }
}

/// Whether the finalizer should delete the branch after merging (§4.4).
pub fn should_delete_on_finalize(strategy: BranchStrategy) -> bool {
    matches!(strategy, BranchStrategy::UniqueAndDelete)
}

/// Runs the setup protocol from §4.4: fetch the remote (non-fatal),
/// checkout-or-create the pipeline branch, and attempt a non-fatal merge
/// of the base branch so the run starts from up-to-date history.
///
/// Operates against the root repository's own checkout, which is only ever
/// touched transiently here: a branch can be checked out in one worktree at
/// a time, and the Worktree Manager (§4.5) is about to attach a linked
/// worktree to `branch`, so this leaves the root checkout back on
/// `settings.baseBranch` before returning.
pub async fn setup_pipeline_branch(
    git_manager: &GitManager,
    settings: &GitSettings,
    branch: &str,
) -> Result<(), GitError> {
    let remote = "origin";
    if let Err(e) = git_manager.fetch(remote).await {
        tracing::warn!(error = %e, "fetch failed; continuing with local refs");
    }

    if git_manager.branch_exists(branch).await? {
        git_manager.checkout(branch).await?;
        let remote_base = format!("{remote}/{}", settings.base_branch);
        if let Err(e) = git_manager.merge(&remote_base).await {
            tracing::warn!(error = %e, branch = %remote_base, "non-fatal merge of base branch failed");
        }
    } else {
        let remote_base = format!("{remote}/{}", settings.base_branch);
        let start_point = if git_manager.branch_exists(&remote_base).await.unwrap_or(false) {
            remote_base
        } else {
            settings.base_branch.clone()
        };
        git_manager.create_branch_from(branch, &start_point).await?;
    }

    if git_manager.get_current_branch().await.ok().as_deref() != Some(settings.base_branch.as_str())
    {
        git_manager.checkout(&settings.base_branch).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitSettings;

    fn settings(strategy: BranchStrategy) -> GitSettings {
        GitSettings {
            branch_strategy: strategy,
            ..GitSettings::default()
        }
    }

    #[test]
    fn reusable_strategy_ignores_run_id() {
        let s = settings(BranchStrategy::Reusable);
        assert_eq!(branch_name(&s, "demo", "abc12345"), "agent-pipeline/demo");
    }

    #[test]
    fn unique_per_run_includes_short_run_id() {
        let s = settings(BranchStrategy::UniquePerRun);
        assert_eq!(
            branch_name(&s, "demo", "abc12345"),
            "agent-pipeline/demo/abc12345"
        );
    }

    #[test]
    fn only_unique_and_delete_deletes_on_finalize() {
        assert!(!should_delete_on_finalize(BranchStrategy::Reusable));
        assert!(!should_delete_on_finalize(BranchStrategy::UniquePerRun));
        assert!(should_delete_on_finalize(BranchStrategy::UniqueAndDelete));
    }

    async fn git(args: &[&str], cwd: &std::path::Path) {
        let status = tokio::process::Command::new("git")
            .current_dir(cwd)
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    #[tokio::test]
    async fn leaves_the_root_checkout_on_base_so_a_worktree_can_attach_the_new_branch() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(&["init", "-b", "main"], root).await;
        git(&["config", "user.email", "test@example.com"], root).await;
        git(&["config", "user.name", "test"], root).await;
        tokio::fs::write(root.join("README.md"), "hi\n").await.unwrap();
        git(&["add", "-A"], root).await;
        git(&["commit", "-m", "init"], root).await;

        let git_manager = GitManager::new(root.to_path_buf());
        let gs = settings(BranchStrategy::UniquePerRun);
        setup_pipeline_branch(&git_manager, &gs, "agent-pipeline/demo/abc12345")
            .await
            .unwrap();

        assert_eq!(git_manager.get_current_branch().await.unwrap(), "main");
        assert!(git_manager
            .branch_exists("agent-pipeline/demo/abc12345")
            .await
            .unwrap());
    }
}
