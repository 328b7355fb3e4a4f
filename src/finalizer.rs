//! Finalizer (§4.8): aggregates run artifacts, lands the pipeline branch
//! according to `git.mergeStrategy`, and always attempts worktree cleanup
//! afterward — merge (or its pull-request equivalent) strictly precedes
//! cleanup, per the ordering invariant in §4.8 step 5.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::MergeStrategy;
use crate::error::{GitError, WorktreeError};
use crate::git::branch::should_delete_on_finalize;
use crate::git::worktree::{self, run_git};
use crate::git::GitManager;
use crate::state::{PipelineState, PullRequestInfo};

/// What a successful [`PullRequestCreator::create`] reports back.
#[derive(Debug, Clone)]
pub struct PullRequestHandle {
    pub url: String,
    pub number: u64,
}

/// Narrow external collaborator for opening a pull request (§4.8 "PR
/// creation contract"). A real GitHub/GitLab-backed implementation lives
/// outside this crate, consumed the same way the runtime adapter is (§1).
#[async_trait]
pub trait PullRequestCreator: Send + Sync {
    async fn create(
        &self,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestHandle, String>;
}

/// The in-process default: logs the request and declines, since this crate
/// ships no real forge integration (§4.8). Sufficient for `local-merge`/
/// `none` strategies and for tests, where no PR is ever requested anyway.
#[derive(Default)]
pub struct NoopPullRequestCreator;

#[async_trait]
impl PullRequestCreator for NoopPullRequestCreator {
    async fn create(
        &self,
        branch: &str,
        base: &str,
        _title: &str,
        _body: &str,
    ) -> Result<PullRequestHandle, String> {
        tracing::warn!(
            branch,
            base,
            "mergeStrategy is pull-request but no PullRequestCreator is configured; skipping"
        );
        Err("no PullRequestCreator configured".to_string())
    }
}

/// Runs the terminal phase of a pipeline run (§4.8).
pub struct Finalizer {
    git: Arc<GitManager>,
    pr_creator: Arc<dyn PullRequestCreator>,
}

impl Finalizer {
    pub fn new(git: Arc<GitManager>, pr_creator: Arc<dyn PullRequestCreator>) -> Self {
        Self { git, pr_creator }
    }

    /// Run the full algorithm in §4.8, mutating and returning `state`.
    pub async fn finalize(
        &self,
        mut state: PipelineState,
        repo_root: &Path,
        worktree_path: &Path,
        branch: &str,
        start: DateTime<Utc>,
        dry_run: bool,
    ) -> PipelineState {
        self.aggregate_artifacts(&mut state, start);

        if dry_run {
            state.artifacts.dry_run = true;
            return state;
        }

        let has_commits = state.stages.iter().any(|s| s.commit_sha.is_some());
        let delete_branch = should_delete_on_finalize(state.pipeline_config.git.branch_strategy);

        // Tracks that the merge step has run to completion before cleanup
        // is attempted; violating this would be an internal bug, not a
        // runtime condition a caller can hit (§4.8 "fails loudly").
        let merge_strategy = state.pipeline_config.git.merge_strategy;
        if has_commits {
            match merge_strategy {
                MergeStrategy::PullRequest => {
                    if let Err(e) = self.open_pull_request(&mut state, branch).await {
                        state.artifacts.finalization_error = Some(e);
                    }
                }
                MergeStrategy::LocalMerge => {
                    let base = state.pipeline_config.git.base_branch.clone();
                    if let Err(e) = local_merge(repo_root, &base, branch).await {
                        state.artifacts.finalization_error = Some(e.to_string());
                    }
                }
                MergeStrategy::None => {}
            }
        }

        // Merge (or its pull-request equivalent) has already run by this
        // point — cleanup below is always the last step (§4.8 step 5).
        let delete_branch_name = delete_branch.then_some(branch);
        match worktree::cleanup_worktree(repo_root, worktree_path, delete_branch_name, false).await
        {
            Ok(()) => {}
            Err(e) => {
                state.artifacts.skip_cleanup_reason = Some(e.to_string());
            }
        }

        state
    }

    /// Step 1 of §4.8: `finalCommit`, `changedFiles`, `totalDuration`.
    fn aggregate_artifacts(&self, state: &mut PipelineState, start: DateTime<Utc>) {
        state.artifacts.final_commit = state
            .stages
            .iter()
            .rev()
            .find_map(|s| s.commit_sha.clone())
            .or_else(|| state.artifacts.initial_commit.clone());

        let mut changed = std::collections::BTreeSet::new();
        for stage in &state.stages {
            changed.extend(stage.changed_files.iter().cloned());
        }
        state.artifacts.changed_files = changed.into_iter().collect();

        let duration_sum: f64 = state.stages.iter().filter_map(|s| s.duration_secs).sum();
        state.artifacts.total_duration_secs = Some(duration_sum);

        let wall_elapsed = (Utc::now() - start).num_milliseconds().max(0) as f64 / 1000.0;
        tracing::debug!(
            run_id = %state.run_id,
            duration_sum,
            wall_elapsed,
            "aggregated finalize artifacts"
        );
    }

    async fn open_pull_request(
        &self,
        state: &mut PipelineState,
        branch: &str,
    ) -> Result<(), String> {
        self.git
            .push(&["-u", "origin", branch])
            .await
            .map_err(|e| e.to_string())?;

        let base = state.pipeline_config.git.base_branch.clone();
        let opts = state.pipeline_config.git.pull_request.clone();
        let title = render_template(&opts.title_template, &state.pipeline_config.name, &state.run_id_short());
        let body = render_template(&opts.body_template, &state.pipeline_config.name, &state.run_id_short());

        let handle = self.pr_creator.create(branch, &base, &title, &body).await?;
        state.artifacts.pull_request = Some(PullRequestInfo {
            url: handle.url,
            number: handle.number,
            branch: branch.to_string(),
        });
        Ok(())
    }
}

fn render_template(template: &str, pipeline: &str, run_id_short: &str) -> String {
    template
        .replace("{{pipeline}}", pipeline)
        .replace("{{run_id}}", run_id_short)
}

/// Check out `base` in the root repository and fast-forward merge `branch`
/// into it (§4.8 `local-merge`). Operates on `repo_root` directly, never
/// the worktree, since the worktree stays bound to the pipeline branch.
async fn local_merge(repo_root: &Path, base: &str, branch: &str) -> Result<(), WorktreeError> {
    run_git(repo_root, &["checkout", base]).await?;
    match run_git(repo_root, &["merge", "--ff-only", branch]).await {
        Ok(_) => Ok(()),
        Err(WorktreeError::Git(GitError::CommandFailed { .. })) => {
            Err(WorktreeError::Git(GitError::NonFastForward(branch.to_string())))
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, TriggerKind};
    use crate::state::{StageExecution, StageStatus, TriggerInfo};
    use std::process::Stdio;
    use uuid::Uuid;

    fn config(merge_strategy: &str) -> PipelineConfig {
        PipelineConfig::from_yaml(&format!(
            "name: demo\nagents:\n  - name: plan\n    agent: a.md\ngit:\n  mergeStrategy: {merge_strategy}\n"
        ))
        .unwrap()
    }

    fn state_with(config: PipelineConfig, stages: Vec<StageExecution>) -> PipelineState {
        let trigger = TriggerInfo {
            kind: TriggerKind::Manual,
            initial_commit: "init".to_string(),
            timestamp: Utc::now(),
        };
        let mut state = PipelineState::new(Uuid::now_v7(), config, trigger);
        state.artifacts.initial_commit = Some("init".to_string());
        state.stages = stages;
        state
    }

    fn success_stage(name: &str, sha: Option<&str>, files: Vec<&str>, secs: f64) -> StageExecution {
        let mut s = StageExecution::pending(name, 0);
        s.status = StageStatus::Success;
        s.commit_sha = sha.map(String::from);
        s.changed_files = files.into_iter().map(String::from).collect();
        s.duration_secs = Some(secs);
        s
    }

    async fn git(args: &[&str], cwd: &Path) {
        let status = tokio::process::Command::new("git")
            .current_dir(cwd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn render_template_substitutes_placeholders() {
        let out = render_template("{{pipeline}} @ {{run_id}}", "demo", "abc12345");
        assert_eq!(out, "demo @ abc12345");
    }

    #[tokio::test]
    async fn dry_run_persists_artifacts_without_touching_the_worktree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(&["init"], root).await;
        let worktree_path = root.join("does-not-exist");

        let state = state_with(
            config("none"),
            vec![success_stage("plan", Some("sha1"), vec!["a.rs"], 1.5)],
        );
        let git_manager = Arc::new(GitManager::new(root.to_path_buf()));
        let finalizer = Finalizer::new(git_manager, Arc::new(NoopPullRequestCreator));

        let result = finalizer
            .finalize(state, root, &worktree_path, "agent-pipeline/demo", Utc::now(), true)
            .await;

        assert!(result.artifacts.dry_run);
        assert_eq!(result.artifacts.final_commit.as_deref(), Some("sha1"));
        assert_eq!(result.artifacts.changed_files, vec!["a.rs".to_string()]);
        assert_eq!(result.artifacts.total_duration_secs, Some(1.5));
    }

    #[tokio::test]
    async fn none_strategy_always_cleans_up_even_with_no_commits() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(&["init"], root).await;
        git(&["config", "user.email", "test@example.com"], root).await;
        git(&["config", "user.name", "test"], root).await;
        tokio::fs::write(root.join("README.md"), "hi\n").await.unwrap();
        git(&["add", "-A"], root).await;
        git(&["commit", "-m", "init"], root).await;
        git(&["branch", "agent-pipeline/demo"], root).await;
        let worktree_path = root.join(".agent-pipeline").join("worktrees").join("demo-abc");
        git(
            &[
                "worktree",
                "add",
                worktree_path.to_str().unwrap(),
                "agent-pipeline/demo",
            ],
            root,
        )
        .await;

        let state = state_with(config("none"), vec![]);
        let git_manager = Arc::new(GitManager::new(worktree_path.clone()));
        let finalizer = Finalizer::new(git_manager, Arc::new(NoopPullRequestCreator));

        let result = finalizer
            .finalize(
                state,
                root,
                &worktree_path,
                "agent-pipeline/demo",
                Utc::now(),
                false,
            )
            .await;

        assert!(!worktree_path.exists());
        assert!(result.artifacts.skip_cleanup_reason.is_none());
    }
}
