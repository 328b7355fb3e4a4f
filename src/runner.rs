//! Pipeline Runner (§4.7): the coordinator. Owns the run's `PipelineState`
//! and drives it through validation, branch/worktree setup, wave-by-wave
//! stage dispatch with bounded parallelism, and handoff to the
//! [`crate::finalizer::Finalizer`].
//!
//! Wave dispatch bounds the number of concurrently in-flight stages to
//! `execution.concurrencyLimit` using `tokio::task::JoinSet`, draining a
//! completed task before spawning the next queued one rather than spawning
//! the whole wave at once (§5 "within a wave, all dispatched stages proceed
//! independently up to `concurrencyLimit`").

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{FailureStrategy, PipelineConfig};
use crate::error::Error;
use crate::events::{Event, EventLog, EventSink};
use crate::executor::StageExecutor;
use crate::finalizer::{Finalizer, PullRequestCreator};
use crate::git::branch;
use crate::git::worktree;
use crate::git::GitManager;
use crate::output::OutputSink;
use crate::plan;
use crate::runtime::RuntimeRegistry;
use crate::state::{
    PipelineState, RunStatus, StageErrorRecord, StageExecution, StageStatus, StateStore,
    TriggerInfo,
};

/// Per-run knobs the CLI front-end (out of scope, §1) collects from the
/// user and hands to the engine.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
}

/// The coordinator (§4.7). Cheap to construct once per process and reused
/// across runs; everything it holds is an `Arc` or owned configuration.
pub struct PipelineRunner {
    repo_root: PathBuf,
    runtimes: Arc<RuntimeRegistry>,
    output_sink: Arc<dyn OutputSink>,
    event_sink: Arc<dyn EventSink>,
    pr_creator: Arc<dyn PullRequestCreator>,
}

impl PipelineRunner {
    pub fn new(
        repo_root: PathBuf,
        runtimes: Arc<RuntimeRegistry>,
        output_sink: Arc<dyn OutputSink>,
        event_sink: Arc<dyn EventSink>,
        pr_creator: Arc<dyn PullRequestCreator>,
    ) -> Self {
        Self {
            repo_root,
            runtimes,
            output_sink,
            event_sink,
            pr_creator,
        }
    }

    /// Run `config` to completion (or until cancelled), returning the
    /// terminal `PipelineState` (§4.7 steps 1-7).
    pub async fn run(
        &self,
        config: PipelineConfig,
        trigger: TriggerInfo,
        options: RunOptions,
        cancellation: CancellationToken,
    ) -> Result<PipelineState, Error> {
        // Step 1: validate. Any validation error aborts before any stage
        // runs and before a state file is ever written (§4.1 "Failure
        // semantics", §7 "ConfigError ... no state file written").
        let report = plan::validate(&config);
        if !report.is_ok() {
            return Err(Error::Config(
                report
                    .errors
                    .into_iter()
                    .next()
                    .expect("is_ok() false implies a non-empty errors vec"),
            ));
        }
        for warning in &report.warnings {
            tracing::warn!(pipeline = %config.name, %warning, "pipeline validation warning");
        }
        let exec_plan = plan::build_execution_plan(&config)?;

        // Step 2: allocate runId, seed state.
        let run_id = Uuid::now_v7();
        let mut state = PipelineState::new(run_id, config.clone(), trigger);
        let event_log = EventLog::new(&self.repo_root, run_id);
        let state_store = StateStore::new(&self.repo_root);

        self.emit(
            &event_log,
            Event::PipelineStarted {
                run_id,
                pipeline: config.name.clone(),
            },
        )
        .await;

        // Step 3: branch + worktree setup.
        let run_id_short = state.run_id_short();
        let branch_name = branch::branch_name(&config.git, &config.name, &run_id_short);
        let root_git = GitManager::new(self.repo_root.clone());
        branch::setup_pipeline_branch(&root_git, &config.git, &branch_name).await?;
        let handle =
            worktree::setup_pipeline_worktree(&self.repo_root, &config.name, &run_id_short, &branch_name)
                .await?;
        let worktree_git = Arc::new(GitManager::new(handle.worktree_path.clone()));
        state.artifacts.initial_commit = Some(worktree_git.get_current_commit().await?);

        // Step 4: running.
        state.status = RunStatus::Running;
        state_store.save(&state).await?;

        let executor = StageExecutor::new(worktree_git.clone(), self.runtimes.clone(), self.output_sink.clone());
        let start = Utc::now();
        let mut stopped_early = false;
        let mut aborted = false;

        'waves: for (wave_index, wave) in exec_plan.waves.iter().enumerate() {
            if cancellation.is_cancelled() {
                aborted = true;
                break 'waves;
            }

            let runnable = self.gate_wave(&config, &mut state, wave, &event_log).await;
            if runnable.is_empty() {
                continue;
            }

            let concurrency_limit = config
                .execution
                .concurrency_limit
                .unwrap_or(runnable.len())
                .max(1);

            let wave_outcome = self
                .dispatch_wave(
                    &executor,
                    &config,
                    &state,
                    runnable,
                    concurrency_limit,
                    &run_id.to_string(),
                    &event_log,
                    cancellation.clone(),
                )
                .await;

            for record in wave_outcome.records {
                self.apply_stage_result(&mut state, record, &event_log).await;
            }
            state_store.save(&state).await?;

            // A stage's effective failure strategy (stage `onFail` override,
            // else pipeline `settings.failureStrategy`, §7) decides whether
            // this failure halts the run (§4.7 step 5d).
            let wave_should_stop = wave_outcome.failed_stage_names.iter().any(|name| {
                let stage_cfg = config.stage(name).expect("wave stage exists in config");
                config.failure_strategy_for(stage_cfg) == FailureStrategy::Stop
            });

            if wave_outcome.cancelled {
                aborted = true;
                break 'waves;
            }

            if wave_should_stop {
                stopped_early = true;
                self.skip_remaining(&mut state, &exec_plan.waves, wave_index, &event_log)
                    .await;
                break 'waves;
            }
        }

        // Step 6: compute final status.
        state.status = if aborted {
            RunStatus::Aborted
        } else if stopped_early {
            RunStatus::Failed
        } else {
            let any_failed = state.stages.iter().any(|s| s.status == StageStatus::Failed);
            let any_success = state.stages.iter().any(|s| s.status == StageStatus::Success);
            match (any_failed, any_success) {
                (false, _) => RunStatus::Completed,
                (true, true) => RunStatus::Partial,
                (true, false) => RunStatus::Failed,
            }
        };

        match state.status {
            RunStatus::Aborted => {
                self.emit(&event_log, Event::PipelineAborted { run_id }).await;
            }
            RunStatus::Completed => {
                self.emit(
                    &event_log,
                    Event::PipelineCompleted {
                        run_id,
                        status: "completed".to_string(),
                    },
                )
                .await;
            }
            _ => {
                self.emit(
                    &event_log,
                    Event::PipelineFailed {
                        run_id,
                        status: status_label(state.status),
                    },
                )
                .await;
            }
        }
        state_store.save(&state).await?;

        // Step 7: hand off to the Finalizer.
        let finalizer = Finalizer::new(worktree_git, self.pr_creator.clone());
        let state = finalizer
            .finalize(
                state,
                &self.repo_root,
                &handle.worktree_path,
                &branch_name,
                start,
                options.dry_run,
            )
            .await;

        if let Some(pr) = &state.artifacts.pull_request {
            self.emit(
                &event_log,
                Event::PrCreated {
                    run_id,
                    url: pr.url.clone(),
                },
            )
            .await;
        }
        state_store.save(&state).await?;

        Ok(state)
    }

    /// §4.7 step 5a: mark stages whose dependencies are not all successful
    /// as skipped ("dependency failed"), unless the stage's effective
    /// failure strategy is `continue` or `warn`, in which case they still
    /// run — `warn` additionally publishes a [`Event::StageWarning`] (§7
    /// "`warn` is equivalent to `continue` plus an event").
    async fn gate_wave(
        &self,
        config: &PipelineConfig,
        state: &mut PipelineState,
        wave: &[String],
        event_log: &EventLog,
    ) -> Vec<String> {
        let mut runnable = Vec::new();
        for name in wave {
            let stage_cfg = config.stage(name).expect("planned stage exists in config");
            let deps_satisfied = stage_cfg
                .depends_on
                .iter()
                .all(|dep| state.stage(dep).is_some_and(|s| s.status.is_success()));

            if deps_satisfied {
                runnable.push(name.clone());
                continue;
            }

            let effective_strategy = config.failure_strategy_for(stage_cfg);
            if effective_strategy == FailureStrategy::Warn {
                runnable.push(name.clone());
                self.emit(
                    event_log,
                    Event::StageWarning {
                        run_id: state.run_id,
                        stage: name.clone(),
                        message: "running despite a failed dependency".to_string(),
                    },
                )
                .await;
                continue;
            }
            if effective_strategy == FailureStrategy::Continue {
                runnable.push(name.clone());
                continue;
            }

            if let Some(record) = state.stage_mut(name) {
                record.mark_skipped(None);
                record.error = Some(StageErrorRecord::from_message("dependency failed"));
            }
            self.emit(
                event_log,
                Event::StageCompleted {
                    run_id: state.run_id,
                    stage: name.clone(),
                    status: "skipped".to_string(),
                },
            )
            .await;
        }
        runnable
    }

    /// Dispatch `runnable` stage names with at most `concurrency_limit`
    /// in flight at once, draining a finished task before spawning the
    /// next queued one (§5, §9 "Runtime adapter polymorphism" concurrency
    /// note).
    async fn dispatch_wave(
        &self,
        executor: &StageExecutor,
        config: &PipelineConfig,
        state: &PipelineState,
        runnable: Vec<String>,
        concurrency_limit: usize,
        run_id: &str,
        event_log: &EventLog,
        cancellation: CancellationToken,
    ) -> WaveOutcome {
        let state_value = state.to_value();
        let changed_so_far: Vec<String> = state
            .stages
            .iter()
            .flat_map(|s| s.changed_files.iter().cloned())
            .collect();

        let mut queue: VecDeque<String> = runnable.into_iter().collect();
        let mut join_set = tokio::task::JoinSet::new();
        let mut records = Vec::new();
        let mut failed_stage_names = Vec::new();
        let mut cancelled = false;

        for _ in 0..concurrency_limit {
            self.spawn_next_stage(
                &mut queue,
                &mut join_set,
                executor,
                config,
                state,
                &state_value,
                &changed_so_far,
                run_id,
                event_log,
                &cancellation,
            )
            .await;
        }

        while let Some(joined) = join_set.join_next().await {
            let record = match joined {
                Ok(record) => record,
                Err(join_err) => {
                    tracing::error!(error = %join_err, "stage task panicked");
                    cancelled = cancelled || cancellation.is_cancelled();
                    continue;
                }
            };
            if record.status == StageStatus::Failed {
                failed_stage_names.push(record.stage_name.clone());
            }
            records.push(record);
            self.spawn_next_stage(
                &mut queue,
                &mut join_set,
                executor,
                config,
                state,
                &state_value,
                &changed_so_far,
                run_id,
                event_log,
                &cancellation,
            )
            .await;
        }

        if cancellation.is_cancelled() {
            cancelled = true;
        }

        WaveOutcome {
            records,
            failed_stage_names,
            cancelled,
        }
    }

    /// Pop the next queued stage name and spawn its execution onto
    /// `join_set`, publishing `stage.started` (§4.7 "Events emitted")
    /// before handing it to the executor.
    #[allow(clippy::too_many_arguments)]
    async fn spawn_next_stage(
        &self,
        queue: &mut VecDeque<String>,
        join_set: &mut tokio::task::JoinSet<StageExecution>,
        executor: &StageExecutor,
        config: &PipelineConfig,
        state: &PipelineState,
        state_value: &serde_json::Value,
        changed_so_far: &[String],
        run_id: &str,
        event_log: &EventLog,
        cancellation: &CancellationToken,
    ) {
        let Some(name) = queue.pop_front() else { return };
        let stage = config.stage(&name).expect("queued stage exists in config").clone();
        let known_stages = transitive_deps(config, &name);
        let record = state
            .stage(&name)
            .cloned()
            .unwrap_or_else(|| StageExecution::pending(&name, stage.retry.as_ref().map(|r| r.max_attempts.saturating_sub(1)).unwrap_or(0)));

        self.emit(
            event_log,
            Event::StageStarted {
                run_id: state.run_id,
                stage: name.clone(),
            },
        )
        .await;

        let executor = executor.clone();
        let pipeline_config = config.clone();
        let run_id = run_id.to_string();
        let state_value = state_value.clone();
        let changed_so_far = changed_so_far.to_vec();
        let cancellation = cancellation.clone();
        join_set.spawn(async move {
            executor
                .execute(
                    &stage,
                    &pipeline_config,
                    record,
                    &run_id,
                    &known_stages,
                    &state_value,
                    &changed_so_far,
                    cancellation,
                )
                .await
        });
    }

    async fn apply_stage_result(
        &self,
        state: &mut PipelineState,
        record: StageExecution,
        event_log: &EventLog,
    ) {
        let event = match record.status {
            StageStatus::Failed => Event::StageFailed {
                run_id: state.run_id,
                stage: record.stage_name.clone(),
                message: record
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_default(),
            },
            _ => Event::StageCompleted {
                run_id: state.run_id,
                stage: record.stage_name.clone(),
                status: status_label_stage(record.status),
            },
        };
        if let Some(slot) = state.stage_mut(&record.stage_name) {
            *slot = record;
        } else {
            state.stages.push(record);
        }
        self.emit(event_log, event).await;
    }

    /// §4.7 step 5d: once a wave triggers a stop, every stage in the
    /// remaining waves (not just the rest of the current one) is skipped.
    async fn skip_remaining(
        &self,
        state: &mut PipelineState,
        waves: &[Vec<String>],
        from_wave: usize,
        event_log: &EventLog,
    ) {
        for wave in &waves[from_wave + 1..] {
            for name in wave {
                if let Some(record) = state.stage_mut(name)
                    && record.status == StageStatus::Pending
                {
                    record.mark_skipped(None);
                    record.error = Some(StageErrorRecord::from_message("pipeline stopped"));
                    self.emit(
                        event_log,
                        Event::StageCompleted {
                            run_id: state.run_id,
                            stage: name.clone(),
                            status: "skipped".to_string(),
                        },
                    )
                    .await;
                }
            }
        }
    }

    async fn emit(&self, event_log: &EventLog, event: Event) {
        if let Err(e) = event_log.append(&event).await {
            tracing::warn!(error = %e, "failed to append to run event log");
        }
        self.event_sink.publish(event).await;
    }
}

struct WaveOutcome {
    records: Vec<StageExecution>,
    failed_stage_names: Vec<String>,
    cancelled: bool,
}

/// A stage's transitive `dependsOn` closure (§4.2, §5 "ordering guarantees"):
/// the set of stages whose `extractedData`/`commitSha` this stage may
/// observe and whose conditions it may reference without a hard error.
fn transitive_deps(config: &PipelineConfig, stage_name: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    if let Some(stage) = config.stage(stage_name) {
        queue.extend(stage.depends_on.iter().cloned());
    }
    while let Some(name) = queue.pop_front() {
        if seen.insert(name.clone())
            && let Some(stage) = config.stage(&name)
        {
            queue.extend(stage.depends_on.iter().cloned());
        }
    }
    seen.into_iter().collect()
}

fn status_label(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Partial => "partial",
        RunStatus::Aborted => "aborted",
    }
    .to_string()
}

fn status_label_stage(status: StageStatus) -> String {
    match status {
        StageStatus::Pending => "pending",
        StageStatus::Running => "running",
        StageStatus::Success => "success",
        StageStatus::Failed => "failed",
        StageStatus::Skipped => "skipped",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BufferingEventSink;
    use crate::finalizer::NoopPullRequestCreator;
    use crate::output::InMemoryOutputSink;
    use crate::runtime::{Capabilities, ExecuteRequest, ExecuteResponse, RuntimeAdapter, ValidationResult};
    use async_trait::async_trait;
    use std::process::Stdio;

    struct EchoRuntime;

    #[async_trait]
    impl RuntimeAdapter for EchoRuntime {
        async fn execute(
            &self,
            _request: ExecuteRequest,
            _cancellation: CancellationToken,
        ) -> Result<ExecuteResponse, crate::error::RuntimeError> {
            Ok(ExecuteResponse {
                text_output: "done".to_string(),
                token_usage: None,
                num_turns: Some(1),
                extracted_data: None,
                provider: Some("test".to_string()),
                model: None,
            })
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }

        async fn validate(&self) -> ValidationResult {
            ValidationResult::default()
        }
    }

    struct FailingRuntime;

    #[async_trait]
    impl RuntimeAdapter for FailingRuntime {
        async fn execute(
            &self,
            _request: ExecuteRequest,
            _cancellation: CancellationToken,
        ) -> Result<ExecuteResponse, crate::error::RuntimeError> {
            Err(crate::error::RuntimeError::Execution {
                runtime: "test".to_string(),
                message: "401 unauthorized".to_string(),
            })
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }

        async fn validate(&self) -> ValidationResult {
            ValidationResult::default()
        }
    }

    async fn git(args: &[&str], cwd: &std::path::Path) {
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

    async fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(&["init", "-b", "main"], root).await;
        git(&["config", "user.email", "test@example.com"], root).await;
        git(&["config", "user.name", "test"], root).await;
        tokio::fs::create_dir_all(root.join("agents")).await.unwrap();
        tokio::fs::write(root.join("agents/plan.md"), "You are a planner.\n")
            .await
            .unwrap();
        tokio::fs::write(root.join("agents/implement.md"), "You implement.\n")
            .await
            .unwrap();
        git(&["add", "-A"], root).await;
        git(&["commit", "-m", "init"], root).await;
        dir
    }

    fn runtimes(kind: &str, adapter: impl Fn() -> Arc<dyn RuntimeAdapter> + Send + Sync + 'static) -> Arc<RuntimeRegistry> {
        let mut registry = RuntimeRegistry::default();
        registry.register(kind, move |_| adapter());
        Arc::new(registry)
    }

    #[tokio::test]
    async fn two_independent_stages_complete_and_merge_locally() {
        let dir = init_repo().await;
        let config = PipelineConfig::from_yaml(
            r#"
name: demo
agents:
  - name: a
    agent: agents/plan.md
    runtime: { type: test }
  - name: b
    agent: agents/implement.md
    runtime: { type: test }
git:
  mergeStrategy: local-merge
  branchStrategy: unique-and-delete
"#,
        )
        .unwrap();

        let runner = PipelineRunner::new(
            dir.path().to_path_buf(),
            runtimes("test", || Arc::new(EchoRuntime) as Arc<dyn RuntimeAdapter>),
            Arc::new(InMemoryOutputSink::new()),
            Arc::new(BufferingEventSink::new()),
            Arc::new(NoopPullRequestCreator),
        );
        let trigger = TriggerInfo {
            kind: crate::config::TriggerKind::Manual,
            initial_commit: "init".to_string(),
            timestamp: Utc::now(),
        };

        let state = runner
            .run(config, trigger, RunOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        assert!(state.stages.iter().all(|s| s.status == StageStatus::Success));

        let worktrees_dir = dir.path().join(".agent-pipeline").join("worktrees");
        let leftover = std::fs::read_dir(&worktrees_dir)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftover, 0, "pipeline worktree was not cleaned up");
    }

    #[tokio::test]
    async fn failing_stage_with_stop_strategy_skips_dependents() {
        let dir = init_repo().await;
        let config = PipelineConfig::from_yaml(
            r#"
name: demo
agents:
  - name: a
    agent: agents/plan.md
    runtime: { type: test }
  - name: b
    agent: agents/implement.md
    dependsOn: [a]
    runtime: { type: fail }
  - name: c
    agent: agents/implement.md
    dependsOn: [b]
    runtime: { type: test }
git:
  mergeStrategy: none
"#,
        )
        .unwrap();

        let mut registry = RuntimeRegistry::default();
        registry.register("test", |_| Arc::new(EchoRuntime) as Arc<dyn RuntimeAdapter>);
        registry.register("fail", |_| Arc::new(FailingRuntime) as Arc<dyn RuntimeAdapter>);

        let runner = PipelineRunner::new(
            dir.path().to_path_buf(),
            Arc::new(registry),
            Arc::new(InMemoryOutputSink::new()),
            Arc::new(BufferingEventSink::new()),
            Arc::new(NoopPullRequestCreator),
        );
        let trigger = TriggerInfo {
            kind: crate::config::TriggerKind::Manual,
            initial_commit: "init".to_string(),
            timestamp: Utc::now(),
        };

        let state = runner
            .run(config, trigger, RunOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.stage("a").unwrap().status, StageStatus::Success);
        assert_eq!(state.stage("b").unwrap().status, StageStatus::Failed);
        assert_eq!(state.stage("c").unwrap().status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn dependent_with_on_fail_warn_still_runs_and_publishes_a_warning() {
        let dir = init_repo().await;
        let config = PipelineConfig::from_yaml(
            r#"
name: demo
settings:
  failureStrategy: continue
agents:
  - name: a
    agent: agents/plan.md
    runtime: { type: fail }
  - name: b
    agent: agents/implement.md
    dependsOn: [a]
    onFail: warn
    runtime: { type: test }
git:
  mergeStrategy: none
"#,
        )
        .unwrap();

        let mut registry = RuntimeRegistry::default();
        registry.register("test", |_| Arc::new(EchoRuntime) as Arc<dyn RuntimeAdapter>);
        registry.register("fail", |_| Arc::new(FailingRuntime) as Arc<dyn RuntimeAdapter>);

        let sink = Arc::new(BufferingEventSink::new());
        let runner = PipelineRunner::new(
            dir.path().to_path_buf(),
            Arc::new(registry),
            Arc::new(InMemoryOutputSink::new()),
            sink.clone(),
            Arc::new(NoopPullRequestCreator),
        );
        let trigger = TriggerInfo {
            kind: crate::config::TriggerKind::Manual,
            initial_commit: "init".to_string(),
            timestamp: Utc::now(),
        };

        let state = runner
            .run(config, trigger, RunOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        // `b` is not skipped as "dependency failed" — `warn` runs it like
        // `continue` would, unlike the `stop`-gated scenario above.
        assert_eq!(state.stage("a").unwrap().status, StageStatus::Failed);
        assert_eq!(state.stage("b").unwrap().status, StageStatus::Success);

        let events = sink.events().await;
        assert!(events.iter().any(|e| matches!(e, Event::StageWarning { stage, .. } if stage == "b")));
        assert!(events.iter().any(|e| matches!(e, Event::StageStarted { stage, .. } if stage == "a")));
        assert!(events.iter().any(|e| matches!(e, Event::StageStarted { stage, .. } if stage == "b")));
    }

    #[test]
    fn transitive_deps_follows_the_whole_chain() {
        let config = PipelineConfig::from_yaml(
            r#"
name: x
agents:
  - name: a
    agent: a.md
  - name: b
    agent: b.md
    dependsOn: [a]
  - name: c
    agent: c.md
    dependsOn: [b]
"#,
        )
        .unwrap();
        let mut deps = transitive_deps(&config, "c");
        deps.sort();
        assert_eq!(deps, vec!["a".to_string(), "b".to_string()]);
    }
}
