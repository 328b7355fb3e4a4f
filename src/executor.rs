//! Stage Executor (§4.6): runs exactly one stage — evaluate its condition,
//! assemble the prompt, invoke the runtime adapter through the Retry
//! Handler under a timeout, harvest outputs, and (if configured) commit the
//! resulting worktree changes. Always returns a `StageExecution`; failures
//! are carried in the record rather than thrown, per §4.6's output
//! contract.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent;
use crate::condition;
use crate::config::{AgentStage, PermissionMode, PipelineConfig};
use crate::error::{Classification, RuntimeError};
use crate::git::GitManager;
use crate::output::{self, OutputSink};
use crate::retry::{execute_with_retry, Attempt};
use crate::runtime::{ExecuteRequest, RuntimeRegistry};
use crate::state::{Provenance, StageErrorRecord, StageExecution, StageStatus};

/// Runs one stage against a fixed worktree, git manager, and runtime
/// registry. Cheap to clone (everything it owns is an `Arc`), so the
/// Pipeline Runner hands one instance to every spawned task in a wave.
#[derive(Clone)]
pub struct StageExecutor {
    git: Arc<GitManager>,
    runtimes: Arc<RuntimeRegistry>,
    output_sink: Arc<dyn OutputSink>,
}

impl StageExecutor {
    pub fn new(
        git: Arc<GitManager>,
        runtimes: Arc<RuntimeRegistry>,
        output_sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            git,
            runtimes,
            output_sink,
        }
    }

    /// Execute `stage`, folding the outcome into `record` (a pending
    /// `StageExecution` cloned from the run's state by the caller).
    ///
    /// `known_stages` is the stage's transitive `dependsOn` closure, used
    /// both for condition evaluation (§4.2) and for selecting which prior
    /// stages' `extractedData` is visible to the prompt (§5 "ordering
    /// guarantees"). `state_value` is `PipelineState::to_value()` taken at
    /// the start of the wave.
    pub async fn execute(
        &self,
        stage: &AgentStage,
        pipeline_config: &PipelineConfig,
        mut record: StageExecution,
        run_id: &str,
        known_stages: &[String],
        state_value: &Value,
        changed_files_so_far: &[String],
        cancellation: CancellationToken,
    ) -> StageExecution {
        record.mark_running();

        if let Some(expr) = &stage.condition {
            match condition::evaluate(expr, state_value, known_stages) {
                Ok(true) => {}
                Ok(false) => {
                    record.mark_skipped(Some(false));
                    return record;
                }
                Err(e) => return self.fail(record, e.to_string()),
            }
        }

        let agent_path = agent::resolve_agent_path(self.git.worktree(), &stage.agent);
        let definition = match agent::load_agent_definition(&agent_path).await {
            Ok(d) => d,
            Err(e) => return self.fail(record, e.to_string()),
        };

        let runtime_settings = stage.runtime.as_ref().unwrap_or(&pipeline_config.runtime);
        let runtime = match self.runtimes.build(runtime_settings) {
            Ok(r) => r,
            Err(e) => return self.fail(record, e.to_string()),
        };

        let user_prompt =
            assemble_prompt(stage, known_stages, state_value, changed_files_so_far);
        let permission_mode = permission_mode_str(&pipeline_config.settings.permission_mode);
        let timeout = stage.timeout();

        let outcome = execute_with_retry(
            stage.retry.as_ref(),
            |e: &RuntimeError| Classification::of(e),
            |_attempt| {
                let request = ExecuteRequest {
                    system_prompt: definition.system_prompt.clone(),
                    user_prompt: user_prompt.clone(),
                    options: Default::default(),
                    permission_mode: permission_mode.to_string(),
                    timeout,
                };
                let runtime = runtime.clone();
                let cancellation = cancellation.clone();
                async move {
                    match tokio::time::timeout(timeout, runtime.execute(request, cancellation)).await
                    {
                        Ok(Ok(response)) => Attempt::Ok(response),
                        Ok(Err(e)) => Attempt::Err(e),
                        Err(_elapsed) => Attempt::Err(RuntimeError::Timeout(timeout.as_secs())),
                    }
                }
            },
            |attempt, delay| {
                record.retry_attempt = attempt + 1;
                tracing::warn!(
                    stage = %stage.name,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "retrying stage after a retryable failure"
                );
            },
        )
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(RuntimeError::Cancelled) => return self.fail(record, "cancelled".to_string()),
            Err(e) => return self.fail(record, e.to_string()),
        };

        record.agent_output = Some(response.text_output);
        let mut extracted = response.extracted_data.unwrap_or_default();
        if let Some(reported) = self.output_sink.take(&stage.name).await {
            extracted.extend(reported);
        }
        let missing = output::missing_keys(&stage.output_keys, &extracted);
        if !missing.is_empty() {
            tracing::info!(stage = %stage.name, missing = ?missing, "agent did not report every expected output key");
        }
        record.extracted_data = extracted;
        record.provenance = Some(Provenance {
            provider: response.provider,
            model: response.model,
            parameters: Default::default(),
            token_usage: response.token_usage,
        });

        if pipeline_config.settings.auto_commit {
            if let Err(e) = self.commit_if_dirty(stage, pipeline_config, run_id, &mut record).await {
                return self.fail(record, e.to_string());
            }
        }

        record.finish(StageStatus::Success);
        record
    }

    async fn commit_if_dirty(
        &self,
        stage: &AgentStage,
        pipeline_config: &PipelineConfig,
        run_id: &str,
        record: &mut StageExecution,
    ) -> Result<(), crate::error::GitError> {
        if !self.git.has_uncommitted_changes().await? {
            return Ok(());
        }
        let before = self.git.get_current_commit().await?;
        let sha = self
            .git
            .create_pipeline_commit(&stage.name, &pipeline_config.settings, run_id)
            .await?;
        if sha.is_empty() {
            return Ok(());
        }
        let prefix = crate::git::expand_commit_prefix(pipeline_config, &stage.name);
        record.commit_sha = Some(sha.clone());
        record.commit_message = Some(format!(
            "{prefix} Apply {} changes\n\nAgent-Pipeline: true\nPipeline-Run-ID: {run_id}\nPipeline-Stage: {}",
            stage.name, stage.name
        ));
        record.changed_files = self.git.get_changed_files(&before, &sha).await?;
        Ok(())
    }

    fn fail(&self, mut record: StageExecution, message: String) -> StageExecution {
        record.error = Some(StageErrorRecord::from_message(message));
        record.finish(StageStatus::Failed);
        record
    }
}

fn permission_mode_str(mode: &PermissionMode) -> &'static str {
    match mode {
        PermissionMode::Default => "default",
        PermissionMode::AcceptEdits => "acceptEdits",
        PermissionMode::BypassPermissions => "bypassPermissions",
        PermissionMode::Plan => "plan",
    }
}

/// Assemble the user prompt (§4.6 step 3): prior stages' `extractedData`
/// restricted to `known_stages`, the names of files changed so far, and the
/// expected-output-key instruction block.
fn assemble_prompt(
    stage: &AgentStage,
    known_stages: &[String],
    state_value: &Value,
    changed_files_so_far: &[String],
) -> String {
    let mut sections = Vec::new();

    let mut prior = serde_json::Map::new();
    for name in known_stages {
        if let Some(data) = stage_extracted_data(state_value, name) {
            if data.as_object().is_some_and(|m| !m.is_empty()) {
                prior.insert(name.clone(), data.clone());
            }
        }
    }
    if !prior.is_empty() {
        sections.push(format!(
            "Prior stage outputs:\n{}",
            serde_json::to_string_pretty(&prior).unwrap_or_default()
        ));
    }

    if !changed_files_so_far.is_empty() {
        sections.push(format!(
            "Files changed so far:\n{}",
            changed_files_so_far.join("\n")
        ));
    }

    let instructions = output::render_output_instructions(&stage.output_keys);
    if !instructions.is_empty() {
        sections.push(instructions);
    }

    sections.join("\n\n")
}

fn stage_extracted_data<'a>(state_value: &'a Value, name: &str) -> Option<&'a Value> {
    state_value
        .get("stages")?
        .as_array()?
        .iter()
        .find(|s| s.get("stageName").and_then(Value::as_str) == Some(name))
        .and_then(|s| s.get("extractedData"))
}
