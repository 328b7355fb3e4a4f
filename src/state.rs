//! `PipelineState` / `StageExecution` and atomic JSON persistence (§3, §8 State Manager).
//!
//! State is written to `<repo>/.agent-pipeline/state/runs/<runId>.json` after
//! every stage completion and on every top-level status transition. Writes
//! go through a temp-file-then-rename so a reader never observes a partial
//! file (§5 "atomic write via write-to-temp-then-rename"), mirroring the
//! teacher's own defensive I/O style in `internal/pack/wrapper.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{PipelineConfig, TriggerKind};
use crate::error::Error;

/// Terminal and in-flight states of a whole run (§3 `PipelineState.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
    Aborted,
}

impl RunStatus {
    /// Exit code contract (§6): 0 completed, 1 failed/validation, 130 aborted.
    /// `Partial` is surfaced like `Failed` to a caller expecting a shell
    /// exit code, since at least one stage did not succeed.
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::Aborted => 130,
            RunStatus::Pending | RunStatus::Running => {
                unreachable!("exit_code queried before the run reached a terminal status")
            }
            RunStatus::Failed | RunStatus::Partial => 1,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Partial | RunStatus::Aborted
        )
    }
}

/// Per-stage execution status (§3 `StageExecution.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Whether a dependent may treat this stage as satisfied for gating
    /// purposes (§4.2: skipped is a non-success for gating unless
    /// configured otherwise — this engine does not expose that override).
    pub fn is_success(self) -> bool {
        matches!(self, StageStatus::Success)
    }
}

/// Token usage reported by a runtime adapter, when it reports one (§3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Provenance captured per stage: provider/model identity and usage,
/// the engine's scoped-down analogue of the teacher's `Provenance` object
/// (§3 "ambient addition"). No separate object store — just the data shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub parameters: serde_json::Map<String, Value>,
    pub token_usage: Option<TokenUsage>,
}

/// A captured error in a `StageExecution`, always carrying a message and,
/// where classifiable, a suggestion (§7 "User-visible behavior").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageErrorRecord {
    pub message: String,
    pub suggestion: Option<String>,
    pub stack: Option<String>,
}

impl StageErrorRecord {
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let suggestion = crate::error::Classification::suggest(&message);
        Self {
            message,
            suggestion,
            stack: None,
        }
    }
}

/// One stage's execution record (§3 `StageExecution`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageExecution {
    pub stage_name: String,
    pub status: StageStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub retry_attempt: u32,
    pub max_retries: u32,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub agent_output: Option<String>,
    pub extracted_data: HashMap<String, Value>,
    pub changed_files: Vec<String>,
    pub provenance: Option<Provenance>,
    pub error: Option<StageErrorRecord>,
    pub condition_evaluated: bool,
    pub condition_result: Option<bool>,
}

impl StageExecution {
    pub fn pending(stage_name: impl Into<String>, max_retries: u32) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Pending,
            start_time: None,
            end_time: None,
            duration_secs: None,
            retry_attempt: 0,
            max_retries,
            commit_sha: None,
            commit_message: None,
            agent_output: None,
            extracted_data: HashMap::new(),
            changed_files: Vec::new(),
            provenance: None,
            error: None,
            condition_evaluated: false,
            condition_result: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = StageStatus::Running;
        self.start_time = Some(Utc::now());
    }

    pub fn mark_skipped(&mut self, condition_result: Option<bool>) {
        self.status = StageStatus::Skipped;
        self.condition_evaluated = condition_result.is_some();
        self.condition_result = condition_result;
        self.end_time = self.end_time.or(self.start_time).or(Some(Utc::now()));
        self.duration_secs = Some(0.0);
    }

    pub fn finish(&mut self, status: StageStatus) {
        debug_assert!(matches!(
            status,
            StageStatus::Success | StageStatus::Failed | StageStatus::Skipped
        ));
        let end = Utc::now();
        self.end_time = Some(end);
        if let Some(start) = self.start_time {
            self.duration_secs = Some((end - start).num_milliseconds().max(0) as f64 / 1000.0);
        }
        self.status = status;
    }
}

/// Trigger metadata recorded at run start (§3 `PipelineState.trigger`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInfo {
    pub kind: TriggerKind,
    pub initial_commit: String,
    pub timestamp: DateTime<Utc>,
}

/// Pull request metadata attached by the finalizer (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestInfo {
    pub url: String,
    pub number: u64,
    pub branch: String,
}

/// Run-level artifacts aggregated by the finalizer (§3, §4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    pub initial_commit: Option<String>,
    pub final_commit: Option<String>,
    pub handover_dir: Option<PathBuf>,
    pub changed_files: Vec<String>,
    pub total_duration_secs: Option<f64>,
    pub pull_request: Option<PullRequestInfo>,
    pub dry_run: bool,
    /// Set when cleanup is intentionally skipped; invariant 6 (§3) requires
    /// either no worktree remains or this is populated with a reason.
    pub skip_cleanup_reason: Option<String>,
    /// Set when the merge/PR step fails; does not change run `status` (§7
    /// "Finalizer errors").
    pub finalization_error: Option<String>,
}

/// The full, persisted state of one pipeline run (§3 `PipelineState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub run_id: Uuid,
    pub pipeline_config: PipelineConfig,
    pub trigger: TriggerInfo,
    pub stages: Vec<StageExecution>,
    pub status: RunStatus,
    pub artifacts: Artifacts,
}

impl PipelineState {
    pub fn new(run_id: Uuid, config: PipelineConfig, trigger: TriggerInfo) -> Self {
        let stages = config
            .agents
            .iter()
            .map(|stage| {
                let max_retries = stage
                    .retry
                    .as_ref()
                    .map(|r| r.max_attempts.saturating_sub(1))
                    .unwrap_or(0);
                StageExecution::pending(stage.name.clone(), max_retries)
            })
            .collect();
        Self {
            run_id,
            pipeline_config: config,
            trigger,
            stages,
            status: RunStatus::Pending,
            artifacts: Artifacts::default(),
        }
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageExecution> {
        self.stages.iter_mut().find(|s| s.stage_name == name)
    }

    pub fn stage(&self, name: &str) -> Option<&StageExecution> {
        self.stages.iter().find(|s| s.stage_name == name)
    }

    pub fn run_id_short(&self) -> String {
        self.run_id.to_string().chars().take(8).collect()
    }

    /// Serialize this state as a JSON `Value` tree for the condition
    /// evaluator's dotted-path resolution (§4.2).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Persists and restores `PipelineState` as JSON with atomic writes (§8
/// State Manager, §5 "State file").
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            state_dir: repo_root.join(".agent-pipeline").join("state").join("runs"),
        }
    }

    pub fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.state_dir.join(format!("{run_id}.json"))
    }

    /// Write `state` atomically: serialize to a sibling temp file, flush,
    /// then rename over the destination. A crash mid-write leaves the old
    /// file (or nothing) intact, never a half-written one (§3 invariant 5).
    pub async fn save(&self, state: &PipelineState) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let dest = self.path_for(state.run_id);
        let tmp = dest.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::State(format!("failed to serialize state: {e}")))?;
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &dest).await?;
        tracing::debug!(run_id = %state.run_id, path = %dest.display(), "persisted pipeline state");
        Ok(())
    }

    pub async fn load(&self, run_id: Uuid) -> Result<PipelineState, Error> {
        let path = self.path_for(run_id);
        let body = tokio::fs::read(&path).await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::State(format!("failed to parse state at {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn sample_config() -> PipelineConfig {
        PipelineConfig::from_yaml(
            r#"
name: demo
agents:
  - name: plan
    agent: agents/plan.md
  - name: implement
    agent: agents/implement.md
    dependsOn: [plan]
"#,
        )
        .unwrap()
    }

    #[test]
    fn new_state_seeds_pending_stages_in_declaration_order() {
        let config = sample_config();
        let trigger = TriggerInfo {
            kind: TriggerKind::Manual,
            initial_commit: "deadbeef".into(),
            timestamp: Utc::now(),
        };
        let state = PipelineState::new(Uuid::now_v7(), config, trigger);
        assert_eq!(state.status, RunStatus::Pending);
        assert_eq!(state.stages.len(), 2);
        assert_eq!(state.stages[0].stage_name, "plan");
        assert!(state.stages.iter().all(|s| s.status == StageStatus::Pending));
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let config = sample_config();
        let trigger = TriggerInfo {
            kind: TriggerKind::Manual,
            initial_commit: "deadbeef".into(),
            timestamp: Utc::now(),
        };
        let state = PipelineState::new(Uuid::now_v7(), config, trigger);
        store.save(&state).await.unwrap();
        let loaded = store.load(state.run_id).await.unwrap();
        assert_eq!(loaded.run_id, state.run_id);
        assert_eq!(loaded.stages.len(), state.stages.len());
        assert_eq!(loaded.status, state.status);
    }
}
