//! `PipelineConfig` parsing and validation.
//!
//! A pipeline is authored as YAML on disk (`<repo>/.agent-pipeline/pipelines/<name>.yml`,
//! §6) and loaded once per run; every optional section fills in with
//! `serde(default)`, the same pattern the teacher uses in its own
//! `PackConfig`/`LfsConfig` (string-or-number coercion, `Default` impls).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a pipeline run may be triggered. The engine itself only reads this
/// field back into `PipelineState.trigger`; the actual trigger wiring
/// (webhook, CLI invocation) is out of scope (§1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    Manual,
    PostCommit,
}

impl Default for TriggerKind {
    fn default() -> Self {
        TriggerKind::Manual
    }
}

/// What to do when a stage fails, at the pipeline level (`settings.failureStrategy`)
/// or overridden per-stage (`AgentStage.onFail`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStrategy {
    Stop,
    Continue,
    Warn,
}

impl Default for FailureStrategy {
    fn default() -> Self {
        FailureStrategy::Stop
    }
}

/// Permission mode forwarded to the runtime adapter; the engine does not
/// interpret it beyond passing it through to `RuntimeAdapter::execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

impl Default for PermissionMode {
    fn default() -> Self {
        PermissionMode::Default
    }
}

/// Pipeline-wide settings (§3 `PipelineConfig.settings`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub auto_commit: bool,
    /// Template for commit messages; `{{stage}}` is expanded to the stage name.
    pub commit_prefix: String,
    pub failure_strategy: FailureStrategy,
    pub permission_mode: PermissionMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_commit: true,
            commit_prefix: "[agent-pipeline]".to_string(),
            failure_strategy: FailureStrategy::default(),
            permission_mode: PermissionMode::default(),
        }
    }
}

/// Branch naming/lifetime strategy (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchStrategy {
    Reusable,
    UniquePerRun,
    UniqueAndDelete,
}

impl Default for BranchStrategy {
    fn default() -> Self {
        BranchStrategy::UniquePerRun
    }
}

/// How the finalizer lands the pipeline branch's commits (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    PullRequest,
    LocalMerge,
    None,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::PullRequest
    }
}

/// Pull-request options consumed by the external `PullRequestCreator` (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PullRequestOptions {
    pub title_template: String,
    pub body_template: String,
    pub draft: bool,
    pub labels: Vec<String>,
}

impl Default for PullRequestOptions {
    fn default() -> Self {
        Self {
            title_template: "[agent-pipeline] {{pipeline}} run {{run_id}}".to_string(),
            body_template: String::new(),
            draft: false,
            labels: Vec::new(),
        }
    }
}

/// Git-related configuration (§3 `PipelineConfig.git`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GitSettings {
    pub base_branch: String,
    pub branch_prefix: String,
    pub branch_strategy: BranchStrategy,
    pub merge_strategy: MergeStrategy,
    pub pull_request: PullRequestOptions,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            base_branch: "main".to_string(),
            branch_prefix: "agent-pipeline".to_string(),
            branch_strategy: BranchStrategy::default(),
            merge_strategy: MergeStrategy::default(),
            pull_request: PullRequestOptions::default(),
        }
    }
}

/// Which runtime adapter a stage (or the whole pipeline) should use (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeSettings {
    /// Registry key, e.g. `"sdk"` or `"headless-cli"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            kind: "sdk".to_string(),
            options: serde_json::Map::new(),
        }
    }
}

/// Execution-wide concurrency knobs (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Parallel
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionSettings {
    pub mode: ExecutionMode,
    /// `None` means "default to wave size, minimum 1" (§4.7 step 5b).
    pub concurrency_limit: Option<usize>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            concurrency_limit: None,
        }
    }
}

/// Notification hooks; the engine only carries this through to the
/// out-of-scope notifier (§1) and never dispatches a notification itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    pub on_completion: bool,
    pub on_failure: bool,
    pub channels: Vec<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            on_completion: false,
            on_failure: true,
            channels: Vec::new(),
        }
    }
}

/// Backoff shape for a stage's `retry` block (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Linear,
    Exponential,
}

impl Default for BackoffKind {
    fn default() -> Self {
        BackoffKind::Exponential
    }
}

/// A stage's retry policy. Absent entirely ⇒ one attempt, no retries;
/// present with fields omitted ⇒ the defaults below (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::default(),
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// One stage in the pipeline (§3 `AgentStage`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStage {
    pub name: String,
    pub agent: PathBuf,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub on_fail: Option<FailureStrategy>,
    #[serde(default)]
    pub output_keys: Vec<String>,
    #[serde(default)]
    pub runtime: Option<RuntimeSettings>,
}

fn default_timeout_secs() -> u64 {
    900
}

impl AgentStage {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The top-level, immutable-after-load pipeline document (§3 `PipelineConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub trigger: TriggerKind,
    pub agents: Vec<AgentStage>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub git: GitSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
}

impl PipelineConfig {
    /// Parse from a YAML string. Structural validation (duplicate names,
    /// unknown dependencies, cycles) is the DAG Planner's job
    /// ([`crate::plan::validate`]); this only covers what `serde` can check
    /// plus the few checks that are cheaper done eagerly (§4.1, empty
    /// pipeline, stage-name shape, retry budget range).
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(input)?;
        config.check_shape()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    fn check_shape(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::EmptyPipeline);
        }
        for stage in &self.agents {
            if stage.name.trim().is_empty() || stage.name.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidStageName(stage.name.clone()));
            }
            if let Some(retry) = &stage.retry
                && !(1..=10).contains(&retry.max_attempts)
            {
                return Err(ConfigError::InvalidRetryBudget(stage.name.clone()));
            }
            let mut seen_keys = std::collections::HashSet::new();
            for key in &stage.output_keys {
                if !seen_keys.insert(key) {
                    return Err(ConfigError::DuplicateOutputKey {
                        stage: stage.name.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn stage(&self, name: &str) -> Option<&AgentStage> {
        self.agents.iter().find(|s| s.name == name)
    }

    pub fn failure_strategy_for(&self, stage: &AgentStage) -> FailureStrategy {
        stage.on_fail.unwrap_or(self.settings.failure_strategy)
    }
}
