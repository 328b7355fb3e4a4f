//! Error types for the agent-pipeline execution engine.
//!
//! Mirrors the teacher crate's single-enum-per-concern shape: each concern
//! (config, planning, condition evaluation, git, stage execution, runtime)
//! gets its own `thiserror`-derived enum with `#[error("...")]` messages and
//! `#[from]` conversions where the concern wraps a lower layer. A top-level
//! [`Error`] composes them so `?` propagates cleanly through the async call
//! chains in [`crate::runner`] and [`crate::executor`].

use thiserror::Error;

/// Failures raised while loading or validating a [`crate::config::PipelineConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("pipeline config is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pipeline config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline has no stages")]
    EmptyPipeline,

    #[error("stage name `{0}` is empty or contains whitespace")]
    InvalidStageName(String),

    #[error("duplicate stage name `{0}`")]
    DuplicateStage(String),

    #[error("stage `{stage}` depends on unknown stage `{dependency}`")]
    UnknownDependency { stage: String, dependency: String },

    #[error("duplicate output key `{key}` declared on stage `{stage}`")]
    DuplicateOutputKey { stage: String, key: String },

    #[error("stage `{0}` retry.maxAttempts must be between 1 and 10")]
    InvalidRetryBudget(String),

    #[error("dependency cycle detected: {0}")]
    Cycle(String),

    #[error("agent definition `{path}` is malformed: {message}")]
    InvalidAgentDefinition { path: String, message: String },
}

/// Failures raised by the DAG planner once a config is already structurally valid.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("cannot plan a pipeline that failed validation: {0}")]
    Invalid(#[from] ConfigError),

    #[error("planner produced an empty execution plan for a non-empty stage list")]
    EmptyPlan,
}

/// Failures raised while parsing or evaluating a stage `condition` expression.
#[derive(Error, Debug)]
pub enum ConditionError {
    #[error("condition syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("condition references `{path}`, which is not yet available")]
    Eval { path: String },

    #[error("chained relational operators are not allowed: {0}")]
    ChainedRelational(String),
}

/// Failures raised by the git manager / branch manager.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("git {command} failed (exit {code}): {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to spawn git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("HEAD is detached; cannot determine current branch")]
    DetachedHead,

    #[error("branch `{0}` is already checked out in another worktree")]
    BranchCheckedOutElsewhere(String),

    #[error("cannot fast-forward merge `{0}`; diverged history")]
    NonFastForward(String),

    #[error("git output was not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Failures raised by the worktree manager.
#[derive(Error, Debug)]
pub enum WorktreeError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("worktree path `{0}` already exists and is not a git worktree")]
    PathOccupied(String),

    #[error("worktree `{0}` not found")]
    NotFound(String),

    #[error("refusing to remove worktree `{0}` with uncommitted changes (use force)")]
    DirtyWorktree(String),
}

/// Failures raised by a runtime adapter invocation.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("runtime `{runtime}` returned a non-zero exit and reported: {message}")]
    Execution { runtime: String, message: String },

    #[error("runtime invocation timed out after {0}s")]
    Timeout(u64),

    #[error("runtime invocation was cancelled")]
    Cancelled,

    #[error("runtime `{0}` is not registered")]
    UnknownRuntime(String),

    #[error("runtime authentication failed: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures raised while executing a single stage, carrying the stage name
/// so the runner can attribute the failure without re-threading context.
#[derive(Error, Debug)]
#[error("stage `{stage_name}` failed: {source}")]
pub struct StageError {
    pub stage_name: String,
    #[source]
    pub source: anyhow_lite::BoxError,
}

/// Cooperative-cancellation error, surfaced as a stage failure with a fixed message.
#[derive(Error, Debug)]
#[error("cancelled")]
pub struct CancelledError;

/// The crate's top-level error, composing every concern's enum.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Worktree(#[from] WorktreeError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("{0}")]
    Cancelled(#[from] CancelledError),

    #[error("state persistence error: {0}")]
    State(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A tiny local substitute for a boxed `std::error::Error + Send + Sync`,
/// named to make clear at call sites that it is not the `anyhow` crate —
/// this crate only needs the boxing, not `anyhow`'s context/chain API.
pub mod anyhow_lite {
    pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
}

/// Best-effort classification used by the Retry Handler and the Stage
/// Executor's `error.suggestion` field (§4.3, §4.6 of the design).
///
/// Pattern-matches on message text for opaque runtime/git-subprocess
/// output, per the design note in §9: this crate's own typed errors are
/// classified structurally first (see [`Classification::of`]), falling
/// back to text matching only when the source is a string blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    NonRetryable,
}

impl Classification {
    /// Classify an error by inspecting its `Display` text, the approach the
    /// upstream system uses for opaque runtime/git output (§4.3).
    pub fn classify_message(message: &str) -> Classification {
        let lower = message.to_lowercase();

        const NON_RETRYABLE: &[&str] = &[
            "401",
            "403",
            "unauthorized",
            "enoent",
            "no such file",
            "yaml",
            "parse error",
            "invalid config",
        ];
        const RETRYABLE: &[&str] = &[
            "timeout",
            "network",
            "econnrefused",
            "econnreset",
            "etimedout",
            "429",
            "500",
            "502",
            "503",
            "504",
        ];

        if NON_RETRYABLE.iter().any(|p| lower.contains(p)) {
            return Classification::NonRetryable;
        }
        if RETRYABLE.iter().any(|p| lower.contains(p)) {
            return Classification::Retryable;
        }
        // Default when unclassifiable: retry (§4.3).
        Classification::Retryable
    }

    /// Structural fast path for this crate's own error types, avoiding a
    /// string round-trip when the source is already a typed error.
    pub fn of(err: &(dyn std::error::Error + 'static)) -> Classification {
        if let Some(e) = err.downcast_ref::<RuntimeError>() {
            return match e {
                RuntimeError::Timeout(_) => Classification::Retryable,
                RuntimeError::Unauthorized(_) => Classification::NonRetryable,
                RuntimeError::UnknownRuntime(_) => Classification::NonRetryable,
                RuntimeError::Cancelled => Classification::NonRetryable,
                RuntimeError::Execution { message, .. } => Self::classify_message(message),
                RuntimeError::Io(io) => Self::classify_message(&io.to_string()),
            };
        }
        if let Some(e) = err.downcast_ref::<GitError>() {
            return match e {
                GitError::CommandFailed { stderr, .. } => Self::classify_message(stderr),
                GitError::Spawn(_) => Classification::Retryable,
                _ => Classification::NonRetryable,
            };
        }
        if err.downcast_ref::<ConfigError>().is_some() {
            return Classification::NonRetryable;
        }
        Self::classify_message(&err.to_string())
    }

    /// A human suggestion derived from the message via the fixed taxonomy
    /// in §4.6: missing agent file, timeout, 4xx, YAML/parse, permission.
    pub fn suggest(message: &str) -> Option<String> {
        let lower = message.to_lowercase();
        if lower.contains("no such file") || lower.contains("enoent") {
            Some("check the agent path".to_string())
        } else if lower.contains("timeout") || lower.contains("etimedout") {
            Some("increase the stage timeout".to_string())
        } else if lower.contains("401") || lower.contains("403") || lower.contains("unauthorized")
        {
            Some("check credentials".to_string())
        } else if lower.contains("yaml") || lower.contains("parse error") {
            Some("check syntax".to_string())
        } else if lower.contains("permission denied") {
            Some("check file permissions".to_string())
        } else {
            None
        }
    }
}
