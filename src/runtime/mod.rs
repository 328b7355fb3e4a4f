//! Agent runtime adapter (§6): a capability-typed `async_trait` contract
//! plus a small registry keyed by `runtime.type`, mirroring the teacher's
//! polymorphism points (e.g. `HashKind`-selected algorithms) with a trait
//! object instead of an enum, since adapters carry process/network state.

pub mod cli;
pub mod sdk;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RuntimeSettings;
use crate::error::RuntimeError;
use crate::state::TokenUsage;

/// Everything a stage needs to hand to a runtime invocation (§4.6 step 3-4).
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub options: serde_json::Map<String, Value>,
    pub permission_mode: String,
    pub timeout: std::time::Duration,
}

/// What a runtime invocation reports back (§6).
#[derive(Debug, Clone, Default)]
pub struct ExecuteResponse {
    pub text_output: String,
    pub token_usage: Option<TokenUsage>,
    pub num_turns: Option<u32>,
    /// Harvested from the side-channel `report_outputs` tool (§6); `None`
    /// when the agent never called it.
    pub extracted_data: Option<HashMap<String, Value>>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub available_models: Vec<String>,
    pub permission_modes: Vec<String>,
    pub supports_streaming: bool,
    pub supports_mcp: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The capability-typed contract every runtime adapter implements (§6).
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    async fn execute(
        &self,
        request: ExecuteRequest,
        cancellation: tokio_util::sync::CancellationToken,
    ) -> Result<ExecuteResponse, RuntimeError>;

    fn capabilities(&self) -> Capabilities;

    async fn validate(&self) -> ValidationResult;
}

/// Registry keyed by `runtime.type` (§6, §9 "Runtime adapter polymorphism").
pub struct RuntimeRegistry {
    factories: HashMap<String, Arc<dyn Fn(&RuntimeSettings) -> Arc<dyn RuntimeAdapter> + Send + Sync>>,
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("sdk", |settings| {
            Arc::new(sdk::SdkRuntime::from_settings(settings)) as Arc<dyn RuntimeAdapter>
        });
        registry.register("headless-cli", |settings| {
            Arc::new(cli::HeadlessCliRuntime::from_settings(settings)) as Arc<dyn RuntimeAdapter>
        });
        registry
    }
}

impl RuntimeRegistry {
    pub fn register(
        &mut self,
        key: &str,
        factory: impl Fn(&RuntimeSettings) -> Arc<dyn RuntimeAdapter> + Send + Sync + 'static,
    ) {
        self.factories.insert(key.to_string(), Arc::new(factory));
    }

    pub fn build(&self, settings: &RuntimeSettings) -> Result<Arc<dyn RuntimeAdapter>, RuntimeError> {
        let factory = self
            .factories
            .get(settings.kind.as_str())
            .ok_or_else(|| RuntimeError::UnknownRuntime(settings.kind.clone()))?;
        Ok(factory(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSettings;

    #[test]
    fn registry_resolves_builtin_runtimes() {
        let registry = RuntimeRegistry::default();
        let sdk = registry.build(&RuntimeSettings {
            kind: "sdk".to_string(),
            options: Default::default(),
        });
        assert!(sdk.is_ok());
        let cli = registry.build(&RuntimeSettings {
            kind: "headless-cli".to_string(),
            options: Default::default(),
        });
        assert!(cli.is_ok());
    }

    #[test]
    fn unknown_runtime_type_is_an_error() {
        let registry = RuntimeRegistry::default();
        let err = registry
            .build(&RuntimeSettings {
                kind: "unknown".to_string(),
                options: Default::default(),
            })
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownRuntime(_)));
    }
}
