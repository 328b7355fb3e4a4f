//! `SdkRuntime` (§6): an in-process placeholder adapter suitable for tests
//! and as the seam a real SDK client is wired in behind later. It reads
//! `ANTHROPIC_API_KEY`/`CLAUDE_API_KEY` lazily in `validate()` and never
//! logs the value (§6 "Environment").

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeSettings;
use crate::error::RuntimeError;

use super::{Capabilities, ExecuteRequest, ExecuteResponse, RuntimeAdapter, ValidationResult};

pub struct SdkRuntime {
    model: Option<String>,
}

impl SdkRuntime {
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        let model = settings
            .options
            .get("model")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self { model }
    }
}

#[async_trait]
impl RuntimeAdapter for SdkRuntime {
    async fn execute(
        &self,
        request: ExecuteRequest,
        cancellation: CancellationToken,
    ) -> Result<ExecuteResponse, RuntimeError> {
        tokio::select! {
            _ = cancellation.cancelled() => Err(RuntimeError::Cancelled),
            result = self.execute_inner(&request) => result,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            available_models: vec!["claude".to_string()],
            permission_modes: vec![
                "default".to_string(),
                "acceptEdits".to_string(),
                "bypassPermissions".to_string(),
                "plan".to_string(),
            ],
            supports_streaming: true,
            supports_mcp: true,
        }
    }

    async fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let has_key = std::env::var("ANTHROPIC_API_KEY").is_ok()
            || std::env::var("CLAUDE_API_KEY").is_ok();
        if !has_key {
            result
                .errors
                .push("ANTHROPIC_API_KEY or CLAUDE_API_KEY must be set for the sdk runtime".to_string());
        }
        result
    }
}

impl SdkRuntime {
    async fn execute_inner(
        &self,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse, RuntimeError> {
        tracing::info!(
            model = ?self.model,
            prompt_len = request.user_prompt.len(),
            "sdk runtime invocation (placeholder: no network call made)"
        );
        // This adapter is an in-process placeholder (§6): it does not
        // actually call a model. A real implementation wires the
        // Anthropic SDK client in here behind the same `RuntimeAdapter`
        // contract, preserving this module's cancellation/timeout wiring.
        Ok(ExecuteResponse {
            text_output: String::new(),
            token_usage: None,
            num_turns: Some(0),
            extracted_data: None,
            provider: Some("anthropic".to_string()),
            model: self.model.clone(),
        })
    }
}
