//! `HeadlessCliRuntime` (§6): spawns an external CLI process per invocation,
//! reading its stdout as the agent's textual output, in the teacher's
//! `tokio::process` shell-out idiom (see [`crate::git`]).

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeSettings;
use crate::error::RuntimeError;

use super::{Capabilities, ExecuteRequest, ExecuteResponse, RuntimeAdapter, ValidationResult};

pub struct HeadlessCliRuntime {
    binary: String,
    extra_args: Vec<String>,
}

impl HeadlessCliRuntime {
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        let binary = settings
            .options
            .get("binary")
            .and_then(|v| v.as_str())
            .unwrap_or("claude")
            .to_string();
        let extra_args = settings
            .options
            .get("args")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self { binary, extra_args }
    }
}

#[async_trait]
impl RuntimeAdapter for HeadlessCliRuntime {
    async fn execute(
        &self,
        request: ExecuteRequest,
        cancellation: CancellationToken,
    ) -> Result<ExecuteResponse, RuntimeError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.extra_args)
            .arg("--print")
            .arg("--permission-mode")
            .arg(&request.permission_mode)
            .arg("--system-prompt")
            .arg(&request.system_prompt)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.user_prompt.as_bytes()).await?;
        }

        let wait = child.wait_with_output();
        tokio::select! {
            _ = cancellation.cancelled() => Err(RuntimeError::Cancelled),
            output = wait => {
                let output = output?;
                if !output.status.success() {
                    return Err(RuntimeError::Execution {
                        runtime: self.binary.clone(),
                        message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                Ok(ExecuteResponse {
                    text_output: String::from_utf8_lossy(&output.stdout).to_string(),
                    token_usage: None,
                    num_turns: None,
                    extracted_data: None,
                    provider: Some("headless-cli".to_string()),
                    model: None,
                })
            }
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            available_models: Vec::new(),
            permission_modes: vec!["default".to_string(), "bypassPermissions".to_string()],
            supports_streaming: false,
            supports_mcp: false,
        }
    }

    async fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let found = Command::new("which")
            .arg(&self.binary)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        if !found {
            result
                .warnings
                .push(format!("`{}` not found on PATH", self.binary));
        }
        result
    }
}
