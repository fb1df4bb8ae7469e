use std::time::Duration;

use async_trait::async_trait;
use ovt_models::config::LlmConfig;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::collaborators::LanguageModel;
use crate::error::AgentError;

/// A language model reached through the local `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCliModel {
    pub model: String,
    pub timeout: Duration,
    pub binary: String,
}

impl Default for ClaudeCliModel {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(45),
            binary: "claude".to_string(),
        }
    }
}

impl ClaudeCliModel {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            ..Self::default()
        }
    }
}

#[async_trait]
impl LanguageModel for ClaudeCliModel {
    fn model(&self) -> &str {
        &self.model
    }

    /// Invoke the CLI with a system prompt and user prompt.
    /// Returns the raw stdout text.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AgentError> {
        debug!(model = %self.model, "Invoking claude CLI");

        let result = tokio::time::timeout(self.timeout, async {
            Command::new(&self.binary)
                .args([
                    "-p",
                    user_prompt,
                    "--system-prompt",
                    system_prompt,
                    "--model",
                    &self.model,
                    "--output-format",
                    "text",
                ])
                .output()
                .await
        })
        .await
        .map_err(|_| AgentError::Timeout("claude CLI".to_string(), self.timeout.as_secs()))?
        .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", self.binary)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(status = %result.status, stderr = %stderr, "Claude CLI failed");
            return Err(AgentError::Cli(format!(
                "{} exited {}: {}",
                self.binary, result.status, stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&result.stdout).to_string();
        if stdout.trim().is_empty() {
            return Err(AgentError::Cli("Claude returned empty response".to_string()));
        }

        Ok(stdout)
    }
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
