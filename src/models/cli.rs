//! `ollama run` subprocess backend

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::ModelClient;
use crate::error::CollaboratorError;

/// Runs each prompt as a one-shot `ollama run <model> <prompt>` child
#[derive(Debug, Clone)]
pub struct OllamaCli {
    command: String,
    timeout: Duration,
}

impl OllamaCli {
    pub fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ModelClient for OllamaCli {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, CollaboratorError> {
        let child = Command::new(&self.command)
            .arg("run")
            .arg(model)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CollaboratorError::Unavailable(format!("failed to spawn {}: {}", self.command, e))
            })?;

        // dropping the future on timeout kills the child
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CollaboratorError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::Unavailable(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(CollaboratorError::BadOutput("empty answer".to_string()));
        }
        tracing::debug!(model = model, bytes = text.len(), "Model answered");
        Ok(text)
    }

    fn name(&self) -> &str {
        "ollama-cli"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let cli = OllamaCli::new("/nonexistent/chatvault-model-runner", Duration::from_secs(1));
        assert!(matches!(
            cli.generate("phi3", "hello").await,
            Err(CollaboratorError::Unavailable(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echo_runner_answers() {
        // `echo run <model> <prompt>` stands in for the runner
        let cli = OllamaCli::new("echo", Duration::from_secs(5));
        let answer = cli.generate("phi3", "hello").await.unwrap();
        assert_eq!(answer, "run phi3 hello");
    }
}
