//! Local model runner liveness
//!
//! The CLI backend is probed with `<runner> list`; the HTTP backend with
//! `GET {base_url}/api/tags`. A runner that is down is started with
//! `<runner> serve`.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{wait_until, READY_TIMEOUT};
use crate::config::{ModelBackend, ModelsConfig};
use crate::error::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Whether the runner answers right now
pub async fn is_alive(config: &ModelsConfig) -> bool {
    match config.backend {
        ModelBackend::Cli => cli_alive(&config.runner_command).await,
        ModelBackend::Http => http_alive(&config.base_url).await,
    }
}

async fn cli_alive(command: &str) -> bool {
    let output = Command::new(command)
        .arg("list")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, output).await,
        Ok(Ok(status)) if status.success()
    )
}

async fn http_alive(base_url: &str) -> bool {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(c) => c,
        Err(_) => return false,
    };
    matches!(client.get(&url).send().await, Ok(r) if r.status().is_success())
}

/// Start the runner unless it is already up or the model is disabled.
///
/// Returns `true` when a runner was started.
pub async fn ensure_running(config: &ModelsConfig) -> Result<bool> {
    if config.rules_only || is_alive(config).await {
        return Ok(false);
    }

    let mut command = Command::new(&config.runner_command);
    command
        .arg("serve")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    command.process_group(0);
    command.spawn().map_err(|e| {
        Error::Transport(format!(
            "Failed to start model runner {}: {}",
            config.runner_command, e
        ))
    })?;
    tracing::info!(runner = %config.runner_command, "Starting model runner");

    if wait_until(READY_TIMEOUT, || is_alive(config)).await {
        Ok(true)
    } else {
        Err(Error::Transport(format!(
            "Model runner {} did not come up within {}s",
            config.runner_command,
            READY_TIMEOUT.as_secs()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_runner() -> ModelsConfig {
        ModelsConfig {
            runner_command: "/nonexistent/chatvault-model-runner".to_string(),
            ..ModelsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_runner_is_not_alive() {
        assert!(!is_alive(&missing_runner()).await);
    }

    #[tokio::test]
    async fn test_unreachable_http_runner_is_not_alive() {
        let config = ModelsConfig {
            backend: ModelBackend::Http,
            base_url: "http://127.0.0.1:1".to_string(),
            ..ModelsConfig::default()
        };
        assert!(!is_alive(&config).await);
    }

    #[tokio::test]
    async fn test_rules_only_skips_runner() {
        let config = ModelsConfig {
            rules_only: true,
            ..missing_runner()
        };
        assert!(!ensure_running(&config).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_runner_cannot_start() {
        let err = ensure_running(&missing_runner()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to start model runner"));
    }
}
