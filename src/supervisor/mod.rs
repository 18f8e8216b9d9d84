//! Client side of the warm process
//!
//! Short-lived CLI invocations talk to the warm process through
//! [`DaemonClient`]. [`Supervisor`] starts it when it is not answering
//! pings and stops it on request; [`runner`] does the same for the local
//! model runner.

pub mod runner;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::server::{Request, Response};

/// How long the warm process gets to answer its first ping
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

const PROBE_INTERVAL: Duration = Duration::from_millis(500);
const PING_TIMEOUT: Duration = Duration::from_secs(1);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// One-request-per-connection client
#[derive(Debug, Clone)]
pub struct DaemonClient {
    address: String,
    /// Budget for a full request, model calls included
    request_timeout: Duration,
}

impl DaemonClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one request and read its response
    pub async fn send(&self, request: &Request) -> Result<Response> {
        self.exchange(request, self.request_timeout).await
    }

    async fn exchange(&self, request: &Request, budget: Duration) -> Result<Response> {
        let mut payload = serde_json::to_vec(request)?;
        payload.extend_from_slice(b"\n\n");

        let raw = tokio::time::timeout(budget, async {
            let mut stream = TcpStream::connect(&self.address).await?;
            stream.write_all(&payload).await?;
            stream.shutdown().await?;
            let mut raw = String::new();
            stream.read_to_string(&mut raw).await?;
            Ok::<_, std::io::Error>(raw)
        })
        .await
        .map_err(|_| {
            Error::Transport(format!(
                "{} did not answer within {}s",
                self.address,
                budget.as_secs()
            ))
        })?
        .map_err(|e| Error::Transport(format!("{}: {}", self.address, e)))?;

        let line = raw.lines().next().unwrap_or_default();
        if line.trim().is_empty() {
            return Err(Error::Transport(format!(
                "{} closed the connection without answering",
                self.address
            )));
        }
        Ok(serde_json::from_str(line)?)
    }

    /// True when the warm process answers `ping` with `pong`
    pub async fn ping(&self) -> bool {
        match self.exchange(&Request::Ping, PING_TIMEOUT).await {
            Ok(r) => r.success && r.response.as_deref() == Some("pong"),
            Err(e) => {
                tracing::trace!(address = %self.address, error = %e, "Ping failed");
                false
            }
        }
    }

    pub async fn send_message(
        &self,
        session_id: &str,
        message: &str,
        system_prompt: Option<String>,
    ) -> Result<Response> {
        self.send(&Request::send_message(session_id, message, system_prompt))
            .await
    }

    pub async fn cleanup_history(&self) -> Result<Response> {
        self.send(&Request::CleanupHistory).await
    }

    pub async fn shutdown(&self) -> Result<Response> {
        self.send(&Request::Shutdown).await
    }
}

/// Starts and stops the warm process
#[derive(Debug, Clone)]
pub struct Supervisor {
    client: DaemonClient,
    /// Executable started with `serve`
    program: PathBuf,
    /// Forwarded as `--config` to the spawned process
    config_path: Option<PathBuf>,
    ready_timeout: Duration,
}

impl Supervisor {
    /// Supervise the current executable
    pub fn new(client: DaemonClient, config_path: Option<PathBuf>) -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| Error::Internal(format!("Cannot locate own executable: {}", e)))?;
        Ok(Self::with_program(client, program, config_path))
    }

    pub fn with_program(client: DaemonClient, program: PathBuf, config_path: Option<PathBuf>) -> Self {
        Self {
            client,
            program,
            config_path,
            ready_timeout: READY_TIMEOUT,
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn client(&self) -> &DaemonClient {
        &self.client
    }

    /// Make sure the warm process answers pings, spawning it if needed.
    ///
    /// Returns `true` when a new process was started.
    pub async fn ensure_running(&self) -> Result<bool> {
        if self.client.ping().await {
            return Ok(false);
        }
        self.spawn()?;
        let client = &self.client;
        if wait_until(self.ready_timeout, || client.ping()).await {
            tracing::info!(address = self.client.address(), "Warm process ready");
            Ok(true)
        } else {
            Err(Error::Transport(format!(
                "Warm process did not answer within {}s",
                self.ready_timeout.as_secs()
            )))
        }
    }

    fn spawn(&self) -> Result<()> {
        let mut command = Command::new(&self.program);
        if let Some(path) = &self.config_path {
            command.arg("--config").arg(path);
        }
        command
            .arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // own process group so the terminal's Ctrl-C does not reach it
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            Error::Transport(format!(
                "Failed to start warm process {}: {}",
                self.program.display(),
                e
            ))
        })?;
        tracing::info!(
            program = %self.program.display(),
            pid = child.id(),
            "Spawned warm process"
        );
        Ok(())
    }

    /// Ask the warm process to stop and wait until it stops answering.
    ///
    /// Returns `false` when nothing was running.
    pub async fn stop(&self) -> Result<bool> {
        if !self.client.ping().await {
            return Ok(false);
        }
        let response = self.client.shutdown().await?;
        if !response.success {
            return Err(Error::Transport(
                response.error.unwrap_or_else(|| "shutdown refused".to_string()),
            ));
        }
        let client = &self.client;
        if wait_until(STOP_TIMEOUT, || async move { !client.ping().await }).await {
            Ok(true)
        } else {
            Err(Error::Transport(format!(
                "Warm process still answering after {}s",
                STOP_TIMEOUT.as_secs()
            )))
        }
    }
}

/// Poll `probe` until it holds or `budget` runs out
pub(crate) async fn wait_until<F, Fut>(budget: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if probe().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(PROBE_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatBackend, RecordingChat};
    use crate::config::{ChatVaultConfig, ServerConfig};
    use crate::models::ScriptedModel;
    use crate::pipeline::Pipeline;
    use crate::server::Server;
    use crate::store::LocalStore;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn start() -> (DaemonClient, tokio::task::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let pipeline = Arc::new(Pipeline::with_components(
            &ChatVaultConfig::default(),
            Arc::new(ScriptedModel::new()),
            Arc::new(RecordingChat::new()) as Arc<dyn ChatBackend>,
            Arc::new(LocalStore::open_in_memory().unwrap()),
        ));
        let config = ServerConfig {
            port: 0,
            poll_interval_ms: 50,
            shutdown_grace_ms: 50,
            ..ServerConfig::default()
        };
        let handle = tokio::spawn(Server::new(config, pipeline).serve(listener));
        (DaemonClient::new(addr.to_string()), handle)
    }

    /// An address nothing listens on
    async fn dead_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn test_client_roundtrip() {
        let (client, handle) = start().await;
        assert!(client.ping().await);

        let r = client.send_message("s", "hello", None).await.unwrap();
        assert_eq!(r.response.as_deref(), Some("echo: hello"));

        let r = client.cleanup_history().await.unwrap();
        assert_eq!(r.metadata.unwrap()["deleted"], 2);

        let r = client.shutdown().await.unwrap();
        assert_eq!(r, Response::ok("Shutting down"));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ping_fails_without_server() {
        let client = DaemonClient::new(dead_address().await);
        assert!(!client.ping().await);
        assert!(matches!(
            client.send(&Request::Ping).await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_supervisor_does_not_respawn_live_process() {
        let (client, handle) = start().await;
        let supervisor = Supervisor::with_program(
            client,
            PathBuf::from("/nonexistent/chatvault"),
            None,
        );
        assert!(!supervisor.ensure_running().await.unwrap());
        assert!(supervisor.stop().await.unwrap());
        handle.await.unwrap().unwrap();
        assert!(!supervisor.stop().await.unwrap());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let supervisor = Supervisor::with_program(
            DaemonClient::new(dead_address().await),
            PathBuf::from("/nonexistent/chatvault"),
            None,
        );
        let err = supervisor.ensure_running().await.unwrap_err();
        assert!(err.to_string().contains("Failed to start warm process"));
    }

    #[tokio::test]
    async fn test_wait_until_gives_up() {
        assert!(wait_until(Duration::from_millis(10), || async { true }).await);
        assert!(!wait_until(Duration::from_millis(10), || async { false }).await);
    }
}
