//! Warm process server
//!
//! Keeps one [`Pipeline`] loaded and answers one request per loopback TCP
//! connection. The process stops when the shutdown token is cancelled: by a
//! `shutdown` request (after a grace delay), by the idle monitor, or by
//! Ctrl-C.

pub mod codec;
pub mod protocol;

pub use codec::WireCodec;
pub use protocol::{Request, Response, DEFAULT_SESSION};

use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;

/// Longest a client may take to send its request
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Time of the last request, as millis since the server started
struct Activity {
    started: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_ms.store(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let now = self.started.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_ms.load(Ordering::Relaxed)))
    }
}

/// State shared with every connection task
struct Shared {
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
    activity: Activity,
    max_request_bytes: usize,
    shutdown_grace: Duration,
}

/// Warm process server
pub struct Server {
    config: ServerConfig,
    shared: Arc<Shared>,
}

impl Server {
    pub fn new(config: ServerConfig, pipeline: Arc<Pipeline>) -> Self {
        let shared = Arc::new(Shared {
            pipeline,
            shutdown: CancellationToken::new(),
            activity: Activity::new(),
            max_request_bytes: config.max_request_bytes,
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
        });
        Self { config, shared }
    }

    /// Cancelling this token stops the accept loop
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self) -> Result<()> {
        let address = self.config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind {}: {}", address, e)))?;

        let token = self.shutdown_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                token.cancel();
            }
        });

        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!(
            address = %local,
            idle_timeout_secs = self.config.idle_timeout_secs,
            "ChatVault warm process listening"
        );

        self.shared.activity.touch();
        let monitor = tokio::spawn(idle_monitor(
            Arc::clone(&self.shared),
            Duration::from_secs(self.config.idle_timeout_secs),
            Duration::from_millis(self.config.idle_check_interval_ms),
        ));

        let poll = Duration::from_millis(self.config.poll_interval_ms);
        while !self.shared.shutdown.is_cancelled() {
            let accepted = tokio::select! {
                _ = self.shared.shutdown.cancelled() => break,
                accepted = tokio::time::timeout(poll, listener.accept()) => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(Ok(conn)) => conn,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                    continue;
                }
                // poll timeout; loop re-checks the shutdown flag
                Err(_) => continue,
            };

            self.shared.activity.touch();
            let shared = Arc::clone(&self.shared);
            let connection_id = uuid::Uuid::new_v4();
            tokio::spawn(async move {
                tracing::debug!(%connection_id, %peer, "Connection accepted");
                if let Err(e) = handle_connection(stream, &shared).await {
                    tracing::warn!(%connection_id, error = %e, "Connection failed");
                }
            });
        }

        monitor.abort();
        tracing::info!("ChatVault warm process stopped");
        Ok(())
    }
}

async fn idle_monitor(shared: Arc<Shared>, idle_timeout: Duration, check_every: Duration) {
    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            _ = tokio::time::sleep(check_every) => {}
        }
        let idle = shared.activity.idle_for();
        if idle >= idle_timeout {
            tracing::info!(idle_secs = idle.as_secs(), "Idle timeout reached, shutting down");
            shared.shutdown.cancel();
            return;
        }
    }
}

/// Read one request, answer it, close
async fn handle_connection(stream: TcpStream, shared: &Shared) -> Result<()> {
    let mut framed = Framed::new(stream, WireCodec::new(shared.max_request_bytes));

    let frame = match tokio::time::timeout(READ_TIMEOUT, framed.next()).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return Ok(()),
        Err(_) => return Err(Error::Transport("Timed out waiting for request".to_string())),
    };

    let response = match frame {
        Ok(payload) => match Request::parse(&payload) {
            Ok(request) => dispatch(request, shared).await,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed request");
                Response::from(e)
            }
        },
        Err(Error::Protocol(e)) => {
            tracing::debug!(error = %e, "Malformed request");
            Response::from(e)
        }
        Err(e) => return Err(e),
    };

    framed.send(response).await?;
    framed.close().await?;
    Ok(())
}

async fn dispatch(request: Request, shared: &Shared) -> Response {
    tracing::debug!(action = request.action(), "Dispatching request");
    match request {
        Request::Ping => Response::ok("pong"),
        Request::Shutdown => {
            let token = shared.shutdown.clone();
            let grace = shared.shutdown_grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                token.cancel();
            });
            tracing::info!("Shutdown requested");
            Response::ok("Shutting down")
        }
        Request::CleanupHistory => match shared.pipeline.cleanup_history().await {
            Ok(deleted) => {
                Response::ok("History cleaned").with_metadata(json!({ "deleted": deleted }))
            }
            Err(e) => {
                tracing::error!(error = %e, "History cleanup failed");
                Response::error(e.to_string())
            }
        },
        Request::SendMessage {
            session_id,
            message,
            system_prompt,
        } => shared
            .pipeline
            .process(&session_id, &message, system_prompt.as_deref())
            .await
            .into(),
    }
}
