//! Daemon Server Implementation
//!
//! The accept loop for the partty daemon:
//! - Accepts TCP connections
//! - Enforces the connection limit before any session work happens
//! - Spawns one handler task per connection
//! - Logs aggregate stats on an interval
//! - Shuts down gracefully: sessions get a grace period to say goodbye,
//!   then whatever is left is aborted
//!
//! ```text
//!                     DaemonServer
//!                          │
//!          ┌───────────────┼───────────────┐
//!          │               │               │
//!      viewer 1        viewer 2        viewer 3
//!      (conn-1)        (conn-2)        (conn-3)
//!          │               │               │
//!          └───────────────┴───────────────┘
//!                          │
//!                   SessionRuntime
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Instrument};

use partty_core::transport::write_message;
use partty_core::{
    serve_connection, PartyConfig, ServerMessage, SessionRuntime, TransportConfig,
    TransportError,
};

/// Reason sent to clients turned away by the connection limit
const SERVER_FULL: &str = "server is full, try again later";

/// Connection state tracking (internal to the server)
struct ConnectionState {
    /// When the connection was accepted
    connected_at: Instant,
    /// Remote address
    peer: SocketAddr,
    /// Handle to abort the connection task
    abort_handle: tokio::task::AbortHandle,
}

/// Configuration for the daemon server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// How long shutdown waits for sessions to end on their own
    pub shutdown_grace: Duration,
    /// Interval between stats log lines; zero disables them
    pub stats_interval: Duration,
    /// Per-connection transport settings
    pub transport: TransportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&PartyConfig::default())
    }
}

impl From<&PartyConfig> for ServerConfig {
    fn from(config: &PartyConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            shutdown_grace: config.shutdown_grace,
            stats_interval: config.stats_interval,
            transport: config.transport_config(),
        }
    }
}

/// The main daemon server
pub struct DaemonServer {
    listener: TcpListener,
    runtime: SessionRuntime,
    config: ServerConfig,
    /// Active connection state (task handles, peer info)
    connections: Arc<DashMap<u64, ConnectionState>>,
    next_conn_id: u64,
}

impl DaemonServer {
    /// Bind the listener
    pub async fn bind(addr: &str, runtime: SessionRuntime, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {addr}"))?;
        Ok(Self {
            listener,
            runtime,
            config,
            connections: Arc::new(DashMap::new()),
            next_conn_id: 1,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Number of open connections, including ones still handshaking
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Accept connections until `shutdown` completes, then shut down
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Listening for connections");

        tokio::pin!(shutdown);

        let stats_enabled = !self.config.stats_interval.is_zero();
        let mut stats_interval =
            tokio::time::interval(self.config.stats_interval.max(Duration::from_secs(1)));
        stats_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        stats_interval.tick().await;

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping accept loop");
                    break;
                }

                _ = stats_interval.tick(), if stats_enabled => {
                    self.log_stats();
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer),
                    Err(e) => error!(error = %e, "Accept failed"),
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.connections.len() >= self.config.max_connections {
            warn!(
                peer = %peer,
                limit = self.config.max_connections,
                "Connection limit reached, rejecting new connection"
            );
            tokio::spawn(refuse(stream, self.config.transport.handshake_timeout));
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;

        info!(
            conn_id,
            peer = %peer,
            active_connections = self.connections.len() + 1,
            "New connection accepted"
        );

        let runtime = self.runtime.clone();
        let transport = self.config.transport.clone();
        let connections = Arc::clone(&self.connections);

        let task = tokio::spawn(
            async move {
                match serve_connection(stream, peer.to_string(), &runtime, &transport).await {
                    Ok(report) => debug!(end = %report.end, "Connection finished"),
                    Err(TransportError::Session(e)) => info!(reason = %e, "Connection declined"),
                    Err(e) => warn!(error = %e, "Connection failed"),
                }
                connections.remove(&conn_id);
            }
            .instrument(tracing::info_span!("connection", conn_id, peer = %peer)),
        );

        self.connections.insert(
            conn_id,
            ConnectionState {
                connected_at: Instant::now(),
                peer,
                abort_handle: task.abort_handle(),
            },
        );
        // The task may have finished before it was registered
        if task.is_finished() {
            self.connections.remove(&conn_id);
        }
    }

    fn log_stats(&self) {
        let stats = self.runtime.stats();
        let oldest_secs = self
            .connections
            .iter()
            .map(|c| c.connected_at.elapsed().as_secs())
            .max()
            .unwrap_or(0);
        info!(
            connections = self.connection_count(),
            active_sessions = stats.active,
            peak_sessions = stats.peak_active,
            started = stats.started,
            completed = stats.completed,
            rejected = stats.rejected,
            write_failures = stats.write_failures,
            frames_written = stats.frames_written,
            oldest_connection_secs = oldest_secs,
            "Runtime stats"
        );
    }

    /// Graceful shutdown
    async fn shutdown(self) {
        let Self {
            listener,
            runtime,
            config,
            connections,
            ..
        } = self;
        drop(listener);

        info!(
            active_sessions = runtime.active_sessions(),
            "Initiating graceful shutdown"
        );
        runtime.shutdown();

        if tokio::time::timeout(config.shutdown_grace, runtime.wait_idle())
            .await
            .is_err()
        {
            warn!(
                remaining = runtime.active_sessions(),
                "Grace period expired, aborting remaining sessions"
            );
        }

        let conn_ids: Vec<u64> = connections.iter().map(|c| *c.key()).collect();
        for conn_id in conn_ids {
            if let Some((_, state)) = connections.remove(&conn_id) {
                debug!(conn_id, peer = %state.peer, "Aborting connection");
                state.abort_handle.abort();
            }
        }

        let stats = runtime.stats();
        info!(
            sessions_served = stats.completed,
            peak_sessions = stats.peak_active,
            "Shutdown complete"
        );
    }
}

/// Tell a client over the connection limit why it is being dropped
async fn refuse(mut stream: TcpStream, timeout: Duration) {
    let msg = ServerMessage::Rejected {
        reason: SERVER_FULL.to_string(),
    };
    match tokio::time::timeout(timeout, write_message(&mut stream, &msg)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Failed to send rejection"),
        Err(_) => debug!("Rejection write timed out"),
    }
}
