//! Session Runtime (Multiplexer)
//!
//! Drives one [`SessionProgram`] per inbound connection. Each session runs as
//! its own task and blocks in exactly one place: a `select!` over the next
//! tick, the next input, and the runtime shutdown signal.
//!
//! ```text
//!                        SessionRuntime
//!          ┌──────────────────┼──────────────────┐
//!          │                  │                  │
//!     session-1          session-2          session-3
//!   ┌───────────┐      ┌───────────┐      ┌───────────┐
//!   │ program   │      │ program   │      │ program   │   (exclusively owned)
//!   │ tick timer│      │ tick timer│      │ tick timer│
//!   └─────┬─────┘      └─────┬─────┘      └─────┬─────┘
//!         └──────────────────┴──────────────────┘
//!                 Arc<FrameCatalog>, Arc<StylePalette>   (read-only)
//!                 RuntimeStats, session registry          (atomic / sharded)
//! ```
//!
//! # Lifecycle guarantees
//!
//! - Connections without a terminal are declined before any program exists
//! - A failed or timed-out write ends that session only; nothing is written
//!   to its output afterwards
//! - A closed input channel ends the session without further writes
//! - Registry removal and the active-count decrement happen exactly once, in
//!   a drop guard, so they also run when the task is aborted

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::catalog::{FrameCatalog, StylePalette};
use crate::program::{
    Event, Input, ProgramError, ProgramState, RenderedFrame, SessionProgram,
};
use crate::session::{
    EndReason, FrameSink, SessionError, SessionHandle, SessionId, SessionIds, TerminalInfo,
};
use crate::stats::{RuntimeStats, StatsSnapshot};

/// Default animation rate
pub const DEFAULT_FPS: u32 = 15;

/// Default bound on a single write to a session's output
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Immutable runtime settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Delay between ticks
    pub tick_period: Duration,
    /// Longest a single write may take before the session is dropped
    pub write_timeout: Duration,
    /// Base seed for per-session random sources; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl RuntimeConfig {
    /// Settings for an animation rate in frames per second
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::InvalidTickPeriod`] if `fps` is zero or so
    /// large that the tick period rounds down to zero.
    pub fn from_fps(fps: u32) -> Result<Self, ProgramError> {
        if fps == 0 {
            return Err(ProgramError::InvalidTickPeriod);
        }
        let tick_period = Duration::from_secs(1) / fps;
        if tick_period.is_zero() {
            return Err(ProgramError::InvalidTickPeriod);
        }
        Ok(Self {
            tick_period,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            seed: None,
        })
    }

    /// Set the write timeout
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Make every session's style sequence reproducible
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng_for(&self, id: SessionId) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id.as_u64())),
            None => StdRng::from_entropy(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1) / DEFAULT_FPS,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            seed: None,
        }
    }
}

/// Registry entry for a running session
#[derive(Clone, Debug)]
pub struct SessionInfo {
    /// Remote address
    pub peer: String,
    /// Negotiated terminal
    pub terminal: TerminalInfo,
    /// When the session started
    pub connected_at: Instant,
}

/// Summary of a finished session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    /// Session ID
    pub id: SessionId,
    /// Remote address
    pub peer: String,
    /// Why it ended
    pub end: EndReason,
    /// Ticks handled
    pub ticks: u64,
    /// Frames successfully written, including the initial view
    pub frames_written: u64,
    /// Frame index when the session ended
    pub final_frame_index: usize,
    /// Wall time from start to end
    pub duration: Duration,
}

struct RuntimeInner {
    catalog: Arc<FrameCatalog>,
    palette: Arc<StylePalette>,
    config: RuntimeConfig,
    stats: RuntimeStats,
    ids: SessionIds,
    sessions: DashMap<SessionId, SessionInfo>,
    shutdown: watch::Sender<bool>,
    idle: Notify,
}

/// Spawns and supervises one session task per connection
///
/// Cheap to clone; clones share the catalogs, counters and registry.
#[derive(Clone)]
pub struct SessionRuntime {
    inner: Arc<RuntimeInner>,
}

impl SessionRuntime {
    /// Create a runtime over loaded catalogs
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::InvalidTickPeriod`] if the configured tick
    /// period is zero.
    pub fn new(
        catalog: Arc<FrameCatalog>,
        palette: Arc<StylePalette>,
        config: RuntimeConfig,
    ) -> Result<Self, ProgramError> {
        if config.tick_period.is_zero() {
            return Err(ProgramError::InvalidTickPeriod);
        }
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                catalog,
                palette,
                config,
                stats: RuntimeStats::new(),
                ids: SessionIds::new(),
                sessions: DashMap::new(),
                shutdown,
                idle: Notify::new(),
            }),
        })
    }

    /// Run a session on its own task
    pub fn spawn(&self, handle: SessionHandle) -> JoinHandle<Result<SessionReport, SessionError>> {
        let runtime = self.clone();
        tokio::spawn(async move { runtime.run(handle).await })
    }

    /// Run a session to completion on the current task
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoTerminal`] or [`SessionError::ShuttingDown`]
    /// when the session is declined. Failures after the session has started
    /// are reported through [`SessionReport::end`], not as errors.
    pub async fn run(&self, handle: SessionHandle) -> Result<SessionReport, SessionError> {
        let SessionHandle {
            peer,
            terminal,
            mut input,
            mut output,
        } = handle;

        // Subscribe before checking so a shutdown racing with us is not missed
        let mut shutdown = self.inner.shutdown.subscribe();

        let Some(terminal) = terminal else {
            return self
                .inner
                .decline(&peer, &mut *output, SessionError::NoTerminal)
                .await;
        };
        let stopping = *shutdown.borrow();
        if stopping {
            return self
                .inner
                .decline(&peer, &mut *output, SessionError::ShuttingDown)
                .await;
        }

        let id = self.inner.ids.next();
        let mut program = SessionProgram::new(
            Arc::clone(&self.inner.catalog),
            Arc::clone(&self.inner.palette),
            self.inner.config.tick_period,
            self.inner.config.rng_for(id),
        )?;

        let started = Instant::now();
        let _active = ActiveSession::register(
            Arc::clone(&self.inner),
            id,
            SessionInfo {
                peer: peer.clone(),
                terminal: terminal.clone(),
                connected_at: started,
            },
        );

        info!(
            session_id = %id,
            peer = %peer,
            term = %terminal.term,
            cols = terminal.cols,
            rows = terminal.rows,
            active_sessions = self.inner.stats.active(),
            "Session started"
        );

        let mut frames_written = 0;
        let end = self
            .inner
            .event_loop(
                id,
                &mut program,
                &mut input,
                &mut *output,
                &mut shutdown,
                &mut frames_written,
            )
            .instrument(tracing::info_span!("session", session_id = %id))
            .await;

        if matches!(end, EndReason::Quit | EndReason::Shutdown) {
            if let Err(e) = self.inner.bounded(output.finish(end)).await {
                debug!(session_id = %id, error = %e, "Failed to send goodbye");
            }
        }

        let report = SessionReport {
            id,
            peer,
            end,
            ticks: program.ticks(),
            frames_written,
            final_frame_index: program.frame_index(),
            duration: started.elapsed(),
        };

        info!(
            session_id = %id,
            peer = %report.peer,
            end = %end,
            ticks = report.ticks,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "Session ended"
        );

        Ok(report)
    }

    /// Stop accepting sessions and ask every running session to end
    pub fn shutdown(&self) {
        if !self.inner.shutdown.send_replace(true) {
            info!(
                active_sessions = self.inner.stats.active(),
                "Session runtime shutting down"
            );
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Wait until no session is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.stats.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of running sessions
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Registry entries for every running session
    #[must_use]
    pub fn sessions(&self) -> Vec<(SessionId, SessionInfo)> {
        self.inner
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Snapshot of the aggregate counters
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Runtime settings
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Shared frame catalog
    #[must_use]
    pub fn catalog(&self) -> &Arc<FrameCatalog> {
        &self.inner.catalog
    }

    /// Shared style palette
    #[must_use]
    pub fn palette(&self) -> &Arc<StylePalette> {
        &self.inner.palette
    }
}

impl RuntimeInner {
    async fn event_loop(
        &self,
        id: SessionId,
        program: &mut SessionProgram,
        inputs: &mut mpsc::Receiver<Input>,
        output: &mut dyn FrameSink,
        shutdown: &mut watch::Receiver<bool>,
        frames_written: &mut u64,
    ) -> EndReason {
        let started = self.bounded(output.start(id, program.tick_period())).await;
        let initial = match started {
            Ok(()) => self.write(output, program.view()).await,
            Err(e) => Err(e),
        };
        if let Err(error) = initial {
            return self.write_failed(program, &error);
        }
        *frames_written += 1;

        let tick = tokio::time::sleep(program.tick_period());
        tokio::pin!(tick);

        loop {
            tokio::select! {
                () = &mut tick, if !program.is_terminated() => {
                    let update = program.handle(Event::Tick);
                    self.stats.tick();

                    if let Some(frame) = update.frame {
                        if let Err(error) = self.write(output, frame).await {
                            return self.write_failed(program, &error);
                        }
                        *frames_written += 1;
                    }

                    if let Some(period) = program.next_tick() {
                        tick.as_mut().reset(tokio::time::Instant::now() + period);
                    }
                }

                input = inputs.recv() => match input {
                    Some(input) => {
                        debug!(?input, "Input received");
                        if program.handle(Event::Input(input)).state == ProgramState::Terminated {
                            return EndReason::Quit;
                        }
                    }
                    None => {
                        debug!("Input closed");
                        program.handle(Event::Input(Input::Interrupt));
                        return EndReason::Disconnected;
                    }
                },

                _ = shutdown.changed() => {
                    program.handle(Event::Input(Input::Interrupt));
                    return EndReason::Shutdown;
                }
            }
        }
    }

    fn write_failed(&self, program: &mut SessionProgram, error: &SessionError) -> EndReason {
        warn!(error = %error, "Write failed, ending session");
        self.stats.write_failed();
        program.handle(Event::Input(Input::Interrupt));
        EndReason::WriteFailed
    }

    async fn write(
        &self,
        output: &mut dyn FrameSink,
        frame: RenderedFrame,
    ) -> Result<(), SessionError> {
        self.bounded(output.send(frame)).await?;
        self.stats.frame_written();
        Ok(())
    }

    async fn bounded<F>(&self, op: F) -> Result<(), SessionError>
    where
        F: Future<Output = Result<(), SessionError>>,
    {
        match tokio::time::timeout(self.config.write_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::WriteTimeout(self.config.write_timeout)),
        }
    }

    async fn decline(
        &self,
        peer: &str,
        output: &mut dyn FrameSink,
        error: SessionError,
    ) -> Result<SessionReport, SessionError> {
        self.stats.session_rejected();
        warn!(peer = %peer, reason = %error, "Session declined");
        if let Err(e) = self.bounded(output.reject(&error)).await {
            debug!(peer = %peer, error = %e, "Failed to deliver rejection");
        }
        Err(error)
    }
}

/// Registry membership for one session; released on drop
struct ActiveSession {
    inner: Arc<RuntimeInner>,
    id: SessionId,
}

impl ActiveSession {
    fn register(inner: Arc<RuntimeInner>, id: SessionId, info: SessionInfo) -> Self {
        inner.sessions.insert(id, info);
        inner.stats.session_started();
        Self { inner, id }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.inner.sessions.remove(&self.id);
        if self.inner.stats.session_ended() == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}
