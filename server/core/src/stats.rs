//! Runtime Counters
//!
//! Process-wide aggregate counters for the session runtime. These are the
//! only values mutated by more than one session task, so every field is an
//! atomic and readers take a [`StatsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters shared by every session task
#[derive(Debug, Default)]
pub struct RuntimeStats {
    started: AtomicU64,
    active: AtomicU64,
    peak_active: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    write_failures: AtomicU64,
    ticks: AtomicU64,
    frames_written: AtomicU64,
}

impl RuntimeStats {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn session_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let active = self.active.fetch_add(1, Ordering::AcqRel) + 1;

        let mut peak = self.peak_active.load(Ordering::Relaxed);
        while active > peak {
            match self.peak_active.compare_exchange_weak(
                peak,
                active,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => peak = x,
            }
        }
    }

    /// Returns the number of sessions still active afterwards
    pub(crate) fn session_ended(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn session_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_written(&self) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Sessions currently running
    #[must_use]
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    /// Point-in-time copy of every counter
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Acquire),
            peak_active: self.peak_active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`RuntimeStats`] at one instant
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Sessions ever started
    pub started: u64,
    /// Sessions running now
    pub active: u64,
    /// Highest concurrent session count seen
    pub peak_active: u64,
    /// Sessions that have ended
    pub completed: u64,
    /// Connections declined before a session started
    pub rejected: u64,
    /// Sessions ended by a failed write
    pub write_failures: u64,
    /// Ticks handled across all sessions
    pub ticks: u64,
    /// Frames written across all sessions
    pub frames_written: u64,
}
