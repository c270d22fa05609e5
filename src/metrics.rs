//! Recording statistics.
//!
//! Lock-free counters updated from the capture thread and the audio
//! callback, plus a plain snapshot type for logging and serialization.
//! Cloning `RecorderStats` shares the same counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Shared counters for one recording session.
#[derive(Clone, Debug)]
pub struct RecorderStats {
    frames_captured: Arc<AtomicU64>,
    frames_repeated: Arc<AtomicU64>,
    frames_written: Arc<AtomicU64>,
    frames_late: Arc<AtomicU64>,
    blocks_written: Arc<AtomicU64>,
    blocks_dropped: Arc<AtomicU64>,
    total_cycle_us: Arc<AtomicU64>,
    started: Instant,
}

impl Default for RecorderStats {
    fn default() -> Self {
        Self {
            frames_captured: Arc::default(),
            frames_repeated: Arc::default(),
            frames_written: Arc::default(),
            frames_late: Arc::default(),
            blocks_written: Arc::default(),
            blocks_dropped: Arc::default(),
            total_cycle_us: Arc::default(),
            started: Instant::now(),
        }
    }
}

impl RecorderStats {
    /// Creates a zeroed collector; uptime counts from here.
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend produced a new frame.
    pub fn record_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    /// A backend had nothing new and the previous frame was resubmitted.
    pub fn record_repeated(&self) {
        self.frames_repeated.fetch_add(1, Ordering::Relaxed);
    }

    /// The writer released a frame buffer successfully.
    pub fn record_frame_written(&self) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    /// One capture cycle finished; `overran` when it used the whole interval.
    pub fn record_cycle(&self, busy: Duration, overran: bool) {
        self.total_cycle_us
            .fetch_add(busy.as_micros() as u64, Ordering::Relaxed);
        if overran {
            self.frames_late.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_block_written(&self) {
        self.blocks_written.fetch_add(1, Ordering::Relaxed);
    }

    /// An audio block arrived while its turn was refused (pause, stop).
    pub fn record_block_dropped(&self) {
        self.blocks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let captured = self.frames_captured.load(Ordering::Relaxed);
        let repeated = self.frames_repeated.load(Ordering::Relaxed);
        let cycles = captured + repeated;
        let avg_cycle_ms = if cycles == 0 {
            0.0
        } else {
            self.total_cycle_us.load(Ordering::Relaxed) as f64 / cycles as f64 / 1000.0
        };

        StatsSnapshot {
            frames_captured: captured,
            frames_repeated: repeated,
            frames_written: self.frames_written(),
            frames_late: self.frames_late.load(Ordering::Relaxed),
            blocks_written: self.blocks_written(),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
            avg_cycle_ms,
            uptime: self.started.elapsed(),
        }
    }
}

/// Plain copy of `RecorderStats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_repeated: u64,
    pub frames_written: u64,
    /// Cycles whose capture and handoff took the whole frame interval.
    pub frames_late: u64,
    pub blocks_written: u64,
    pub blocks_dropped: u64,
    /// Mean capture + handoff time per cycle.
    pub avg_cycle_ms: f64,
    pub uptime: Duration,
}

impl StatsSnapshot {
    /// Frames written per second of uptime.
    pub fn effective_frame_rate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.frames_written as f64 / secs
    }
}
