/*!
 * Frame Scheduler
 *
 * Best-effort constant frame rate. The time spent capturing and handing
 * off a frame is subtracted from the interval; overruns clamp the wait to
 * zero so the next capture starts immediately. No catch-up bursts.
 */

use std::time::{Duration, Instant};

/// Computes per-frame wait times from a target frame rate
#[derive(Debug, Clone, Copy)]
pub struct FrameScheduler {
    interval: Duration,
}

impl FrameScheduler {
    /// `frame_rate` must be finite and positive (validated by the recorder)
    pub fn new(frame_rate: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / frame_rate),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Mark the start of a capture cycle
    pub fn begin(&self) -> Instant {
        Instant::now()
    }

    /// Wait remaining in the cycle started at `start`, as seen at `now`
    pub fn remaining_after(&self, start: Instant, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(start);
        self.interval.saturating_sub(elapsed)
    }

    /// Wait remaining in the cycle started at `start`
    pub fn remaining(&self, start: Instant) -> Duration {
        self.remaining_after(start, Instant::now())
    }
}
