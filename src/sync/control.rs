/*!
 * Capture Loop Control
 *
 * Cooperative stop and pause for the capture thread. The loop checks the
 * pause gate at the top of every cycle, so it only ever parks between
 * frames and never while holding a GPU resource. Every blocking wait here
 * also observes stop.
 */

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct ControlState {
    stopped: bool,
    paused: bool,
}

/// Stop signal, pause gate and stop-aware sleep
#[derive(Debug, Default)]
pub struct LoopControl {
    state: Mutex<ControlState>,
    changed: Condvar,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Request stop; wakes every waiter
    pub fn stop(&self) {
        self.lock().stopped = true;
        self.changed.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn pause(&self) {
        self.lock().paused = true;
        self.changed.notify_all();
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        self.changed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Park while paused. Returns `false` once stop has been requested.
    pub fn wait_while_paused(&self) -> bool {
        let guard = self.lock();
        let guard = self
            .changed
            .wait_while(guard, |s| s.paused && !s.stopped)
            .unwrap_or_else(|e| e.into_inner());
        !guard.stopped
    }

    /// Sleep for `duration` unless stop is requested first.
    /// Returns `true` if stop was observed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let guard = self.lock();
        if duration.is_zero() {
            return guard.stopped;
        }
        let (guard, _timeout) = self
            .changed
            .wait_timeout_while(guard, duration, |s| !s.stopped)
            .unwrap_or_else(|e| e.into_inner());
        guard.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_gate_open_by_default() {
        let control = LoopControl::new();
        assert!(control.wait_while_paused());
        assert!(!control.is_paused());
    }

    #[test]
    fn test_gate_blocks_until_resume() {
        let control = Arc::new(LoopControl::new());
        control.pause();

        let waiter = {
            let control = control.clone();
            thread::spawn(move || control.wait_while_paused())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        control.resume();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_stop_releases_paused_gate() {
        let control = Arc::new(LoopControl::new());
        control.pause();

        let waiter = {
            let control = control.clone();
            thread::spawn(move || control.wait_while_paused())
        };

        thread::sleep(Duration::from_millis(20));
        control.stop();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_sleep_runs_full_duration_without_stop() {
        let control = LoopControl::new();
        let start = Instant::now();
        assert!(!control.sleep(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_sleep_cut_short_by_stop() {
        let control = Arc::new(LoopControl::new());

        let sleeper = {
            let control = control.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let stopped = control.sleep(Duration::from_secs(10));
                (stopped, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        control.stop();

        let (stopped, elapsed) = sleeper.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_zero_sleep_reports_stop() {
        let control = LoopControl::new();
        assert!(!control.sleep(Duration::ZERO));
        control.stop();
        assert!(control.sleep(Duration::ZERO));
    }
}
