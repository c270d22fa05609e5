/*!
 * Video/Audio Alternation
 *
 * One-slot turn handoff that forces the capture thread and the audio
 * device callback to write strictly 1:1 (frame, block, frame, block, ...).
 *
 * The turn starts with video. The video side passes the turn once its
 * frame has been submitted; the audio side passes it back once its block
 * has been written. Stop releases both sides for good; suspend
 * releases only audio waiters (used while pausing so a blocked device
 * callback can return before the device is stopped).
 */

use std::sync::{Condvar, Mutex, MutexGuard};

/// Whose write comes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Video,
    Audio,
}

#[derive(Debug)]
struct HandoffState {
    turn: Turn,
    stopped: bool,
    audio_suspended: bool,
}

impl Default for HandoffState {
    fn default() -> Self {
        Self {
            turn: Turn::Video,
            stopped: false,
            audio_suspended: false,
        }
    }
}

/// Rendezvous between one video producer and one audio producer
#[derive(Debug, Default)]
pub struct Alternation {
    state: Mutex<HandoffState>,
    changed: Condvar,
}

impl Alternation {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HandoffState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn turn(&self) -> Turn {
        self.lock().turn
    }

    /// Block until video may write. Returns `false` if stop won.
    pub fn wait_video_turn(&self) -> bool {
        let guard = self.lock();
        let guard = self
            .changed
            .wait_while(guard, |s| s.turn != Turn::Video && !s.stopped)
            .unwrap_or_else(|e| e.into_inner());
        !guard.stopped
    }

    /// Video frame written: audio may write its block
    pub fn pass_to_audio(&self) {
        self.lock().turn = Turn::Audio;
        self.changed.notify_all();
    }

    /// Block until audio may write. Returns `false` if stop won or audio is suspended.
    pub fn wait_audio_turn(&self) -> bool {
        let guard = self.lock();
        let guard = self
            .changed
            .wait_while(guard, |s| {
                s.turn != Turn::Audio && !s.stopped && !s.audio_suspended
            })
            .unwrap_or_else(|e| e.into_inner());
        guard.turn == Turn::Audio && !guard.stopped && !guard.audio_suspended
    }

    /// Audio block written: video may write its next frame
    pub fn pass_to_video(&self) {
        self.lock().turn = Turn::Video;
        self.changed.notify_all();
    }

    /// Release and refuse audio waiters until the next `reset`
    pub fn suspend_audio(&self) {
        self.lock().audio_suspended = true;
        self.changed.notify_all();
    }

    /// Back to the initial state: video first, audio not suspended
    pub fn reset(&self) {
        let mut state = self.lock();
        state.turn = Turn::Video;
        state.audio_suspended = false;
        drop(state);
        self.changed.notify_all();
    }

    /// Terminal: releases every waiter on both sides
    pub fn stop(&self) {
        self.lock().stopped = true;
        self.changed.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }
}
