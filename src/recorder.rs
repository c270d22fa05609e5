/*!
 * Recorder
 *
 * Drives an optional video backend and an optional audio backend into one
 * container writer and keeps the two streams in step.
 *
 * Sync modes:
 * - Alternating (video + input audio): frame, block, frame, block, ...
 *   enforced by the `Alternation` turn token, video first
 * - FreeRunning (video + loopback): blocks are written the moment they
 *   arrive; the loopback clock already follows wall time
 * - VideoOnly / AudioOnly: a single producer, written directly
 *
 * Video runs on a dedicated thread that owns the backend. Whatever way
 * that thread exits, a teardown guard stops every wait, stops the audio
 * device and finalizes the writer once. A fault is announced only after
 * that teardown has finished, and the session then reports `Stopped`.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{AudioBlock, AudioCaptureBackend, AudioMode, BlockSink};
use crate::capture::{CaptureOutcome, VideoCaptureBackend};
use crate::error::RecorderError;
use crate::metrics::{RecorderStats, StatsSnapshot};
use crate::sync::{Alternation, FrameScheduler, LoopControl};
use crate::video::FrameBuffer;
use crate::writer::ContainerWriter;

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

/// How video and audio writes are coordinated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    Alternating,
    FreeRunning,
    VideoOnly,
    AudioOnly,
}

impl SyncMode {
    fn detect(has_video: bool, audio: Option<AudioMode>) -> Option<Self> {
        match (has_video, audio) {
            (true, Some(AudioMode::Input)) => Some(SyncMode::Alternating),
            (true, Some(AudioMode::Loopback)) => Some(SyncMode::FreeRunning),
            (true, None) => Some(SyncMode::VideoOnly),
            (false, Some(_)) => Some(SyncMode::AudioOnly),
            (false, None) => None,
        }
    }
}

pub struct RecorderParams {
    pub frame_rate: f64,
    /// Per-frame acquire timeout passed to the video backend
    pub capture_timeout_ms: u32,
    pub video: Option<Box<dyn VideoCaptureBackend>>,
    pub audio: Option<Box<dyn AudioCaptureBackend>>,
    pub writer: Arc<dyn ContainerWriter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    StateChanged(RecordingState),
    /// Terminal fault. Sent once both sources are stopped and the writer
    /// is finalized; `stop` still returns the error itself.
    Failed(String),
}

#[derive(Default)]
struct FaultSlot {
    error: Option<RecorderError>,
    /// Kept after `take_fault` so teardown can still announce it
    message: Option<String>,
    /// Set once `stop` has handed the outcome to the caller
    reported: bool,
    announced: bool,
}

/// State reachable from the capture thread and the audio callback
struct Shared {
    session_id: Uuid,
    control: LoopControl,
    alternation: Alternation,
    writer: Arc<dyn ContainerWriter>,
    audio: Mutex<Option<Box<dyn AudioCaptureBackend>>>,
    stats: RecorderStats,
    fault: Mutex<FaultSlot>,
    /// Held for the whole `finish` call so a second caller waits for it
    writer_finished: Mutex<bool>,
    /// Set once teardown has run; the session can no longer record
    terminated: AtomicBool,
    /// Teardown started from the audio callback in audio-only sessions
    teardown_thread: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<RecorderEvent>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    /// Keep the first fault only; later ones are consequences of it
    fn record_fault(&self, err: RecorderError) {
        let mut slot = lock(&self.fault);
        if slot.message.is_some() || slot.reported {
            debug!(session = %self.session_id, "Ignoring secondary fault: {}", err);
            return;
        }

        error!(session = %self.session_id, "Recording failed: {}", err);
        slot.message = Some(err.to_string());
        slot.error = Some(err);
    }

    fn take_fault(&self) -> Option<RecorderError> {
        let mut slot = lock(&self.fault);
        slot.reported = true;
        slot.error.take()
    }

    fn announce_fault(&self) {
        let mut slot = lock(&self.fault);
        if slot.announced {
            return;
        }
        if let Some(message) = slot.message.clone() {
            slot.announced = true;
            let _ = self.events.send(RecorderEvent::Failed(message));
        }
    }

    /// Release every blocking wait on both sides
    fn request_stop(&self) {
        self.control.stop();
        self.alternation.stop();
    }

    fn stop_audio(&self) {
        if let Some(audio) = lock(&self.audio).as_mut() {
            if let Err(e) = audio.stop() {
                warn!(session = %self.session_id, "Audio stop failed: {}", e);
            }
        }
    }

    fn finish_writer(&self) {
        let mut finished = lock(&self.writer_finished);
        if *finished {
            return;
        }
        *finished = true;
        if let Err(e) = self.writer.finish() {
            self.record_fault(e.into());
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Stop both sources, finalize the writer, then announce any fault
    fn teardown(&self) {
        self.request_stop();
        self.stop_audio();
        self.finish_writer();
        self.terminated.store(true, Ordering::SeqCst);
        self.announce_fault();
    }

    /// Teardown off the device callback, which must not stop its own device
    fn spawn_teardown(self: &Arc<Self>) {
        let mut slot = lock(&self.teardown_thread);
        if slot.is_some() {
            return;
        }

        let shared = Arc::clone(self);
        match thread::Builder::new()
            .name("recorder-teardown".to_string())
            .spawn(move || shared.teardown())
        {
            Ok(handle) => *slot = Some(handle),
            Err(e) => error!(session = %self.session_id, "Failed to spawn teardown thread: {}", e),
        }
    }
}

/// Runs when the capture thread exits, including by panic
struct Teardown {
    shared: Arc<Shared>,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.record_fault(RecorderError::CaptureThreadPanicked);
        }
        self.shared.teardown();
    }
}

/// Video side of the recorder; owns the backend for its whole life
struct CaptureLoop {
    backend: Box<dyn VideoCaptureBackend>,
    shared: Arc<Shared>,
    scheduler: FrameScheduler,
    timeout_ms: u32,
    alternate: bool,
}

impl CaptureLoop {
    fn run(mut self) -> Result<(), RecorderError> {
        let shared = Arc::clone(&self.shared);
        let (width, height) = self.backend.size();
        let mut frame = FrameBuffer::new(width, height);

        info!(
            session = %shared.session_id,
            "Capture loop started: {} {}x{}, interval {:?}",
            self.backend.name(),
            width,
            height,
            self.scheduler.interval()
        );

        loop {
            if !shared.control.wait_while_paused() {
                break;
            }
            let started = self.scheduler.begin();

            if self.alternate && !shared.alternation.wait_video_turn() {
                break;
            }
            if shared.control.is_stopped() {
                break;
            }

            match self.backend.capture(&mut frame, self.timeout_ms)? {
                CaptureOutcome::Fresh => shared.stats.record_captured(),
                // Buffer still holds the previous frame
                CaptureOutcome::Repeat => shared.stats.record_repeated(),
            }

            let pending = shared.writer.write_frame(frame);
            if self.alternate {
                shared.alternation.pass_to_audio();
            }

            let wait = self.scheduler.remaining(started);
            shared.stats.record_cycle(started.elapsed(), wait.is_zero());
            let stopped = shared.control.sleep(wait);

            // Not refilled until the writer hands it back
            frame = pending.wait()?;
            shared.stats.record_frame_written();

            if stopped {
                break;
            }
        }

        info!(
            session = %shared.session_id,
            "Capture loop finished after {} frames",
            shared.stats.frames_written()
        );
        Ok(())
    }
}

/// Synchronized recording session
pub struct Recorder {
    shared: Arc<Shared>,
    mode: SyncMode,
    state: RecordingState,
    scheduler: FrameScheduler,
    capture_timeout_ms: u32,
    /// Moved into the capture thread on start
    video: Option<Box<dyn VideoCaptureBackend>>,
    capture_thread: Option<JoinHandle<()>>,
}

impl Recorder {
    pub fn new(params: RecorderParams) -> Result<Self, RecorderError> {
        let RecorderParams {
            frame_rate,
            capture_timeout_ms,
            video,
            audio,
            writer,
        } = params;

        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(RecorderError::InvalidConfig(format!(
                "frame rate must be positive, got {}",
                frame_rate
            )));
        }

        let mode = SyncMode::detect(video.is_some(), audio.as_ref().map(|a| a.mode()))
            .ok_or(RecorderError::NothingToRecord)?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session_id = Uuid::new_v4();

        info!(session = %session_id, "Recorder created ({:?}, {} fps)", mode, frame_rate);

        Ok(Self {
            shared: Arc::new(Shared {
                session_id,
                control: LoopControl::new(),
                alternation: Alternation::new(),
                writer,
                audio: Mutex::new(audio),
                stats: RecorderStats::new(),
                fault: Mutex::new(FaultSlot::default()),
                writer_finished: Mutex::new(false),
                terminated: AtomicBool::new(false),
                teardown_thread: Mutex::new(None),
                events,
            }),
            mode,
            state: RecordingState::Idle,
            scheduler: FrameScheduler::new(frame_rate),
            capture_timeout_ms,
            video,
            capture_thread: None,
        })
    }

    /// `Stopped` as soon as a fault has torn the session down, even
    /// before `stop` is called
    pub fn state(&self) -> RecordingState {
        if self.shared.is_terminated() {
            RecordingState::Stopped
        } else {
            self.state
        }
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.mode
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.shared.events.subscribe()
    }

    /// Whether the capture thread is still alive
    pub fn is_capturing(&self) -> bool {
        self.capture_thread.as_ref().map_or(false, |h| !h.is_finished())
    }

    fn set_state(&mut self, state: RecordingState) {
        self.state = state;
        info!(session = %self.shared.session_id, "Recorder state: {:?}", state);
        let _ = self.shared.events.send(RecorderEvent::StateChanged(state));
    }

    /// Audio callback body for the current mode
    fn audio_sink(&self) -> BlockSink {
        let shared = Arc::clone(&self.shared);
        let alternate = self.mode == SyncMode::Alternating;
        // With a capture thread its teardown guard does the rest
        let owns_teardown = self.mode == SyncMode::AudioOnly;

        Arc::new(move |block: &AudioBlock<'_>| {
            if shared.control.is_stopped() {
                shared.stats.record_block_dropped();
                return;
            }
            if alternate && !shared.alternation.wait_audio_turn() {
                shared.stats.record_block_dropped();
                return;
            }

            match shared.writer.write_block(block) {
                Ok(()) => shared.stats.record_block_written(),
                // Writer already finalized by teardown
                Err(e) if shared.control.is_stopped() => {
                    debug!("Dropping audio block after stop: {}", e);
                }
                Err(e) => {
                    shared.record_fault(e.into());
                    shared.request_stop();
                    if owns_teardown {
                        shared.spawn_teardown();
                    }
                }
            }

            if alternate {
                shared.alternation.pass_to_video();
            }
        })
    }

    pub fn start(&mut self) -> Result<(), RecorderError> {
        match self.state() {
            RecordingState::Idle => {}
            RecordingState::Recording | RecordingState::Paused => return Ok(()),
            state => {
                return Err(RecorderError::InvalidState {
                    operation: "start",
                    state,
                })
            }
        }

        info!(session = %self.shared.session_id, "Starting recording ({:?})", self.mode);

        if let Some(backend) = self.video.take() {
            let capture = CaptureLoop {
                backend,
                shared: Arc::clone(&self.shared),
                scheduler: self.scheduler,
                timeout_ms: self.capture_timeout_ms,
                alternate: self.mode == SyncMode::Alternating,
            };
            let shared = Arc::clone(&self.shared);

            let handle = thread::Builder::new()
                .name("video-capture".to_string())
                .spawn(move || {
                    let _teardown = Teardown {
                        shared: Arc::clone(&shared),
                    };
                    if let Err(e) = capture.run() {
                        shared.record_fault(e);
                    }
                })
                .map_err(RecorderError::Spawn)?;
            self.capture_thread = Some(handle);
        }

        let sink = self.audio_sink();
        let started = match lock(&self.shared.audio).as_mut() {
            Some(audio) => audio.start(sink),
            None => Ok(()),
        };
        if let Err(e) = started {
            error!(session = %self.shared.session_id, "Audio start failed: {}", e);
            self.shutdown();
            self.shared.take_fault();
            return Err(e.into());
        }

        self.set_state(RecordingState::Recording);
        Ok(())
    }

    /// Stop audio and park the capture loop at its next cycle boundary
    pub fn pause(&mut self) -> Result<(), RecorderError> {
        match self.state() {
            RecordingState::Recording => {}
            RecordingState::Paused => return Ok(()),
            state => {
                return Err(RecorderError::InvalidState {
                    operation: "pause",
                    state,
                })
            }
        }

        self.shared.control.pause();
        // A device callback blocked on its turn must return before the device can stop
        self.shared.alternation.suspend_audio();
        self.shared.stop_audio();

        self.set_state(RecordingState::Paused);
        Ok(())
    }

    /// Restart audio and release the capture loop; a no-op unless paused
    pub fn resume(&mut self) -> Result<(), RecorderError> {
        if self.state() != RecordingState::Paused {
            return Ok(());
        }

        // Back to video-first; nothing left over from before the pause
        self.shared.alternation.reset();

        let sink = self.audio_sink();
        if let Some(audio) = lock(&self.shared.audio).as_mut() {
            audio.start(sink)?;
        }
        self.shared.control.resume();

        self.set_state(RecordingState::Recording);
        Ok(())
    }

    /// Stop everything and finalize the writer.
    ///
    /// Returns the session's fault, if any, the first time; later calls
    /// return `Ok(())`.
    pub fn stop(&mut self) -> Result<(), RecorderError> {
        if self.state == RecordingState::Stopped {
            return Ok(());
        }

        self.shutdown();

        match self.shared.take_fault() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) {
        info!(session = %self.shared.session_id, "Stopping recording");
        self.shared.request_stop();
        self.shared.stop_audio();

        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                self.shared.record_fault(RecorderError::CaptureThreadPanicked);
            }
        }
        let teardown = lock(&self.shared.teardown_thread).take();
        if let Some(handle) = teardown {
            if handle.join().is_err() {
                warn!(session = %self.shared.session_id, "Teardown thread panicked");
            }
        }

        // Never started: release the backend here
        self.video = None;
        self.shared.teardown();

        let stats = self.shared.stats.snapshot();
        info!(
            session = %self.shared.session_id,
            "Recording stopped: {} frames ({} repeated, {} late), {} audio blocks ({} dropped)",
            stats.frames_written,
            stats.frames_repeated,
            stats.frames_late,
            stats.blocks_written,
            stats.blocks_dropped
        );

        self.set_state(RecordingState::Stopped);
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(session = %self.shared.session_id, "Recorder dropped with error: {}", e);
        }
    }
}
