/*!
 * Error Types
 *
 * Typed failures for capture backends, audio devices, container writers
 * and the recorder itself. Transient conditions (a duplication timeout)
 * never show up here; they are absorbed by the backend as a repeat frame.
 */

use thiserror::Error;

use crate::recorder::RecordingState;

/// Video capture backend failures
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Requested graphics adapter does not exist
    #[error("graphics adapter {0} not found")]
    AdapterNotFound(u32),

    /// Requested output does not exist on the adapter
    #[error("output {output} not found on adapter {adapter}")]
    OutputNotFound { adapter: u32, output: u32 },

    /// Another process already holds the maximum number of duplication sessions
    #[error("maximum number of desktop duplication sessions already in use; close another capture application and retry")]
    SessionLimitReached,

    /// The platform cannot provide this capture method
    #[error("capture method not supported on this system: {0}")]
    Unsupported(String),

    /// Duplication access lost (mode change, secure desktop, ...); the backend must be re-created
    #[error("desktop duplication access lost; the capture backend must be re-created")]
    AccessLost,

    /// Frame acquisition failed for a reason other than timeout
    #[error("failed to acquire next frame: {0}")]
    AcquireFailed(String),

    /// Capture region does not fit the source
    #[error("capture region {width}x{height} at ({x}, {y}) is outside the source bounds")]
    InvalidRegion { x: i32, y: i32, width: u32, height: u32 },

    /// Any other platform API failure
    #[error("platform capture error: {0}")]
    Platform(String),
}

impl CaptureError {
    /// Errors raised while building a backend, before any recording starts
    pub fn is_construction_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::AdapterNotFound(_)
                | CaptureError::OutputNotFound { .. }
                | CaptureError::SessionLimitReached
                | CaptureError::Unsupported(_)
                | CaptureError::InvalidRegion { .. }
        )
    }

    /// The backend instance is unusable and has to be rebuilt from scratch
    pub fn requires_recreate(&self) -> bool {
        matches!(self, CaptureError::AccessLost)
    }

    /// A different capture method may still work
    pub fn allows_fallback(&self) -> bool {
        matches!(self, CaptureError::Unsupported(_) | CaptureError::SessionLimitReached)
    }
}

/// Audio device failures
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query device format: {0}")]
    Format(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build audio stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("failed to pause audio stream: {0}")]
    Pause(#[from] cpal::PauseStreamError),

    #[error("audio device thread failed: {0}")]
    DeviceThread(String),
}

/// Container writer failures
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("container I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wav encoding error: {0}")]
    Wav(#[from] hound::Error),

    /// Writer already finalized
    #[error("container writer is closed")]
    Closed,

    /// Writer dropped a pending write without completing it
    #[error("pending frame write was abandoned by the writer")]
    Abandoned,

    #[error("container has no video stream")]
    NoVideoStream,

    #[error("invalid audio block: {0}")]
    InvalidBlock(String),
}

/// Recorder (synchronizer) failures
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("invalid recorder configuration: {0}")]
    InvalidConfig(String),

    #[error("nothing to record: neither a video nor an audio source was selected")]
    NothingToRecord,

    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: RecordingState,
    },

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("capture thread panicked")]
    CaptureThreadPanicked,
}
