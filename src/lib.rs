/*!
 * Desktop Recorder Library
 *
 * Synchronized desktop video and audio capture into a single container.
 */

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod recorder;
pub mod sync;
pub mod video;
pub mod writer;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use audio::{AudioBlock, AudioCaptureBackend, AudioMode, WaveFormat};
pub use capture::{CaptureOutcome, Rect, VideoCaptureBackend};
pub use config::{AudioSelection, RecorderConfig, VideoSource};
pub use error::{AudioError, CaptureError, RecorderError, WriterError};
pub use recorder::{Recorder, RecorderEvent, RecorderParams, RecordingState, SyncMode};
pub use video::FrameBuffer;
pub use writer::{ContainerWriter, RawStreamWriter, WavWriter};
