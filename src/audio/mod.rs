/*!
 * Audio Capture Module
 *
 * Push-driven audio capture: the device hands fixed-size PCM blocks to a
 * sink from its own callback thread. Two modes:
 * - Input: a recording device (microphone, line-in); paced by the device
 * - Loopback: what an output device is playing; kept ticking by a silence
 *   renderer so blocks keep arriving while nothing else plays
 */

pub mod device;
pub mod silence;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AudioSelection;
use crate::error::AudioError;

/// Blocks the device must be able to queue. A fixed per-callback period is
/// only requested when the host's buffer range holds this many of them.
pub const DEVICE_BUFFER_COUNT: u32 = 3;

/// Sample representation inside a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// Signed little-endian PCM
    Int,
    /// IEEE float little-endian
    Float,
}

/// PCM layout of every block a backend delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub encoding: SampleEncoding,
}

impl WaveFormat {
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            encoding: SampleEncoding::Int,
        }
    }

    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
            encoding: SampleEncoding::Float,
        }
    }

    /// Bytes per sample frame (all channels)
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Sample frames covering `duration`, rounded up
    pub fn frames_for(&self, duration: Duration) -> u32 {
        (duration.as_secs_f64() * self.sample_rate as f64).ceil() as u32
    }
}

/// Whether the device records its own input or another device's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioMode {
    Input,
    Loopback,
}

/// One device callback's worth of PCM. Borrowed: valid only for the
/// duration of the sink call.
#[derive(Debug, Clone, Copy)]
pub struct AudioBlock<'a> {
    pub data: &'a [u8],
    pub format: WaveFormat,
    pub arrived: Instant,
}

impl<'a> AudioBlock<'a> {
    pub fn new(data: &'a [u8], format: WaveFormat) -> Self {
        Self {
            data,
            format,
            arrived: Instant::now(),
        }
    }

    /// Whole sample frames in the block
    pub fn frames(&self) -> usize {
        match self.format.block_align() {
            0 => 0,
            align => self.data.len() / align as usize,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.format.sample_rate as f64)
    }
}

/// Receiver of audio blocks, called on the device thread
pub type BlockSink = Arc<dyn Fn(&AudioBlock<'_>) + Send + Sync>;

/// A push-driven audio source.
///
/// `start` may be called again after `stop`; capture restarts with the
/// new sink. `Send` so the recorder can stop it from the capture thread;
/// backends whose streams are pinned to a thread keep them on an owner
/// thread of their own.
pub trait AudioCaptureBackend: Send {
    fn mode(&self) -> AudioMode;

    fn format(&self) -> WaveFormat;

    fn start(&mut self, sink: BlockSink) -> Result<(), AudioError>;

    /// Stop delivering blocks. Returns once no further sink call can start.
    fn stop(&mut self) -> Result<(), AudioError>;
}

/// Device frames per callback so one block spans about one video frame
pub fn block_frames(sample_rate: u32, frame_rate: f64) -> u32 {
    (sample_rate as f64 / frame_rate).ceil().max(1.0) as u32
}

/// Build the selected audio backend; `Ok(None)` when audio is off
pub fn create_audio_backend(
    selection: &AudioSelection,
    frame_rate: f64,
) -> Result<Option<Box<dyn AudioCaptureBackend>>, AudioError> {
    let (mode, device) = match selection {
        AudioSelection::None => return Ok(None),
        AudioSelection::Input { device } => (AudioMode::Input, device.as_deref()),
        AudioSelection::Loopback { device } => (AudioMode::Loopback, device.as_deref()),
    };

    info!(
        "Creating {:?} audio backend (device: {})",
        mode,
        device.unwrap_or("default")
    );

    let backend = device::CpalCapture::new(mode, device, frame_rate)?;
    Ok(Some(Box::new(backend)))
}
