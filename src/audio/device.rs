/*!
 * Device Audio Capture (cpal)
 *
 * Input mode opens a recording device. Loopback mode opens an output
 * device for capture (WASAPI loopback on Windows) and plays silence on it
 * so the device clock keeps producing blocks during quiet periods.
 *
 * cpal streams stay on the thread that built them, so every `start` spawns
 * an owner thread that builds and plays the stream, then parks on a
 * command queue until `stop`. The backend itself only holds the queue and
 * the join handle and can be stopped from any thread.
 */

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, StreamConfig, SupportedBufferSize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::silence::SilenceRenderer;
use super::{block_frames, AudioBlock, AudioCaptureBackend, AudioMode, BlockSink, WaveFormat, DEVICE_BUFFER_COUNT};
use crate::error::AudioError;

/// Everything the owner thread needs to open the stream
#[derive(Clone)]
struct StreamSpec {
    mode: AudioMode,
    device: cpal::Device,
    device_name: String,
    config: StreamConfig,
    sample_format: SampleFormat,
    format: WaveFormat,
    /// Requested frames per callback, `None` when the host picks
    fixed_frames: Option<u32>,
}

enum DeviceCommand {
    Stop,
}

struct DeviceWorker {
    commands: mpsc::UnboundedSender<DeviceCommand>,
    handle: JoinHandle<Result<(), AudioError>>,
}

pub struct CpalCapture {
    spec: StreamSpec,
    worker: Option<DeviceWorker>,
}

/// Fixed period of `wanted` frames when the host can queue
/// `DEVICE_BUFFER_COUNT` such periods; `None` leaves sizing to the host
pub fn fixed_buffer_frames(supported: &SupportedBufferSize, wanted: u32) -> Option<u32> {
    match supported {
        SupportedBufferSize::Range { min, max } => {
            let queued = wanted.saturating_mul(DEVICE_BUFFER_COUNT);
            if wanted >= *min && queued <= *max {
                Some(wanted)
            } else {
                None
            }
        }
        SupportedBufferSize::Unknown => Some(wanted),
    }
}

impl CpalCapture {
    /// Open `device_name` (or the default device) for `mode`
    pub fn new(mode: AudioMode, device_name: Option<&str>, frame_rate: f64) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = find_device(&host, mode, device_name)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = match mode {
            AudioMode::Input => device.default_input_config()?,
            AudioMode::Loopback => device.default_output_config()?,
        };

        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;

        let format = match sample_format {
            SampleFormat::I16 => WaveFormat::pcm16(sample_rate, channels),
            SampleFormat::I32 => WaveFormat {
                bits_per_sample: 32,
                ..WaveFormat::pcm16(sample_rate, channels)
            },
            SampleFormat::F32 => WaveFormat::float32(sample_rate, channels),
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        };

        let wanted = block_frames(sample_rate, frame_rate);
        let fixed_frames = fixed_buffer_frames(supported.buffer_size(), wanted);
        match (fixed_frames, supported.buffer_size()) {
            (None, SupportedBufferSize::Range { min, max }) => warn!(
                "Device '{}' buffer range {}..={} frames cannot queue {} x {} frames; using host default",
                device_name, min, max, DEVICE_BUFFER_COUNT, wanted
            ),
            (Some(_), SupportedBufferSize::Unknown) => {
                debug!("Device '{}' does not report a buffer range; requesting {} frames", device_name, wanted)
            }
            _ => {}
        }

        let mut config: StreamConfig = supported.config();
        config.buffer_size = match fixed_frames {
            Some(frames) => BufferSize::Fixed(frames),
            None => BufferSize::Default,
        };

        info!(
            "Audio device '{}' ({:?}): {} Hz, {} ch, {:?}, {} frames x {} buffers",
            device_name, mode, sample_rate, channels, sample_format, wanted, DEVICE_BUFFER_COUNT
        );

        Ok(Self {
            spec: StreamSpec {
                mode,
                device,
                device_name,
                config,
                sample_format,
                format,
                fixed_frames,
            },
            worker: None,
        })
    }
}

impl StreamSpec {
    fn build_stream(&self, sink: BlockSink) -> Result<cpal::Stream, AudioError> {
        let format = self.format;

        let build = |config: &StreamConfig, sink: BlockSink| {
            let name = self.device_name.clone();
            self.device.build_input_stream_raw(
                config,
                self.sample_format,
                move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                    let block = AudioBlock::new(data.bytes(), format);
                    sink(&block);
                },
                move |err| error!("Audio stream error on '{}': {}", name, err),
                None,
            )
        };

        match build(&self.config, sink.clone()) {
            Ok(stream) => Ok(stream),
            Err(e) if self.fixed_frames.is_some() => {
                warn!(
                    "Fixed audio buffer rejected by '{}' ({}); retrying with host default",
                    self.device_name, e
                );
                let config = StreamConfig {
                    buffer_size: BufferSize::Default,
                    ..self.config.clone()
                };
                Ok(build(&config, sink)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Build and play; loopback starts its silence renderer first
    fn open(&self, sink: BlockSink) -> Result<(cpal::Stream, Option<SilenceRenderer>), AudioError> {
        // Loopback only ticks while something plays on the device
        let silence = match self.mode {
            AudioMode::Loopback => {
                let mut silence = SilenceRenderer::new(&self.device, &self.config, self.sample_format)?;
                silence.start()?;
                Some(silence)
            }
            AudioMode::Input => None,
        };

        let stream = self.build_stream(sink)?;
        stream.play()?;
        Ok((stream, silence))
    }
}

/// Owner thread body: open, report readiness, park until told to stop
fn run_device(
    spec: StreamSpec,
    sink: BlockSink,
    ready: std_mpsc::SyncSender<Result<(), AudioError>>,
    mut commands: mpsc::UnboundedReceiver<DeviceCommand>,
) -> Result<(), AudioError> {
    let (stream, mut silence) = match spec.open(sink) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return Ok(());
        }
    };
    let _ = ready.send(Ok(()));

    // A dropped sender also means stop
    match commands.blocking_recv() {
        Some(DeviceCommand::Stop) | None => {}
    }

    let paused = stream.pause();
    // Dropping the stream waits for the callback to return
    drop(stream);
    if let Some(silence) = silence.as_mut() {
        silence.stop();
    }
    paused.map_err(AudioError::from)
}

fn find_device(host: &cpal::Host, mode: AudioMode, name: Option<&str>) -> Result<cpal::Device, AudioError> {
    match (mode, name) {
        (AudioMode::Input, Some(name)) => host
            .input_devices()?
            .find(|d| d.name().unwrap_or_default() == name)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        (AudioMode::Loopback, Some(name)) => host
            .output_devices()?
            .find(|d| d.name().unwrap_or_default() == name)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        (AudioMode::Input, None) => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("default input device".to_string())),
        (AudioMode::Loopback, None) => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("default output device".to_string())),
    }
}

impl AudioCaptureBackend for CpalCapture {
    fn mode(&self) -> AudioMode {
        self.spec.mode
    }

    fn format(&self) -> WaveFormat {
        self.spec.format
    }

    fn start(&mut self, sink: BlockSink) -> Result<(), AudioError> {
        if self.worker.is_some() {
            debug!("Audio capture on '{}' already running", self.spec.device_name);
            return Ok(());
        }

        let spec = self.spec.clone();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let handle = std::thread::Builder::new()
            .name("audio-device".to_string())
            .spawn(move || run_device(spec, sink, ready_tx, commands_rx))
            .map_err(|e| AudioError::DeviceThread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::DeviceThread("exited before the stream opened".to_string()));
            }
        }

        self.worker = Some(DeviceWorker { commands, handle });
        info!("Audio capture started on '{}'", self.spec.device_name);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let _ = worker.commands.send(DeviceCommand::Stop);
        let result = worker
            .handle
            .join()
            .map_err(|_| AudioError::DeviceThread("panicked".to_string()))?;

        info!("Audio capture stopped on '{}'", self.spec.device_name);
        result
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Error stopping audio capture on drop: {}", e);
        }
    }
}
