/*!
 * Silence Renderer
 *
 * Plays zeros on an output device. Loopback capture only delivers blocks
 * while the device is rendering something; this keeps it rendering.
 */

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tracing::{debug, warn};

use crate::error::AudioError;

pub struct SilenceRenderer {
    stream: Option<cpal::Stream>,
}

impl SilenceRenderer {
    pub fn new(device: &cpal::Device, config: &StreamConfig, sample_format: SampleFormat) -> Result<Self, AudioError> {
        if !sample_format.is_int() && !sample_format.is_float() {
            // Zero bytes are only silence for signed and float samples
            return Err(AudioError::UnsupportedFormat(format!(
                "cannot render silence as {:?}",
                sample_format
            )));
        }

        let config = StreamConfig {
            buffer_size: cpal::BufferSize::Default,
            ..config.clone()
        };

        let stream = device.build_output_stream_raw(
            &config,
            sample_format,
            |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                data.bytes_mut().fill(0);
            },
            |err| warn!("Silence renderer stream error: {}", err),
            None,
        )?;

        Ok(Self { stream: Some(stream) })
    }

    pub fn start(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = &self.stream {
            stream.play()?;
            debug!("Silence renderer started");
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause silence renderer: {}", e);
            }
            debug!("Silence renderer stopped");
        }
    }
}

impl Drop for SilenceRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}
