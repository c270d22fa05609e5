/*!
 * WAV Writer
 *
 * Audio-only sessions go straight to a WAV file through `hound`. Blocks
 * are written synchronously from the device callback.
 */

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use hound::{SampleFormat, WavSpec};
use tracing::{error, info};

use super::{ContainerWriter, PendingWrite};
use crate::audio::{AudioBlock, SampleEncoding, WaveFormat};
use crate::error::WriterError;
use crate::video::FrameBuffer;

type FileWriter = hound::WavWriter<BufWriter<File>>;

pub struct WavWriter {
    path: PathBuf,
    format: WaveFormat,
    /// `None` once finalized
    inner: Mutex<Option<FileWriter>>,
}

impl WavWriter {
    pub fn create(path: &Path, format: WaveFormat) -> Result<Self, WriterError> {
        let sample_format = match (format.encoding, format.bits_per_sample) {
            (SampleEncoding::Int, 16) | (SampleEncoding::Int, 32) => SampleFormat::Int,
            (SampleEncoding::Float, 32) => SampleFormat::Float,
            (encoding, bits) => {
                return Err(WriterError::InvalidBlock(format!(
                    "unsupported wave format: {:?} {} bit",
                    encoding, bits
                )))
            }
        };

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            sample_format,
        };
        let writer = hound::WavWriter::create(path, spec)?;

        info!(
            "WAV writer created: {} ({} Hz, {} ch, {} bit)",
            path.display(),
            format.sample_rate,
            format.channels,
            format.bits_per_sample
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            inner: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn inner(&self) -> MutexGuard<'_, Option<FileWriter>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_samples(writer: &mut FileWriter, block: &AudioBlock<'_>) -> Result<(), WriterError> {
    let format = block.format;
    match (format.encoding, format.bits_per_sample) {
        (SampleEncoding::Int, 16) => {
            for bytes in block.data.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))?;
            }
        }
        (SampleEncoding::Int, 32) => {
            for bytes in block.data.chunks_exact(4) {
                writer.write_sample(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))?;
            }
        }
        (SampleEncoding::Float, 32) => {
            for bytes in block.data.chunks_exact(4) {
                writer.write_sample(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))?;
            }
        }
        (encoding, bits) => {
            return Err(WriterError::InvalidBlock(format!("{:?} {} bit", encoding, bits)));
        }
    }
    Ok(())
}

impl ContainerWriter for WavWriter {
    fn write_frame(&self, _frame: FrameBuffer) -> PendingWrite {
        PendingWrite::completed(Err(WriterError::NoVideoStream))
    }

    fn write_block(&self, block: &AudioBlock<'_>) -> Result<(), WriterError> {
        if block.format != self.format {
            return Err(WriterError::InvalidBlock(format!(
                "block format {:?} does not match file format {:?}",
                block.format, self.format
            )));
        }

        let mut inner = self.inner();
        let writer = inner.as_mut().ok_or(WriterError::Closed)?;
        write_samples(writer, block)
    }

    fn finish(&self) -> Result<(), WriterError> {
        let Some(writer) = self.inner().take() else {
            return Ok(());
        };

        let samples = writer.len();
        writer.finalize()?;

        info!("WAV finalized: {} ({} samples)", self.path.display(), samples);
        Ok(())
    }
}

impl Drop for WavWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!("Failed to finalize {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("desktop-recorder-{}-{}.wav", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_pcm16_samples_written() {
        let path = temp_path("pcm16");
        let format = WaveFormat::pcm16(8_000, 1);
        let writer = WavWriter::create(&path, format).unwrap();

        let samples: Vec<u8> = [100i16, -100, 32_000, -32_000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        writer.write_block(&AudioBlock::new(&samples, format)).unwrap();
        writer.write_block(&AudioBlock::new(&samples, format)).unwrap();
        writer.finish().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8_000);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![100, -100, 32_000, -32_000, 100, -100, 32_000, -32_000]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_float_samples_written() {
        let path = temp_path("float");
        let format = WaveFormat::float32(48_000, 2);
        let writer = WavWriter::create(&path, format).unwrap();

        let samples: Vec<u8> = [0.5f32, -0.25].iter().flat_map(|s| s.to_le_bytes()).collect();
        writer.write_block(&AudioBlock::new(&samples, format)).unwrap();
        writer.finish().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![0.5, -0.25]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_frames_rejected() {
        let path = temp_path("frames");
        let writer = WavWriter::create(&path, WaveFormat::pcm16(8_000, 1)).unwrap();

        let result = writer.write_frame(FrameBuffer::new(2, 2)).wait();
        assert!(matches!(result, Err(WriterError::NoVideoStream)));

        writer.finish().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_mismatched_block_format() {
        let path = temp_path("mismatch");
        let writer = WavWriter::create(&path, WaveFormat::pcm16(8_000, 1)).unwrap();

        let samples = [0u8; 8];
        let result = writer.write_block(&AudioBlock::new(&samples, WaveFormat::pcm16(44_100, 2)));
        assert!(matches!(result, Err(WriterError::InvalidBlock(_))));

        writer.finish().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_write_after_finish_is_closed() {
        let path = temp_path("closed");
        let format = WaveFormat::pcm16(8_000, 1);
        let writer = WavWriter::create(&path, format).unwrap();

        writer.finish().unwrap();
        writer.finish().unwrap();

        let samples = [0u8; 2];
        assert!(matches!(
            writer.write_block(&AudioBlock::new(&samples, format)),
            Err(WriterError::Closed)
        ));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unsupported_format() {
        let format = WaveFormat {
            bits_per_sample: 24,
            ..WaveFormat::pcm16(8_000, 1)
        };
        assert!(WavWriter::create(&temp_path("24bit"), format).is_err());
    }
}
