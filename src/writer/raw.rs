/*!
 * Raw Interleaved Stream Writer
 *
 * Uncompressed container: a fixed header followed by tagged chunks in
 * submission order. One worker thread owns the file; frames and blocks
 * travel to it over a single queue, which is what keeps the on-disk order
 * identical to the call order.
 *
 * Layout (little-endian):
 *   "RAVI" | version u16 | width u32 | height u32 | frame rate f64
 *   | has_audio u8 [ | sample_rate u32 | channels u16 | bits u16 | encoding u8 ]
 *   then chunks: tag [u8; 4] | length u32 | payload
 *   tags: "00db" = BGRA frame, "01wb" = PCM block
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{completion_pair, ContainerWriter, PendingWrite, WriteCompletion};
use crate::audio::{AudioBlock, SampleEncoding, WaveFormat};
use crate::error::WriterError;
use crate::video::FrameBuffer;

pub const MAGIC: &[u8; 4] = b"RAVI";
pub const VERSION: u16 = 1;
pub const FRAME_TAG: &[u8; 4] = b"00db";
pub const AUDIO_TAG: &[u8; 4] = b"01wb";

enum Chunk {
    Frame(FrameBuffer, WriteCompletion),
    Audio(Vec<u8>),
}

pub struct RawStreamWriter {
    path: PathBuf,
    width: u32,
    height: u32,
    audio: Option<WaveFormat>,
    /// Taken by `finish`; writes after that fail with `Closed`
    queue: Mutex<Option<mpsc::UnboundedSender<Chunk>>>,
    worker: Mutex<Option<JoinHandle<Result<ChunkCounts, WriterError>>>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ChunkCounts {
    frames: u64,
    blocks: u64,
}

impl RawStreamWriter {
    pub fn create(
        path: &Path,
        width: u32,
        height: u32,
        frame_rate: f64,
        audio: Option<WaveFormat>,
    ) -> Result<Self, WriterError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let mut out = BufWriter::new(File::create(path)?);
        write_header(&mut out, width, height, frame_rate, audio.as_ref())?;

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = std::thread::Builder::new()
            .name("raw-writer".to_string())
            .spawn(move || run_worker(out, rx))?;

        info!(
            "Raw stream writer created: {} ({}x{} @ {} fps, audio: {})",
            path.display(),
            width,
            height,
            frame_rate,
            audio.is_some()
        );

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            audio,
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn queue(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Chunk>>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_header<W: Write>(
    out: &mut W,
    width: u32,
    height: u32,
    frame_rate: f64,
    audio: Option<&WaveFormat>,
) -> std::io::Result<()> {
    out.write_all(MAGIC)?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&width.to_le_bytes())?;
    out.write_all(&height.to_le_bytes())?;
    out.write_all(&frame_rate.to_le_bytes())?;

    match audio {
        Some(format) => {
            out.write_all(&[1])?;
            out.write_all(&format.sample_rate.to_le_bytes())?;
            out.write_all(&format.channels.to_le_bytes())?;
            out.write_all(&format.bits_per_sample.to_le_bytes())?;
            let encoding = match format.encoding {
                SampleEncoding::Int => 0u8,
                SampleEncoding::Float => 1u8,
            };
            out.write_all(&[encoding])?;
        }
        None => out.write_all(&[0])?,
    }
    Ok(())
}

fn write_chunk<W: Write>(out: &mut W, tag: &[u8; 4], payload: &[u8]) -> std::io::Result<()> {
    out.write_all(tag)?;
    out.write_all(&(payload.len() as u32).to_le_bytes())?;
    out.write_all(payload)
}

/// Drains the queue until every sender is gone, then flushes
fn run_worker(
    mut out: BufWriter<File>,
    mut rx: mpsc::UnboundedReceiver<Chunk>,
) -> Result<ChunkCounts, WriterError> {
    let mut counts = ChunkCounts::default();

    while let Some(chunk) = rx.blocking_recv() {
        match chunk {
            Chunk::Frame(frame, completion) => match write_chunk(&mut out, FRAME_TAG, frame.as_bytes()) {
                Ok(()) => {
                    counts.frames += 1;
                    completion.complete(Ok(frame));
                }
                Err(e) => {
                    error!("Frame write failed: {}", e);
                    let kind = e.kind();
                    completion.complete(Err(WriterError::Io(e)));
                    return Err(WriterError::Io(std::io::Error::new(kind, "frame chunk write failed")));
                }
            },
            Chunk::Audio(data) => {
                if let Err(e) = write_chunk(&mut out, AUDIO_TAG, &data) {
                    error!("Audio block write failed: {}", e);
                    return Err(WriterError::Io(e));
                }
                counts.blocks += 1;
            }
        }
    }

    out.flush()?;
    out.into_inner().map_err(|e| WriterError::Io(e.into_error()))?.sync_all()?;

    debug!("Raw writer drained: {} frames, {} blocks", counts.frames, counts.blocks);
    Ok(counts)
}

impl ContainerWriter for RawStreamWriter {
    fn write_frame(&self, frame: FrameBuffer) -> PendingWrite {
        if frame.width() != self.width || frame.height() != self.height {
            return PendingWrite::completed(Err(WriterError::InvalidBlock(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ))));
        }

        let queue = self.queue();
        let Some(tx) = queue.as_ref() else {
            return PendingWrite::completed(Err(WriterError::Closed));
        };

        let (completion, pending) = completion_pair();
        if tx.send(Chunk::Frame(frame, completion)).is_err() {
            // Worker stopped after an I/O error
            return PendingWrite::completed(Err(WriterError::Closed));
        }
        pending
    }

    fn write_block(&self, block: &AudioBlock<'_>) -> Result<(), WriterError> {
        let Some(format) = self.audio else {
            return Err(WriterError::InvalidBlock("stream has no audio track".to_string()));
        };
        if block.format != format {
            return Err(WriterError::InvalidBlock(format!(
                "block format {:?} does not match stream format {:?}",
                block.format, format
            )));
        }

        let queue = self.queue();
        let tx = queue.as_ref().ok_or(WriterError::Closed)?;
        tx.send(Chunk::Audio(block.data.to_vec()))
            .map_err(|_| WriterError::Closed)
    }

    fn finish(&self) -> Result<(), WriterError> {
        // Dropping the sender lets the worker drain and exit
        drop(self.queue().take());

        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(worker) = worker else {
            return Ok(());
        };

        let counts = worker
            .join()
            .map_err(|_| WriterError::Io(std::io::Error::new(std::io::ErrorKind::Other, "writer thread panicked")))??;

        info!(
            "Raw stream finalized: {} ({} frames, {} audio blocks)",
            self.path.display(),
            counts.frames,
            counts.blocks
        );
        Ok(())
    }
}

impl Drop for RawStreamWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!("Failed to finalize {}: {}", self.path.display(), e);
        }
    }
}
