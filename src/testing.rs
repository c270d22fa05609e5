/*!
 * Test Fakes
 *
 * In-memory stand-ins for the capture backends and the container writer,
 * instrumented so tests can assert on write order, buffer ownership and
 * teardown.
 */

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{AudioBlock, AudioCaptureBackend, AudioMode, BlockSink, WaveFormat};
use crate::capture::{CaptureOutcome, VideoCaptureBackend};
use crate::error::{AudioError, CaptureError, WriterError};
use crate::video::FrameBuffer;
use crate::writer::{completion_pair, ContainerWriter, PendingWrite};

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// One entry in the writer's submission log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEvent {
    /// First pixel of the submitted frame
    Frame([u8; 4]),
    /// Byte length of the submitted block
    Block(usize),
}

/// Writer that logs submissions and completes frames after a delay
pub struct RecordingWriter {
    log: Mutex<Vec<WriteEvent>>,
    latency: Duration,
    finish_delay: Duration,
    in_flight: Arc<AtomicBool>,
    finish_calls: AtomicUsize,
    /// Set when `finish` returns
    finished: AtomicBool,
    closed: AtomicBool,
}

impl RecordingWriter {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Self::build(latency, Duration::ZERO)
    }

    /// Writer whose `finish` takes `delay` to finalize
    pub fn with_finish_delay(delay: Duration) -> Arc<Self> {
        Self::build(Duration::ZERO, delay)
    }

    fn build(latency: Duration, finish_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            latency,
            finish_delay,
            in_flight: Arc::new(AtomicBool::new(false)),
            finish_calls: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn events(&self) -> Vec<WriteEvent> {
        self.log.lock().unwrap().clone()
    }

    pub fn frames(&self) -> Vec<[u8; 4]> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WriteEvent::Frame(pixel) => Some(pixel),
                WriteEvent::Block(_) => None,
            })
            .collect()
    }

    pub fn block_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, WriteEvent::Block(_)))
            .count()
    }

    /// Set while a frame write is outstanding
    pub fn in_flight(&self) -> Arc<AtomicBool> {
        self.in_flight.clone()
    }

    pub fn finish_calls(&self) -> usize {
        self.finish_calls.load(Ordering::SeqCst)
    }

    /// Reject further writes without finalizing, like a failed disk
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ContainerWriter for RecordingWriter {
    fn write_frame(&self, frame: FrameBuffer) -> PendingWrite {
        if self.closed.load(Ordering::SeqCst) {
            return PendingWrite::completed(Err(WriterError::Closed));
        }

        let bytes = frame.as_bytes();
        let pixel = [bytes[0], bytes[1], bytes[2], bytes[3]];
        self.log.lock().unwrap().push(WriteEvent::Frame(pixel));

        self.in_flight.store(true, Ordering::SeqCst);
        let in_flight = self.in_flight.clone();
        let latency = self.latency;
        let (completion, pending) = completion_pair();

        thread::spawn(move || {
            if !latency.is_zero() {
                thread::sleep(latency);
            }
            in_flight.store(false, Ordering::SeqCst);
            completion.complete(Ok(frame));
        });

        pending
    }

    fn write_block(&self, block: &AudioBlock<'_>) -> Result<(), WriterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WriterError::Closed);
        }
        self.log.lock().unwrap().push(WriteEvent::Block(block.data.len()));
        Ok(())
    }

    fn finish(&self) -> Result<(), WriterError> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if !self.finish_delay.is_zero() {
            thread::sleep(self.finish_delay);
        }
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// What the scripted video backend does on one capture call
pub enum Step {
    Fresh([u8; 4]),
    Repeat,
    Fail(CaptureError),
    /// Block inside `capture` for a while, then produce a fresh frame
    Stall(Duration, [u8; 4]),
    Panic,
}

/// Counters shared between a `ScriptedVideo` and the test
#[derive(Clone, Default)]
pub struct VideoCounters {
    pub captures: Arc<AtomicUsize>,
    /// Captures that started while a frame write was still outstanding
    pub overlaps: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicBool>,
    pub stalled: Arc<AtomicBool>,
}

/// Video backend replaying a script, then producing fresh frames forever
pub struct ScriptedVideo {
    width: u32,
    height: u32,
    script: VecDeque<Step>,
    counters: VideoCounters,
    in_flight: Option<Arc<AtomicBool>>,
}

impl ScriptedVideo {
    pub fn new(script: Vec<Step>) -> (Self, VideoCounters) {
        let counters = VideoCounters::default();
        let video = Self {
            width: 4,
            height: 2,
            script: script.into(),
            counters: counters.clone(),
            in_flight: None,
        };
        (video, counters)
    }

    /// Count captures that start while `in_flight` is set
    pub fn watching(mut self, in_flight: Arc<AtomicBool>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }
}

impl VideoCaptureBackend for ScriptedVideo {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self, frame: &mut FrameBuffer, _timeout_ms: u32) -> Result<CaptureOutcome, CaptureError> {
        if let Some(in_flight) = &self.in_flight {
            if in_flight.load(Ordering::SeqCst) {
                self.counters.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }

        let n = self.counters.captures.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Step::Fresh(pixel)) => {
                frame.fill(pixel);
                Ok(CaptureOutcome::Fresh)
            }
            Some(Step::Repeat) => Ok(CaptureOutcome::Repeat),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Stall(duration, pixel)) => {
                self.counters.stalled.store(true, Ordering::SeqCst);
                thread::sleep(duration);
                self.counters.stalled.store(false, Ordering::SeqCst);
                frame.fill(pixel);
                Ok(CaptureOutcome::Fresh)
            }
            Some(Step::Panic) => panic!("scripted capture panic"),
            None => {
                frame.fill([(n % 256) as u8, 0, 0, 255]);
                Ok(CaptureOutcome::Fresh)
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

impl Drop for ScriptedVideo {
    fn drop(&mut self) {
        self.counters.dropped.store(true, Ordering::SeqCst);
    }
}

/// Push-driven audio backend whose blocks are delivered by the test
pub struct ManualAudio {
    mode: AudioMode,
    format: WaveFormat,
    sink: Arc<Mutex<Option<BlockSink>>>,
    starts: Arc<AtomicUsize>,
}

/// Test-side handle of a `ManualAudio`
#[derive(Clone)]
pub struct AudioPusher {
    format: WaveFormat,
    sink: Arc<Mutex<Option<BlockSink>>>,
    starts: Arc<AtomicUsize>,
}

impl ManualAudio {
    pub fn new(mode: AudioMode) -> (Self, AudioPusher) {
        let format = WaveFormat::pcm16(8_000, 1);
        let sink = Arc::new(Mutex::new(None));
        let starts = Arc::new(AtomicUsize::new(0));
        let audio = Self {
            mode,
            format,
            sink: sink.clone(),
            starts: starts.clone(),
        };
        (audio, AudioPusher { format, sink, starts })
    }
}

impl AudioCaptureBackend for ManualAudio {
    fn mode(&self) -> AudioMode {
        self.mode
    }

    fn format(&self) -> WaveFormat {
        self.format
    }

    fn start(&mut self, sink: BlockSink) -> Result<(), AudioError> {
        *self.sink.lock().unwrap() = Some(sink);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.sink.lock().unwrap().take();
        Ok(())
    }
}

impl AudioPusher {
    /// Deliver one block on the calling thread; `false` when not started
    pub fn push(&self, len: usize) -> bool {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                let data = vec![0u8; len];
                sink(&AudioBlock::new(&data, self.format));
                true
            }
            None => false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Push blocks from a background thread, like a device callback,
    /// until `stop` is set
    pub fn spawn_device(&self, stop: Arc<AtomicBool>) -> thread::JoinHandle<usize> {
        let pusher = self.clone();
        thread::spawn(move || {
            let mut delivered = 0;
            while !stop.load(Ordering::SeqCst) {
                if pusher.push(16) {
                    delivered += 1;
                } else {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            delivered
        })
    }
}
