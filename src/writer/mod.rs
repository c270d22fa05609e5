/*!
 * Container Writer Port
 *
 * The recorder hands frames and audio blocks to a container writer and
 * never looks inside it. Frame writes are asynchronous: the buffer moves
 * into the writer and comes back through a `PendingWrite` once the writer
 * is done reading it, so the capture side can never refill a buffer that
 * is still being encoded.
 */

pub mod raw;
pub mod wav;

use tokio::sync::oneshot;

use crate::audio::AudioBlock;
use crate::error::WriterError;
use crate::video::FrameBuffer;

pub use raw::RawStreamWriter;
pub use wav::WavWriter;

/// Sink for interleaved video frames and audio blocks.
///
/// Items land in the container in the order they were submitted.
pub trait ContainerWriter: Send + Sync {
    /// Queue a frame; the buffer is returned through the handle
    fn write_frame(&self, frame: FrameBuffer) -> PendingWrite;

    /// Write one audio block. The block is copied before returning.
    fn write_block(&self, block: &AudioBlock<'_>) -> Result<(), WriterError>;

    /// Flush and close. Calling it again is a no-op.
    fn finish(&self) -> Result<(), WriterError>;
}

/// Completion handle of an asynchronous frame write
#[derive(Debug)]
pub struct PendingWrite {
    rx: oneshot::Receiver<Result<FrameBuffer, WriterError>>,
}

/// Writer side of a `PendingWrite`
#[derive(Debug)]
pub struct WriteCompletion {
    tx: oneshot::Sender<Result<FrameBuffer, WriterError>>,
}

/// Linked completion/handle pair for one frame write
pub fn completion_pair() -> (WriteCompletion, PendingWrite) {
    let (tx, rx) = oneshot::channel();
    (WriteCompletion { tx }, PendingWrite { rx })
}

impl WriteCompletion {
    pub fn complete(self, result: Result<FrameBuffer, WriterError>) {
        // The recorder may already have given up on this write
        let _ = self.tx.send(result);
    }
}

impl PendingWrite {
    /// A handle that is already resolved
    pub fn completed(result: Result<FrameBuffer, WriterError>) -> Self {
        let (completion, pending) = completion_pair();
        completion.complete(result);
        pending
    }

    /// Block until the writer releases the buffer.
    ///
    /// Must not be called from inside an async runtime thread.
    pub fn wait(self) -> Result<FrameBuffer, WriterError> {
        self.rx.blocking_recv().unwrap_or(Err(WriterError::Abandoned))
    }

    /// Non-blocking check; `None` while the write is still running
    pub fn try_take(&mut self) -> Option<Result<FrameBuffer, WriterError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(WriterError::Abandoned)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_completed_handle_returns_buffer() {
        let frame = FrameBuffer::new(4, 4);
        let pending = PendingWrite::completed(Ok(frame.clone()));
        assert_eq!(pending.wait().unwrap(), frame);
    }

    #[test]
    fn test_wait_blocks_until_complete() {
        let (completion, pending) = completion_pair();
        let frame = FrameBuffer::new(2, 2);

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            completion.complete(Ok(frame));
        });

        let returned = pending.wait().unwrap();
        assert_eq!((returned.width(), returned.height()), (2, 2));
        writer.join().unwrap();
    }

    #[test]
    fn test_dropped_completion_is_abandoned() {
        let (completion, pending) = completion_pair();
        drop(completion);
        assert!(matches!(pending.wait(), Err(WriterError::Abandoned)));
    }

    #[test]
    fn test_try_take() {
        let (completion, mut pending) = completion_pair();
        assert!(pending.try_take().is_none());

        completion.complete(Err(WriterError::Closed));
        assert!(matches!(pending.try_take(), Some(Err(WriterError::Closed))));
    }
}
