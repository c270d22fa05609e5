/*!
 * Test Pattern Capture
 *
 * Synthetic video backend: a moving vertical bar over a static gradient.
 * Lets the full pipeline run on hosts without a capturable desktop.
 */

use tracing::debug;

use super::{CaptureOutcome, VideoCaptureBackend};
use crate::error::CaptureError;
use crate::video::{FrameBuffer, BYTES_PER_PIXEL};

const BAR_WIDTH: u32 = 16;

pub struct TestPatternCapture {
    width: u32,
    height: u32,
    frame_count: u64,
}

impl TestPatternCapture {
    pub fn new(width: u32, height: u32) -> Self {
        debug!("Test pattern capture {}x{}", width, height);
        Self {
            width,
            height,
            frame_count: 0,
        }
    }

    fn bar_position(&self) -> u32 {
        if self.width == 0 {
            return 0;
        }
        ((self.frame_count * 4) % self.width as u64) as u32
    }
}

impl VideoCaptureBackend for TestPatternCapture {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self, frame: &mut FrameBuffer, _timeout_ms: u32) -> Result<CaptureOutcome, CaptureError> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(CaptureError::Platform(format!(
                "frame buffer is {}x{}, backend produces {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let bar = self.bar_position();
        let (width, height) = (self.width, self.height);

        for y in 0..height {
            let row = frame.row_mut(y);
            let shade = (y * 255 / height.max(1)) as u8;
            for (x, pixel) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let x = x as u32;
                if x >= bar && x < bar + BAR_WIDTH {
                    pixel.copy_from_slice(&[255, 255, 255, 255]);
                } else {
                    let tint = (x * 255 / width.max(1)) as u8;
                    pixel.copy_from_slice(&[tint, shade, 64, 255]);
                }
            }
        }

        self.frame_count += 1;
        Ok(CaptureOutcome::Fresh)
    }

    fn name(&self) -> &'static str {
        "test-pattern"
    }
}
