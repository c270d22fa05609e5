/*!
 * Frame Buffer
 *
 * Reusable top-down BGRA pixel buffer shared between a capture backend
 * (writer) and the container writer (reader). Ownership moves into the
 * container on submit and comes back through the write's completion
 * handle, so a fill can never overlap a read.
 */

use crate::error::CaptureError;

/// Bytes per BGRA pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Fixed-size BGRA frame buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl FrameBuffer {
    /// Create a zero-filled (black) buffer
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; width as usize * height as usize * BYTES_PER_PIXEL],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row (no padding)
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Mutable view of a single row
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// Copy pixel rows from a mapped source whose row pitch may exceed `width * 4`.
    ///
    /// Each row is copied on its own; the padding at the end of each source
    /// row is skipped.
    pub fn copy_rows_from(&mut self, src: &[u8], src_pitch: usize) -> Result<(), CaptureError> {
        let stride = self.stride();
        let rows = self.height as usize;

        if src_pitch < stride {
            return Err(CaptureError::Platform(format!(
                "row pitch {} smaller than row width {}",
                src_pitch, stride
            )));
        }

        let needed = if rows == 0 { 0 } else { (rows - 1) * src_pitch + stride };
        if src.len() < needed {
            return Err(CaptureError::Platform(format!(
                "mapped source too short: {} bytes, need {}",
                src.len(),
                needed
            )));
        }

        for (y, dst_row) in self.data.chunks_exact_mut(stride).enumerate() {
            let start = y * src_pitch;
            dst_row.copy_from_slice(&src[start..start + stride]);
        }

        Ok(())
    }

    /// Fill the whole buffer with one BGRA colour
    pub fn fill(&mut self, bgra: [u8; 4]) {
        for pixel in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&bgra);
        }
    }
}
