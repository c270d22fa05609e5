/*!
 * Cursor Compositing
 *
 * Draws a cursor bitmap onto a captured BGRA frame. The OS reports the
 * pointer in desktop coordinates; the frame origin and the cursor hotspot
 * are subtracted to land it inside the capture rectangle.
 */

use crate::video::{FrameBuffer, BYTES_PER_PIXEL};

/// Cursor bitmap with straight (non-premultiplied) alpha
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    pub width: u32,
    pub height: u32,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
    /// Top-down BGRA, `width * height * 4` bytes
    pub pixels: Vec<u8>,
}

impl CursorImage {
    pub fn new(width: u32, height: u32, hotspot_x: i32, hotspot_y: i32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            hotspot_x,
            hotspot_y,
            pixels,
        }
    }

    fn is_valid(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

/// Blend `cursor` onto `frame`.
///
/// `screen_pos` is the pointer position in desktop coordinates and `origin`
/// the desktop position of the frame's top-left pixel. Parts outside the
/// frame are clipped.
pub fn composite(frame: &mut FrameBuffer, cursor: &CursorImage, screen_pos: (i32, i32), origin: (i32, i32)) {
    if !cursor.is_valid() {
        return;
    }

    let left = screen_pos.0 - cursor.hotspot_x - origin.0;
    let top = screen_pos.1 - cursor.hotspot_y - origin.1;

    let frame_w = frame.width() as i32;
    let frame_h = frame.height() as i32;
    let cursor_row = cursor.width as usize * BYTES_PER_PIXEL;

    for cy in 0..cursor.height as i32 {
        let fy = top + cy;
        if fy < 0 || fy >= frame_h {
            continue;
        }

        let src_row = &cursor.pixels[cy as usize * cursor_row..(cy as usize + 1) * cursor_row];
        let dst_row = frame.row_mut(fy as u32);

        for cx in 0..cursor.width as i32 {
            let fx = left + cx;
            if fx < 0 || fx >= frame_w {
                continue;
            }

            let s = cx as usize * BYTES_PER_PIXEL;
            let d = fx as usize * BYTES_PER_PIXEL;
            blend(&mut dst_row[d..d + BYTES_PER_PIXEL], &src_row[s..s + BYTES_PER_PIXEL]);
        }
    }
}

fn blend(dst: &mut [u8], src: &[u8]) {
    let alpha = src[3] as u32;
    match alpha {
        0 => {}
        255 => {
            dst[..3].copy_from_slice(&src[..3]);
            dst[3] = 255;
        }
        _ => {
            let inv = 255 - alpha;
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * inv + 127) / 255) as u8;
            }
            dst[3] = 255;
        }
    }
}
