/*!
 * GDI Screen Capture
 *
 * BitBlt from the screen DC into a top-down 32-bit DIB section, then a
 * straight copy into the caller's frame. Works everywhere duplication
 * does not (remote sessions, pre-Windows 8), at a higher CPU cost.
 */

use std::ffi::c_void;
use std::mem;

use tracing::{info, warn};
use windows::Win32::Foundation::{HANDLE, HWND};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GdiFlush, GetDC, ReleaseDC,
    SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, CAPTUREBLT, CreatedHDC, DIB_RGB_COLORS, HBITMAP,
    HDC, HGDIOBJ, ROP_CODE, SRCCOPY,
};

use super::cursor::CursorTracker;
use crate::capture::{cursor, CaptureOutcome, Rect, VideoCaptureBackend};
use crate::error::CaptureError;
use crate::video::{FrameBuffer, BYTES_PER_PIXEL};

pub struct GdiCapture {
    screen_dc: HDC,
    memory_dc: CreatedHDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
    /// DIB section pixels, owned by `bitmap`
    bits: *const u8,
    region: Rect,
    include_cursor: bool,
    cursor: CursorTracker,
}

impl GdiCapture {
    pub fn new(region: Rect, include_cursor: bool) -> Result<Self, CaptureError> {
        if region.is_empty() {
            return Err(CaptureError::InvalidRegion {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
            });
        }

        unsafe {
            let screen_dc = GetDC(HWND(0));
            if screen_dc.is_invalid() {
                return Err(CaptureError::Platform("GetDC(NULL) failed".to_string()));
            }

            let memory_dc = CreateCompatibleDC(screen_dc);
            if memory_dc.is_invalid() {
                ReleaseDC(HWND(0), screen_dc);
                return Err(CaptureError::Platform("CreateCompatibleDC failed".to_string()));
            }

            let info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: region.width as i32,
                    // Negative height: top-down rows
                    biHeight: -(region.height as i32),
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };

            let mut bits: *mut c_void = std::ptr::null_mut();
            let bitmap = match CreateDIBSection(screen_dc, &info, DIB_RGB_COLORS, &mut bits, HANDLE(0), 0) {
                Ok(bitmap) if !bits.is_null() => bitmap,
                Ok(bitmap) => {
                    DeleteObject(HGDIOBJ(bitmap.0));
                    DeleteDC(memory_dc);
                    ReleaseDC(HWND(0), screen_dc);
                    return Err(CaptureError::Platform("CreateDIBSection returned no pixels".to_string()));
                }
                Err(e) => {
                    DeleteDC(memory_dc);
                    ReleaseDC(HWND(0), screen_dc);
                    return Err(CaptureError::Platform(format!("CreateDIBSection: {}", e)));
                }
            };

            let previous = SelectObject(memory_dc, HGDIOBJ(bitmap.0));

            info!(
                "GDI capture ready: region {}x{} at ({}, {})",
                region.width, region.height, region.x, region.y
            );

            Ok(Self {
                screen_dc,
                memory_dc,
                bitmap,
                previous,
                bits: bits as *const u8,
                region,
                include_cursor,
                cursor: CursorTracker::new(),
            })
        }
    }
}

impl VideoCaptureBackend for GdiCapture {
    fn size(&self) -> (u32, u32) {
        (self.region.width, self.region.height)
    }

    fn capture(&mut self, frame: &mut FrameBuffer, _timeout_ms: u32) -> Result<CaptureOutcome, CaptureError> {
        let Rect { x, y, width, height } = self.region;

        unsafe {
            let blit = BitBlt(
                self.memory_dc,
                0,
                0,
                width as i32,
                height as i32,
                self.screen_dc,
                x,
                y,
                // CAPTUREBLT includes layered windows
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            );

            // Secure desktop or a mode switch; keep the previous frame
            if let Err(e) = blit {
                warn!("BitBlt failed, repeating previous frame: {}", e);
                return Ok(CaptureOutcome::Repeat);
            }

            GdiFlush();

            let stride = width as usize * BYTES_PER_PIXEL;
            let src = std::slice::from_raw_parts(self.bits, stride * height as usize);
            frame.copy_rows_from(src, stride)?;
        }

        // BitBlt leaves the alpha byte undefined
        for pixel in frame.as_bytes_mut().chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel[3] = 255;
        }

        if self.include_cursor {
            if let Some((position, image)) = self.cursor.snapshot() {
                cursor::composite(frame, image, position, (x, y));
            }
        }

        Ok(CaptureOutcome::Fresh)
    }

    fn name(&self) -> &'static str {
        "gdi"
    }
}

impl Drop for GdiCapture {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.memory_dc, self.previous);
            DeleteObject(HGDIOBJ(self.bitmap.0));
            DeleteDC(self.memory_dc);
            ReleaseDC(HWND(0), self.screen_dc);
        }
    }
}

// GDI handles are only used from the capture thread that owns the backend
unsafe impl Send for GdiCapture {}
