/*!
 * Cursor Tracker (Windows)
 *
 * Reads the current pointer position and shape through user32/GDI and
 * converts the shape into a straight-alpha BGRA `CursorImage`. Shapes are
 * cached by cursor handle, so the bitmap work only happens when the
 * pointer changes shape.
 */

use std::ffi::c_void;
use std::mem;

use tracing::{debug, trace};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    DeleteObject, GetDC, GetDIBits, GetObjectW, ReleaseDC, BITMAP, BITMAPINFO, BITMAPINFOHEADER,
    BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC, HGDIOBJ,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetCursorInfo, GetIconInfo, CURSORINFO, CURSOR_SHOWING, HCURSOR, HICON, ICONINFO,
};

use crate::capture::cursor::CursorImage;
use crate::video::BYTES_PER_PIXEL;

pub struct CursorTracker {
    handle: Option<HCURSOR>,
    image: Option<CursorImage>,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self {
            handle: None,
            image: None,
        }
    }

    /// Pointer position in desktop coordinates plus its current shape.
    /// `None` when the cursor is hidden or cannot be read.
    pub fn snapshot(&mut self) -> Option<((i32, i32), &CursorImage)> {
        let mut info = CURSORINFO {
            cbSize: mem::size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };

        if unsafe { GetCursorInfo(&mut info) }.is_err() {
            trace!("GetCursorInfo failed");
            return None;
        }

        if info.flags != CURSOR_SHOWING || info.hCursor.is_invalid() {
            return None;
        }

        if self.handle != Some(info.hCursor) {
            self.image = unsafe { load_cursor_image(info.hCursor) };
            self.handle = Some(info.hCursor);
            if let Some(image) = &self.image {
                debug!(
                    "Cursor shape changed: {}x{} hotspot ({}, {})",
                    image.width, image.height, image.hotspot_x, image.hotspot_y
                );
            }
        }

        let position = (info.ptScreenPos.x, info.ptScreenPos.y);
        self.image.as_ref().map(|image| (position, image))
    }
}

/// Deletes the bitmaps handed out by `GetIconInfo`
struct IconBitmaps {
    mask: HBITMAP,
    color: HBITMAP,
}

impl Drop for IconBitmaps {
    fn drop(&mut self) {
        unsafe {
            if !self.mask.is_invalid() {
                DeleteObject(HGDIOBJ(self.mask.0));
            }
            if !self.color.is_invalid() {
                DeleteObject(HGDIOBJ(self.color.0));
            }
        }
    }
}

/// Screen DC released on drop
struct ScreenDc(HDC);

impl ScreenDc {
    fn get() -> Option<Self> {
        let hdc = unsafe { GetDC(HWND(0)) };
        if hdc.is_invalid() {
            None
        } else {
            Some(Self(hdc))
        }
    }
}

impl Drop for ScreenDc {
    fn drop(&mut self) {
        unsafe { ReleaseDC(HWND(0), self.0) };
    }
}

unsafe fn load_cursor_image(cursor: HCURSOR) -> Option<CursorImage> {
    let mut icon = ICONINFO::default();
    GetIconInfo(HICON(cursor.0), &mut icon).ok()?;

    let bitmaps = IconBitmaps {
        mask: icon.hbmMask,
        color: icon.hbmColor,
    };
    let hotspot = (icon.xHotspot as i32, icon.yHotspot as i32);
    let dc = ScreenDc::get()?;

    if !bitmaps.color.is_invalid() {
        let (width, height) = bitmap_size(bitmaps.color)?;
        let mut pixels = read_bitmap(dc.0, bitmaps.color, width, height)?;

        // Legacy color cursors carry no alpha; the AND mask says what is transparent
        if pixels.chunks_exact(BYTES_PER_PIXEL).all(|p| p[3] == 0) {
            let mask = read_bitmap(dc.0, bitmaps.mask, width, height)?;
            for (pixel, m) in pixels
                .chunks_exact_mut(BYTES_PER_PIXEL)
                .zip(mask.chunks_exact(BYTES_PER_PIXEL))
            {
                pixel[3] = if m[0] == 0 { 255 } else { 0 };
            }
        }

        return Some(CursorImage::new(width, height, hotspot.0, hotspot.1, pixels));
    }

    // Monochrome: AND mask on top, XOR mask below, in one double-height bitmap
    let (width, double_height) = bitmap_size(bitmaps.mask)?;
    let height = double_height / 2;
    let both = read_bitmap(dc.0, bitmaps.mask, width, double_height)?;
    let half = width as usize * height as usize * BYTES_PER_PIXEL;
    let (and_mask, xor_mask) = both.split_at(half);

    let mut pixels = vec![0u8; half];
    for ((pixel, a), x) in pixels
        .chunks_exact_mut(BYTES_PER_PIXEL)
        .zip(and_mask.chunks_exact(BYTES_PER_PIXEL))
        .zip(xor_mask.chunks_exact(BYTES_PER_PIXEL))
    {
        let transparent = a[0] != 0;
        let white = x[0] != 0;
        let value = match (transparent, white) {
            (true, false) => continue,
            // Screen-inverting pixels have no straight-alpha equivalent; draw them black
            (true, true) => 0,
            (false, true) => 255,
            (false, false) => 0,
        };
        pixel.copy_from_slice(&[value, value, value, 255]);
    }

    Some(CursorImage::new(width, height, hotspot.0, hotspot.1, pixels))
}

unsafe fn bitmap_size(bitmap: HBITMAP) -> Option<(u32, u32)> {
    let mut bm = BITMAP::default();
    let written = GetObjectW(
        HGDIOBJ(bitmap.0),
        mem::size_of::<BITMAP>() as i32,
        Some(&mut bm as *mut BITMAP as *mut c_void),
    );
    if written == 0 || bm.bmWidth <= 0 || bm.bmHeight <= 0 {
        return None;
    }
    Some((bm.bmWidth as u32, bm.bmHeight as u32))
}

/// Read `bitmap` as top-down 32-bit BGRA
unsafe fn read_bitmap(hdc: HDC, bitmap: HBITMAP, width: u32, height: u32) -> Option<Vec<u8>> {
    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width as i32,
            biHeight: -(height as i32),
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut pixels = vec![0u8; width as usize * height as usize * BYTES_PER_PIXEL];
    let lines = GetDIBits(
        hdc,
        bitmap,
        0,
        height,
        Some(pixels.as_mut_ptr() as *mut c_void),
        &mut info,
        DIB_RGB_COLORS,
    );

    if lines as u32 != height {
        return None;
    }
    Some(pixels)
}
