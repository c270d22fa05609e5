use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::VideoSource;
use crate::error::CaptureError;
use crate::platform::DisplayTopology;
use crate::video::FrameBuffer;

pub mod cursor;
pub mod test_pattern;

// Platform-specific implementations
#[cfg(target_os = "windows")]
pub mod windows;

/// Screen rectangle in desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Round width and height down to even values (encoders reject odd sizes)
    pub fn even(&self) -> Self {
        let even = |v: u32| if v < 2 { v } else { v & !1 };
        Self {
            x: self.x,
            y: self.y,
            width: even(self.width),
            height: even(self.height),
        }
    }

    /// Intersection with `bounds`; empty when they do not overlap
    pub fn clamp_to(&self, bounds: &Rect) -> Self {
        let left = self.x.max(bounds.x);
        let top = self.y.max(bounds.y);
        let right = self.right().min(bounds.right());
        let bottom = self.bottom().min(bounds.bottom());

        if right <= left || bottom <= top {
            return Self::new(left, top, 0, 0);
        }

        Self::new(left, top, (right - left) as u32, (bottom - top) as u32)
    }

    /// Whether `other` lies completely inside this rectangle
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Result of a single capture call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The buffer now holds a new frame
    Fresh,
    /// Nothing new arrived; the buffer is untouched and the previous frame must be reused
    Repeat,
}

/// A video capture backend fills a caller-owned buffer, one frame per call.
pub trait VideoCaptureBackend: Send {
    /// Frame size produced by this backend
    fn size(&self) -> (u32, u32);

    /// Capture into `frame`. `timeout_ms` bounds the wait for a new frame;
    /// `0` returns immediately when nothing new is available.
    fn capture(&mut self, frame: &mut FrameBuffer, timeout_ms: u32) -> Result<CaptureOutcome, CaptureError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Build the requested video backend.
///
/// Duplication failures that leave room for another method (unsupported
/// platform, session limit) fall back to GDI copy when `fallback_to_gdi`
/// is set. Returns `Ok(None)` when no video was requested.
pub fn create_video_backend(
    source: &VideoSource,
    region: Option<Rect>,
    include_cursor: bool,
    topology: &DisplayTopology,
    fallback_to_gdi: bool,
) -> Result<Option<Box<dyn VideoCaptureBackend>>, CaptureError> {
    let region = region.map(|r| r.even());
    info!("Creating video backend {:?} (region {:?})", source, region);

    match source {
        VideoSource::None => Ok(None),
        VideoSource::TestPattern => {
            let region = desktop_region(region, topology)?;
            Ok(Some(Box::new(test_pattern::TestPatternCapture::new(
                region.width,
                region.height,
            ))))
        }
        VideoSource::Gdi => create_gdi(desktop_region(region, topology)?, include_cursor).map(Some),
        VideoSource::Duplication { adapter, output } => {
            if let Some(r) = region {
                check_region(&r)?;
            }
            match create_duplication(*adapter, *output, region, include_cursor) {
                Ok(backend) => Ok(Some(backend)),
                Err(e) if fallback_to_gdi && e.allows_fallback() => {
                    warn!("Desktop duplication unavailable ({}), falling back to GDI capture", e);
                    let output = match query_output_bounds(*adapter, *output) {
                        Ok(bounds) => Some(bounds),
                        Err(e) => {
                            warn!("Output bounds unavailable ({}), using the primary monitor", e);
                            None
                        }
                    };
                    create_gdi(fallback_region(region, output, topology)?, include_cursor).map(Some)
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Explicit region, or the whole desktop
fn desktop_region(region: Option<Rect>, topology: &DisplayTopology) -> Result<Rect, CaptureError> {
    let region = region.unwrap_or_else(|| topology.desktop_bounds().even());
    check_region(&region)?;
    Ok(region)
}

/// Region for GDI standing in for duplication: the explicit region, else the
/// selected output, else the primary monitor
fn fallback_region(
    region: Option<Rect>,
    output: Option<Rect>,
    topology: &DisplayTopology,
) -> Result<Rect, CaptureError> {
    let region = region
        .or(output)
        .or_else(|| topology.primary().map(|m| m.bounds))
        .unwrap_or_else(|| topology.desktop_bounds())
        .even();
    check_region(&region)?;
    Ok(region)
}

fn check_region(region: &Rect) -> Result<(), CaptureError> {
    if region.is_empty() {
        return Err(CaptureError::InvalidRegion {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
        });
    }
    Ok(())
}

#[cfg(target_os = "windows")]
fn create_gdi(region: Rect, include_cursor: bool) -> Result<Box<dyn VideoCaptureBackend>, CaptureError> {
    Ok(Box::new(windows::GdiCapture::new(region, include_cursor)?))
}

#[cfg(not(target_os = "windows"))]
fn create_gdi(_region: Rect, _include_cursor: bool) -> Result<Box<dyn VideoCaptureBackend>, CaptureError> {
    Err(CaptureError::Unsupported("GDI capture requires Windows".to_string()))
}

#[cfg(target_os = "windows")]
fn create_duplication(
    adapter: u32,
    output: u32,
    region: Option<Rect>,
    include_cursor: bool,
) -> Result<Box<dyn VideoCaptureBackend>, CaptureError> {
    Ok(Box::new(windows::DuplicationCapture::new(adapter, output, region, include_cursor)?))
}

#[cfg(target_os = "windows")]
fn query_output_bounds(adapter: u32, output: u32) -> Result<Rect, CaptureError> {
    windows::output_bounds(adapter, output)
}

#[cfg(not(target_os = "windows"))]
fn query_output_bounds(_adapter: u32, _output: u32) -> Result<Rect, CaptureError> {
    Err(CaptureError::Unsupported("output enumeration requires Windows".to_string()))
}

#[cfg(not(target_os = "windows"))]
fn create_duplication(
    _adapter: u32,
    _output: u32,
    _region: Option<Rect>,
    _include_cursor: bool,
) -> Result<Box<dyn VideoCaptureBackend>, CaptureError> {
    Err(CaptureError::Unsupported("desktop duplication requires Windows 8 or later".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Monitor;

    #[test]
    fn test_even_rounding() {
        let rect = Rect::new(10, 20, 1367, 769).even();
        assert_eq!((rect.width, rect.height), (1366, 768));
        assert_eq!((rect.x, rect.y), (10, 20));

        let rect = Rect::new(0, 0, 1, 1).even();
        assert_eq!((rect.width, rect.height), (1, 1));
    }

    #[test]
    fn test_clamp_to_bounds() {
        let bounds = Rect::new(0, 0, 1920, 1080);

        let inside = Rect::new(100, 100, 200, 200);
        assert_eq!(inside.clamp_to(&bounds), inside);

        let overhang = Rect::new(1800, 1000, 400, 400);
        assert_eq!(overhang.clamp_to(&bounds), Rect::new(1800, 1000, 120, 80));

        let outside = Rect::new(3000, 3000, 10, 10);
        assert!(outside.clamp_to(&bounds).is_empty());
    }

    #[test]
    fn test_contains() {
        let bounds = Rect::new(-1920, 0, 3840, 1080);
        assert!(bounds.contains(&Rect::new(-100, 0, 200, 200)));
        assert!(!bounds.contains(&Rect::new(1900, 0, 100, 100)));
    }

    #[test]
    fn test_create_none_backend() {
        let topology = DisplayTopology::single(1920, 1080);
        let backend = create_video_backend(&VideoSource::None, None, false, &topology, true).unwrap();
        assert!(backend.is_none());
    }

    #[test]
    fn test_create_test_pattern_uses_even_region() {
        let topology = DisplayTopology::single(1921, 1081);
        let backend = create_video_backend(&VideoSource::TestPattern, None, false, &topology, true)
            .unwrap()
            .unwrap();
        assert_eq!(backend.size(), (1920, 1080));
        assert_eq!(backend.name(), "test-pattern");
    }

    fn two_monitors() -> DisplayTopology {
        DisplayTopology {
            monitors: vec![
                Monitor {
                    index: 0,
                    bounds: Rect::new(0, 0, 1920, 1080),
                    primary: true,
                },
                Monitor {
                    index: 1,
                    bounds: Rect::new(1920, 0, 1280, 1024),
                    primary: false,
                },
            ],
        }
    }

    #[test]
    fn test_fallback_region_follows_selected_output() {
        let topology = two_monitors();

        let region = fallback_region(None, Some(Rect::new(1920, 0, 1280, 1024)), &topology).unwrap();
        assert_eq!(region, Rect::new(1920, 0, 1280, 1024));
        assert_ne!(region, topology.desktop_bounds());
    }

    #[test]
    fn test_fallback_region_prefers_explicit_region() {
        let topology = two_monitors();
        let explicit = Rect::new(100, 100, 640, 480);

        let region = fallback_region(Some(explicit), Some(Rect::new(1920, 0, 1280, 1024)), &topology).unwrap();
        assert_eq!(region, explicit);
    }

    #[test]
    fn test_fallback_region_without_output_uses_primary() {
        let region = fallback_region(None, None, &two_monitors()).unwrap();
        assert_eq!(region, Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn test_empty_region_rejected() {
        let topology = DisplayTopology::single(1920, 1080);
        let result = create_video_backend(
            &VideoSource::TestPattern,
            Some(Rect::new(0, 0, 0, 10)),
            false,
            &topology,
            true,
        );
        assert!(matches!(result, Err(CaptureError::InvalidRegion { .. })));
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn test_duplication_unsupported_off_windows() {
        let topology = DisplayTopology::single(1920, 1080);
        let result = create_video_backend(
            &VideoSource::Duplication { adapter: 0, output: 0 },
            None,
            true,
            &topology,
            true,
        );
        // GDI fallback is attempted and is unsupported too
        assert!(matches!(result, Err(CaptureError::Unsupported(_))));
    }
}
