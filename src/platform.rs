use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::Rect;

/// One attached display in desktop coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub index: usize,
    pub bounds: Rect,
    pub primary: bool,
}

/// Snapshot of the display layout, computed on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTopology {
    pub monitors: Vec<Monitor>,
}

impl DisplayTopology {
    /// Query the current layout from the OS
    pub fn current() -> Result<Self> {
        let monitors = query_monitors()?;
        let topology = if monitors.is_empty() {
            Self::single(1920, 1080)
        } else {
            Self { monitors }
        };

        debug!(
            "Display topology: {} monitor(s), desktop {:?}",
            topology.monitors.len(),
            topology.desktop_bounds()
        );
        Ok(topology)
    }

    /// A single primary monitor at the origin
    pub fn single(width: u32, height: u32) -> Self {
        Self {
            monitors: vec![Monitor {
                index: 0,
                bounds: Rect::new(0, 0, width, height),
                primary: true,
            }],
        }
    }

    /// Bounding box of every monitor (the virtual desktop)
    pub fn desktop_bounds(&self) -> Rect {
        let mut iter = self.monitors.iter().map(|m| m.bounds);
        let first = match iter.next() {
            Some(first) => first,
            None => return Rect::new(0, 0, 0, 0),
        };

        let (left, top, right, bottom) = iter.fold(
            (first.x, first.y, first.right(), first.bottom()),
            |(l, t, r, b), m| (l.min(m.x), t.min(m.y), r.max(m.right()), b.max(m.bottom())),
        );

        Rect::new(left, top, (right - left) as u32, (bottom - top) as u32)
    }

    pub fn primary(&self) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.primary).or_else(|| self.monitors.first())
    }
}

/// Get platform name
pub fn get_platform_name() -> &'static str {
    #[cfg(target_os = "windows")]
    return "windows";

    #[cfg(target_os = "macos")]
    return "macos";

    #[cfg(target_os = "linux")]
    return "linux";

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    return "unknown";
}

#[cfg(target_os = "windows")]
fn query_monitors() -> Result<Vec<Monitor>> {
    use windows::Win32::Foundation::{BOOL, LPARAM, RECT, TRUE};
    use windows::Win32::Graphics::Gdi::{
        EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO, MONITORINFOF_PRIMARY,
    };

    unsafe extern "system" fn collect(monitor: HMONITOR, _hdc: HDC, _rect: *mut RECT, data: LPARAM) -> BOOL {
        let monitors = &mut *(data.0 as *mut Vec<Monitor>);

        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        if GetMonitorInfoW(monitor, &mut info).as_bool() {
            let r = info.rcMonitor;
            monitors.push(Monitor {
                index: monitors.len(),
                bounds: Rect::new(r.left, r.top, (r.right - r.left) as u32, (r.bottom - r.top) as u32),
                primary: info.dwFlags & MONITORINFOF_PRIMARY != 0,
            });
        }
        TRUE
    }

    let mut monitors: Vec<Monitor> = Vec::new();
    let ok = unsafe {
        EnumDisplayMonitors(
            HDC(0),
            None,
            Some(collect),
            LPARAM(&mut monitors as *mut Vec<Monitor> as isize),
        )
    };

    if !ok.as_bool() {
        anyhow::bail!("EnumDisplayMonitors failed");
    }
    Ok(monitors)
}

#[cfg(not(target_os = "windows"))]
fn query_monitors() -> Result<Vec<Monitor>> {
    // No desktop capture here; the test pattern backend uses the default size
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let platform = get_platform_name();
        assert!(["windows", "macos", "linux", "unknown"].contains(&platform));
    }

    #[test]
    fn test_current_topology_has_a_primary() {
        let topology = DisplayTopology::current().unwrap();
        assert!(topology.primary().is_some());
        assert!(!topology.desktop_bounds().is_empty());
    }

    #[test]
    fn test_desktop_bounds_spans_monitors() {
        let topology = DisplayTopology {
            monitors: vec![
                Monitor {
                    index: 0,
                    bounds: Rect::new(0, 0, 1920, 1080),
                    primary: true,
                },
                Monitor {
                    index: 1,
                    bounds: Rect::new(-1280, 200, 1280, 1024),
                    primary: false,
                },
            ],
        };

        assert_eq!(topology.desktop_bounds(), Rect::new(-1280, 0, 3200, 1224));
        assert_eq!(topology.primary().map(|m| m.index), Some(0));
    }

    #[test]
    fn test_empty_topology() {
        let topology = DisplayTopology { monitors: Vec::new() };
        assert!(topology.desktop_bounds().is_empty());
        assert!(topology.primary().is_none());
    }
}
