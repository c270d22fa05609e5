/*!
 * DXGI Desktop Duplication Capture
 *
 * Pipeline:
 * Output → AcquireNextFrame → CopySubresourceRegion (GPU) → staging texture
 *        → Map → row-by-row copy (RowPitch) → FrameBuffer
 *
 * One duplication session per output per process is enforced by the OS;
 * the session is acquired in `new` and released when the backend drops.
 */

use tracing::{debug, info, warn};
use windows::core::{ComInterface, HRESULT};
use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_UNKNOWN;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
    D3D11_BIND_FLAG, D3D11_BOX, D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
    D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ, D3D11_RESOURCE_MISC_FLAG, D3D11_SDK_VERSION,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIAdapter1, IDXGIFactory1, IDXGIOutput, IDXGIOutput1, IDXGIOutputDuplication,
    IDXGIResource, DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_NOT_CURRENTLY_AVAILABLE,
    DXGI_ERROR_NOT_FOUND, DXGI_ERROR_UNSUPPORTED, DXGI_ERROR_WAIT_TIMEOUT,
    DXGI_OUTDUPL_FRAME_INFO,
};

use super::cursor::CursorTracker;
use crate::capture::{cursor, CaptureOutcome, Rect, VideoCaptureBackend};
use crate::error::CaptureError;
use crate::video::FrameBuffer;

/// Desktop duplication capturer bound to one adapter output and one region
///
/// Fields drop in declaration order: the duplication session goes first,
/// the device last.
pub struct DuplicationCapture {
    duplication: IDXGIOutputDuplication,
    /// CPU-readable texture sized to the capture region
    staging: ID3D11Texture2D,
    context: ID3D11DeviceContext,
    #[allow(dead_code)]
    device: ID3D11Device,
    /// Capture region in output-local coordinates
    source_box: D3D11_BOX,
    /// Capture region in desktop coordinates
    region: Rect,
    include_cursor: bool,
    /// Last pointer visibility reported by the duplication API
    pointer_visible: bool,
    cursor: CursorTracker,
    frame_count: u64,
}

impl DuplicationCapture {
    /// Bind to `adapter`/`output` and acquire its duplication session.
    ///
    /// `region` is in desktop coordinates; `None` captures the whole output.
    pub fn new(adapter: u32, output: u32, region: Option<Rect>, include_cursor: bool) -> Result<Self, CaptureError> {
        info!("Initializing desktop duplication on adapter {} output {}", adapter, output);

        let (dxgi_adapter, dxgi_output, output_bounds) = open_output(adapter, output)?;

        let region = region.unwrap_or(output_bounds).even();
        if region.is_empty() || !output_bounds.contains(&region) {
            return Err(CaptureError::InvalidRegion {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
            });
        }

        // IDXGIOutput1 is what exposes DuplicateOutput (missing before Windows 8)
        let output1: IDXGIOutput1 = dxgi_output
            .cast()
            .map_err(|_| CaptureError::Unsupported("IDXGIOutput1 not available".to_string()))?;

        let (device, context) = Self::create_device(&dxgi_adapter)?;

        let duplication = unsafe { output1.DuplicateOutput(&device) }.map_err(|e| {
            let code = e.code();
            if code == DXGI_ERROR_NOT_CURRENTLY_AVAILABLE {
                CaptureError::SessionLimitReached
            } else if code == DXGI_ERROR_UNSUPPORTED {
                CaptureError::Unsupported(
                    "desktop duplication is not supported on this adapter; with multiple GPUs try the integrated one"
                        .to_string(),
                )
            } else if code == E_ACCESSDENIED {
                CaptureError::Platform("access denied (secure desktop active?)".to_string())
            } else {
                CaptureError::Platform(format!("DuplicateOutput: {}", e))
            }
        })?;

        let staging = Self::create_staging_texture(&device, region.width, region.height)?;

        let source_box = D3D11_BOX {
            left: (region.x - output_bounds.x) as u32,
            top: (region.y - output_bounds.y) as u32,
            front: 0,
            right: (region.right() - output_bounds.x) as u32,
            bottom: (region.bottom() - output_bounds.y) as u32,
            back: 1,
        };

        info!(
            "Desktop duplication ready: region {}x{} at ({}, {})",
            region.width, region.height, region.x, region.y
        );

        Ok(Self {
            duplication,
            staging,
            context,
            device,
            source_box,
            region,
            include_cursor,
            pointer_visible: true,
            cursor: CursorTracker::new(),
            frame_count: 0,
        })
    }

    fn create_device(adapter: &IDXGIAdapter1) -> Result<(ID3D11Device, ID3D11DeviceContext), CaptureError> {
        let mut device = None;
        let mut context = None;

        unsafe {
            D3D11CreateDevice(
                adapter,
                D3D_DRIVER_TYPE_UNKNOWN, // Adapter given explicitly
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|e| CaptureError::Platform(format!("D3D11CreateDevice: {}", e)))?;

        match (device, context) {
            (Some(device), Some(context)) => Ok((device, context)),
            _ => Err(CaptureError::Platform("D3D11CreateDevice returned no device".to_string())),
        }
    }

    fn create_staging_texture(device: &ID3D11Device, width: u32, height: u32) -> Result<ID3D11Texture2D, CaptureError> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: D3D11_BIND_FLAG(0),
            CPUAccessFlags: D3D11_CPU_ACCESS_READ,
            MiscFlags: D3D11_RESOURCE_MISC_FLAG(0),
        };

        let mut texture = None;
        unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
            .map_err(|e| CaptureError::Platform(format!("CreateTexture2D (staging): {}", e)))?;

        texture.ok_or_else(|| CaptureError::Platform("CreateTexture2D returned no texture".to_string()))
    }

    /// Copy the mapped staging texture into `frame`; unmaps on every path
    fn read_staging(&self, frame: &mut FrameBuffer) -> Result<(), CaptureError> {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe { self.context.Map(&self.staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
            .map_err(|e| CaptureError::Platform(format!("Map staging texture: {}", e)))?;

        let _unmap = MappedTexture {
            context: &self.context,
            texture: &self.staging,
        };

        let pitch = mapped.RowPitch as usize;
        let rows = frame.height() as usize;
        let len = if rows == 0 { 0 } else { (rows - 1) * pitch + frame.stride() };
        let src = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) };

        frame.copy_rows_from(src, pitch)
    }
}

/// Desktop bounds of `adapter`/`output` without opening a duplication session
pub fn output_bounds(adapter: u32, output: u32) -> Result<Rect, CaptureError> {
    open_output(adapter, output).map(|(_, _, bounds)| bounds)
}

fn open_output(adapter: u32, output: u32) -> Result<(IDXGIAdapter1, IDXGIOutput, Rect), CaptureError> {
    let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1() }
        .map_err(|e| CaptureError::Unsupported(format!("CreateDXGIFactory1: {}", e)))?;

    let dxgi_adapter: IDXGIAdapter1 = unsafe { factory.EnumAdapters1(adapter) }.map_err(|e| {
        if e.code() == DXGI_ERROR_NOT_FOUND {
            CaptureError::AdapterNotFound(adapter)
        } else {
            CaptureError::Platform(format!("EnumAdapters1: {}", e))
        }
    })?;

    let dxgi_output = unsafe { dxgi_adapter.EnumOutputs(output) }.map_err(|e| {
        if e.code() == DXGI_ERROR_NOT_FOUND {
            CaptureError::OutputNotFound { adapter, output }
        } else {
            CaptureError::Platform(format!("EnumOutputs: {}", e))
        }
    })?;

    let desc = unsafe { dxgi_output.GetDesc() }
        .map_err(|e| CaptureError::Platform(format!("IDXGIOutput::GetDesc: {}", e)))?;
    let coords = desc.DesktopCoordinates;
    let bounds = Rect::new(
        coords.left,
        coords.top,
        (coords.right - coords.left) as u32,
        (coords.bottom - coords.top) as u32,
    );

    Ok((dxgi_adapter, dxgi_output, bounds))
}

/// A frame that cannot be handed back leaves the session unusable
fn release_error(code: HRESULT, message: String) -> CaptureError {
    if code == DXGI_ERROR_ACCESS_LOST {
        CaptureError::AccessLost
    } else {
        CaptureError::AcquireFailed(format!("ReleaseFrame: {}", message))
    }
}

/// Releases the acquired duplication frame.
///
/// `release` reports the outcome; dropping without it (early error return)
/// only logs.
struct AcquiredFrame<'a> {
    duplication: &'a IDXGIOutputDuplication,
    released: bool,
}

impl AcquiredFrame<'_> {
    fn release(mut self) -> Result<(), CaptureError> {
        self.released = true;
        unsafe { self.duplication.ReleaseFrame() }.map_err(|e| release_error(e.code(), e.to_string()))
    }
}

impl Drop for AcquiredFrame<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = unsafe { self.duplication.ReleaseFrame() } {
            warn!("ReleaseFrame failed: {}", e);
        }
    }
}

/// Unmaps the staging texture when dropped
struct MappedTexture<'a> {
    context: &'a ID3D11DeviceContext,
    texture: &'a ID3D11Texture2D,
}

impl Drop for MappedTexture<'_> {
    fn drop(&mut self) {
        unsafe { self.context.Unmap(self.texture, 0) };
    }
}

impl VideoCaptureBackend for DuplicationCapture {
    fn size(&self) -> (u32, u32) {
        (self.region.width, self.region.height)
    }

    fn capture(&mut self, frame: &mut FrameBuffer, timeout_ms: u32) -> Result<CaptureOutcome, CaptureError> {
        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;

        match unsafe { self.duplication.AcquireNextFrame(timeout_ms, &mut info, &mut resource) } {
            Ok(()) => {}
            Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => return Ok(CaptureOutcome::Repeat),
            Err(e) if e.code() == DXGI_ERROR_ACCESS_LOST => return Err(CaptureError::AccessLost),
            Err(e) => return Err(CaptureError::AcquireFailed(e.to_string())),
        }

        let acquired = AcquiredFrame {
            duplication: &self.duplication,
            released: false,
        };

        let resource = resource
            .ok_or_else(|| CaptureError::AcquireFailed("no desktop resource returned".to_string()))?;
        let texture: ID3D11Texture2D = resource
            .cast()
            .map_err(|e| CaptureError::AcquireFailed(format!("desktop resource is not a texture: {}", e)))?;

        // GPU-side copy of just the region
        unsafe {
            let dst: ID3D11Resource = self
                .staging
                .cast()
                .map_err(|e| CaptureError::Platform(e.to_string()))?;
            let src: ID3D11Resource = texture.cast().map_err(|e| CaptureError::Platform(e.to_string()))?;
            self.context
                .CopySubresourceRegion(&dst, 0, 0, 0, 0, &src, 0, Some(&self.source_box));
        }

        // Give the frame back to the compositor before the CPU readback
        drop(texture);
        acquired.release()?;

        // Pointer fields are only meaningful when the mouse was updated
        if info.LastMouseUpdateTime != 0 {
            self.pointer_visible = info.PointerPosition.Visible.as_bool();
        }

        self.read_staging(frame)?;

        if self.include_cursor && self.pointer_visible {
            if let Some((position, image)) = self.cursor.snapshot() {
                cursor::composite(frame, image, position, (self.region.x, self.region.y));
            }
        }

        self.frame_count += 1;
        if info.AccumulatedFrames > 1 {
            debug!(
                "Duplication frame {} coalesced {} desktop updates",
                self.frame_count, info.AccumulatedFrames
            );
        }

        Ok(CaptureOutcome::Fresh)
    }

    fn name(&self) -> &'static str {
        "desktop-duplication"
    }
}

impl Drop for DuplicationCapture {
    fn drop(&mut self) {
        info!(
            "Releasing desktop duplication session after {} frames",
            self.frame_count
        );
    }
}

// COM pointers are only touched from the capture thread that owns the backend
unsafe impl Send for DuplicationCapture {}
