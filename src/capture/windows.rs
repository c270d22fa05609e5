/*!
 * Windows Screen Capture Implementation
 *
 * Two backends over the same `VideoCaptureBackend` contract:
 * - `DuplicationCapture`: DXGI desktop duplication (Windows 8+), GPU-side
 *   region copy into a staging texture, pitch-aware readback
 * - `GdiCapture`: BitBlt from the screen DC into a top-down DIB section
 *
 * See duplication.rs / gdi.rs for the implementations.
 */

mod cursor;
mod duplication;
mod gdi;

pub use duplication::{output_bounds, DuplicationCapture};
pub use gdi::GdiCapture;
