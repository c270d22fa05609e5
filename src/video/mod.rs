/*!
 * Video Module
 *
 * Raw frame storage handed between capture backends and the container.
 */

pub mod frame;

pub use frame::{FrameBuffer, BYTES_PER_PIXEL};
