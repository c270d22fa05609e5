/*!
 * Synchronization Primitives
 *
 * Frame pacing, cooperative loop control and the video/audio turn handoff
 * used by the recorder.
 */

pub mod control;
pub mod handoff;
pub mod scheduler;

pub use control::LoopControl;
pub use handoff::{Alternation, Turn};
pub use scheduler::FrameScheduler;
