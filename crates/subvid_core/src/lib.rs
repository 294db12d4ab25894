//! Subvid Core - timing-synchronization and batched-assembly engine
//!
//! Turns a timed cue track plus pre-rendered frame images into a
//! finished video: speech clips are synthesized per cue, fitted into
//! their time slots by tempo adjustment and shifting, mixed onto a
//! narration track, and the frames are rescaled, batch-rendered, and
//! muxed against that track. No UI dependencies; the crate is driven
//! through [`orchestrator::assemble`] or by composing a pipeline.

pub mod assemble;
pub mod audio;
pub mod config;
pub mod logging;
pub mod media;
pub mod models;
pub mod orchestrator;
pub mod render;
pub mod rescale;
pub mod synth;
pub mod timeline;
pub mod timing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
