//! Pipeline step implementations, in execution order.

mod assemble;
mod audio_track;
mod render;
mod rescale;
mod shift;
mod synthesize;
mod tempo;
mod timeline;

pub use assemble::AssembleStep;
pub use audio_track::AudioTrackStep;
pub use render::RenderStep;
pub use rescale::RescaleStep;
pub use shift::ShiftStep;
pub use synthesize::SynthesizeStep;
pub use tempo::TempoStep;
pub use timeline::TimelineStep;
