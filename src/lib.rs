mod engine;
mod error;
mod midi;
mod midi_importer;
mod model;
mod normalizer;
mod player;
mod storage;
mod util;

pub use engine::Renderer;
pub use engine::log_renderer::*;
pub use engine::scheduler::*;
pub use error::*;
pub use midi::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::envelope::EnvelopePoint;
pub use model::instruments::*;
pub use model::pattern::*;
pub use model::pitch::*;
pub use model::request::*;
pub use normalizer::*;
pub use player::*;
pub use storage::*;
pub use util::*;
