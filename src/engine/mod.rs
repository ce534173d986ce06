use crate::model::envelope::EnvelopePoint;
use crate::model::instruments::{Instrument, Percussion};
use crate::model::request::{Sound, SynthesisRequest};
use anyhow::anyhow;

pub mod log_renderer;
pub mod scheduler;

/// An audio backend. Each created sound owns its own signal chain, so overlapping
/// requests never interfere.
pub trait Renderer: Send + Sync {
    /// Start a pitched tone `start` seconds into the timeline.
    fn create_tone(
        &self,
        frequency_hz: f64,
        instrument: Instrument,
        envelope: &[EnvelopePoint],
        start: f64,
        duration: f64,
    ) -> anyhow::Result<()>;

    /// Start a percussion hit `start` seconds into the timeline.
    fn create_percussion(
        &self,
        percussion: Percussion,
        envelope: &[EnvelopePoint],
        start: f64,
        duration: f64,
    ) -> anyhow::Result<()>;

    /// Silence everything created so far that is still sounding.
    fn stop_all(&self) -> anyhow::Result<()>;

    fn render(&self, request: &SynthesisRequest) -> anyhow::Result<()> {
        if request.duration_seconds <= 0.0 {
            return Err(anyhow!("duration must be greater than 0..!"));
        }

        let envelope = request.effective_envelope();

        match request.sound {
            Sound::Tone {
                frequency_hz,
                instrument,
            } => {
                if frequency_hz <= 0.0 {
                    return Err(anyhow!("frequency must be greater than 0..!"));
                }
                self.create_tone(
                    frequency_hz,
                    instrument,
                    &envelope,
                    request.start_offset_seconds,
                    request.duration_seconds,
                )
            }
            Sound::Beat { percussion } => self.create_percussion(
                percussion,
                &envelope,
                request.start_offset_seconds,
                request.duration_seconds,
            ),
        }
    }
}
