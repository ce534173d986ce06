use crate::engine::Renderer;
use crate::model::envelope::EnvelopePoint;
use crate::model::instruments::{Instrument, Percussion, voice_for};
use log::{debug, info};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Renderer with no audio device behind it: every sound is written to the log.
#[derive(Debug, Default)]
pub struct LogRenderer {
    active: AtomicUsize,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sounds created since the last `stop_all`.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

fn peak(envelope: &[EnvelopePoint]) -> f64 {
    envelope.iter().map(|p| p.gain).fold(0.0, f64::max)
}

impl Renderer for LogRenderer {
    fn create_tone(
        &self,
        frequency_hz: f64,
        instrument: Instrument,
        envelope: &[EnvelopePoint],
        start: f64,
        duration: f64,
    ) -> anyhow::Result<()> {
        self.active.fetch_add(1, Ordering::SeqCst);
        info!(
            "{:>9.3}s | tone {:>9.2}Hz {:<15} | {:>7.3}s | peak {:.2}",
            start,
            frequency_hz,
            instrument.to_string(),
            duration,
            peak(envelope)
        );
        debug!("Waveform: {:?}, envelope: {:?}", instrument.waveform(), envelope);

        Ok(())
    }

    fn create_percussion(
        &self,
        percussion: Percussion,
        envelope: &[EnvelopePoint],
        start: f64,
        duration: f64,
    ) -> anyhow::Result<()> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let voice = voice_for(percussion);
        info!(
            "{:>9.3}s | beat {:>9.2}Hz {:<15} | {:>7.3}s | peak {:.2}",
            start,
            voice.frequency,
            voice.name,
            duration,
            peak(envelope)
        );
        if let Some(noise) = voice.noise {
            debug!("Noise layer: {:?} at {:.2}", noise.kind, noise.gain);
        }

        Ok(())
    }

    fn stop_all(&self) -> anyhow::Result<()> {
        let stopped = self.active.swap(0, Ordering::SeqCst);
        info!("Stopped {} sounds..!", stopped);

        Ok(())
    }
}
