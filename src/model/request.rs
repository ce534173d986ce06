use crate::model::envelope::{self, EnvelopePoint};
use crate::model::instruments::{Instrument, Percussion};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Beat,
    Tone,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Sound {
    Beat {
        percussion: Percussion,
    },
    Tone {
        frequency_hz: f64,
        instrument: Instrument,
    },
}

/// One sound to render, positioned relative to the start of its timeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    #[serde(flatten)]
    pub sound: Sound,
    pub label: String,
    pub start_offset_seconds: f64,
    pub duration_seconds: f64,
    /// The item's `vol`, spread across the duration.
    pub volume_envelope: Vec<EnvelopePoint>,
    /// The instrument's attack/decay contour, clipped to the duration.
    pub amplitude_shape: Vec<EnvelopePoint>,
}

impl SynthesisRequest {
    pub fn kind(&self) -> RequestKind {
        match self.sound {
            Sound::Beat { .. } => RequestKind::Beat,
            Sound::Tone { .. } => RequestKind::Tone,
        }
    }

    pub fn frequency_hz(&self) -> Option<f64> {
        match self.sound {
            Sound::Tone { frequency_hz, .. } => Some(frequency_hz),
            Sound::Beat { .. } => None,
        }
    }

    pub fn instrument(&self) -> Option<Instrument> {
        match self.sound {
            Sound::Tone { instrument, .. } => Some(instrument),
            Sound::Beat { .. } => None,
        }
    }

    pub fn end_seconds(&self) -> f64 {
        self.start_offset_seconds + self.duration_seconds
    }

    /// Gain the renderer should apply: volume times instrument contour.
    pub fn effective_envelope(&self) -> Vec<EnvelopePoint> {
        envelope::multiply(&self.volume_envelope, &self.amplitude_shape)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Timeline {
    pub bpm: f64,
    pub requests: Vec<SynthesisRequest>,
    /// Where the cursor ended up, rests included.
    pub total_seconds: f64,
}
