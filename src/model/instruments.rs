use crate::model::envelope::{self, EnvelopePoint, Release};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Oscillator shape the renderer should use for the fundamental.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Instrument {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Piano,
    Guitar,
    ElectricGuitar,
    Strings,
    AcousticGuitar,
}

/// Canonical attack/decay contour of an instrument, in seconds from note start.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeShape {
    pub waveform: Waveform,
    pub stages: &'static [EnvelopePoint],
    pub release: Release,
}

const FLAT: &[EnvelopePoint] = &[EnvelopePoint::new(0.0, 1.0)];

pub const ENVELOPE_SHAPES: &[(Instrument, EnvelopeShape)] = &[
    (
        Instrument::Sine,
        EnvelopeShape {
            waveform: Waveform::Sine,
            stages: FLAT,
            release: Release::Hold,
        },
    ),
    (
        Instrument::Square,
        EnvelopeShape {
            waveform: Waveform::Square,
            stages: FLAT,
            release: Release::Hold,
        },
    ),
    (
        Instrument::Sawtooth,
        EnvelopeShape {
            waveform: Waveform::Sawtooth,
            stages: FLAT,
            release: Release::Hold,
        },
    ),
    (
        Instrument::Triangle,
        EnvelopeShape {
            waveform: Waveform::Triangle,
            stages: FLAT,
            release: Release::Hold,
        },
    ),
    (
        Instrument::Piano,
        EnvelopeShape {
            waveform: Waveform::Sine,
            stages: &[
                EnvelopePoint::new(0.0, 0.0),
                EnvelopePoint::new(0.01, 1.0),
                EnvelopePoint::new(0.1, 0.3),
                EnvelopePoint::new(2.0, 0.01),
            ],
            release: Release::Hold,
        },
    ),
    (
        Instrument::Guitar,
        EnvelopeShape {
            waveform: Waveform::Sawtooth,
            stages: &[
                EnvelopePoint::new(0.0, 0.0),
                EnvelopePoint::new(0.001, 1.0),
                EnvelopePoint::new(1.5, 0.01),
            ],
            release: Release::Hold,
        },
    ),
    (
        Instrument::ElectricGuitar,
        EnvelopeShape {
            waveform: Waveform::Sawtooth,
            stages: &[
                EnvelopePoint::new(0.0, 0.0),
                EnvelopePoint::new(0.01, 1.0),
                EnvelopePoint::new(0.05, 0.5),
                EnvelopePoint::new(0.2, 0.3),
            ],
            release: Release::Linear,
        },
    ),
    (
        Instrument::Strings,
        EnvelopeShape {
            waveform: Waveform::Sawtooth,
            stages: &[
                EnvelopePoint::new(0.0, 0.0),
                EnvelopePoint::new(0.3, 0.8),
                EnvelopePoint::new(1.0, 0.3),
                EnvelopePoint::new(3.0, 0.01),
            ],
            release: Release::Hold,
        },
    ),
    (
        Instrument::AcousticGuitar,
        EnvelopeShape {
            waveform: Waveform::Triangle,
            stages: &[
                EnvelopePoint::new(0.0, 0.0),
                EnvelopePoint::new(0.01, 1.0),
                EnvelopePoint::new(0.05, 0.4),
            ],
            release: Release::Linear,
        },
    ),
];

pub fn shape_for(instrument: Instrument) -> &'static EnvelopeShape {
    ENVELOPE_SHAPES
        .iter()
        .find(|(i, _)| *i == instrument)
        .map(|(_, shape)| shape)
        .unwrap_or(&ENVELOPE_SHAPES[0].1)
}

impl Instrument {
    pub const ALL: [Instrument; 9] = [
        Instrument::Sine,
        Instrument::Square,
        Instrument::Sawtooth,
        Instrument::Triangle,
        Instrument::Piano,
        Instrument::Guitar,
        Instrument::ElectricGuitar,
        Instrument::Strings,
        Instrument::AcousticGuitar,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Sine => "sine",
            Instrument::Square => "square",
            Instrument::Sawtooth => "sawtooth",
            Instrument::Triangle => "triangle",
            Instrument::Piano => "piano",
            Instrument::Guitar => "guitar",
            Instrument::ElectricGuitar => "electricGuitar",
            Instrument::Strings => "strings",
            Instrument::AcousticGuitar => "acousticGuitar",
        }
    }

    pub fn waveform(self) -> Waveform {
        shape_for(self).waveform
    }

    /// The instrument's contour cut to a note of `duration` seconds.
    pub fn contour(self, duration: f64) -> Vec<EnvelopePoint> {
        let shape = shape_for(self);
        envelope::clip(shape.stages, duration, shape.release)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Instrument::ALL
            .into_iter()
            .find(|i| i.name() == s)
            .ok_or_else(|| format!("unknown instrument '{}'", s))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Percussion {
    Kick,
    Snare,
    Hihat,
    Tom,
    Crash,
    Ride,
    Clap,
    Rim,
    Cowbell,
    Tambourine,
    Bongo,
    Conga,
    FloorTom,
    Splash,
    China,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    /// Broadband noise, high-passed at 100 Hz.
    White,
    /// Cymbal wash, high-passed at 3 kHz.
    Metallic,
    /// Short band-passed burst around 1 kHz.
    Sharp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseLayer {
    pub kind: NoiseKind,
    /// Relative to the hit's volume.
    pub gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercussionVoice {
    pub name: &'static str,
    pub frequency: f64,
    pub waveform: Waveform,
    pub decay: f64,
    pub peak: f64,
    pub noise: Option<NoiseLayer>,
}

const fn voice(
    name: &'static str,
    frequency: f64,
    waveform: Waveform,
    decay: f64,
    peak: f64,
    noise: Option<NoiseLayer>,
) -> PercussionVoice {
    PercussionVoice {
        name,
        frequency,
        waveform,
        decay,
        peak,
        noise,
    }
}

const fn noise(kind: NoiseKind, gain: f64) -> Option<NoiseLayer> {
    Some(NoiseLayer { kind, gain })
}

pub const PERCUSSION_VOICES: &[(Percussion, PercussionVoice)] = &[
    (Percussion::Kick, voice("kick", 60.0, Waveform::Sine, 0.5, 1.5, None)),
    (
        Percussion::Snare,
        voice("snare", 200.0, Waveform::Triangle, 0.2, 2.0, noise(NoiseKind::White, 0.3)),
    ),
    (
        Percussion::Hihat,
        voice("hihat", 800.0, Waveform::Square, 0.1, 1.2, noise(NoiseKind::White, 0.4)),
    ),
    (Percussion::Tom, voice("tom", 150.0, Waveform::Sine, 0.3, 1.0, None)),
    (
        Percussion::Crash,
        voice("crash", 500.0, Waveform::Sawtooth, 1.5, 1.0, noise(NoiseKind::Metallic, 0.6)),
    ),
    (
        Percussion::Ride,
        voice("ride", 600.0, Waveform::Triangle, 0.8, 1.0, noise(NoiseKind::Metallic, 0.4)),
    ),
    (
        Percussion::Clap,
        voice("clap", 1500.0, Waveform::Square, 0.03, 1.0, noise(NoiseKind::Sharp, 0.8)),
    ),
    (Percussion::Rim, voice("rim", 800.0, Waveform::Square, 0.05, 1.0, None)),
    (Percussion::Cowbell, voice("cowbell", 400.0, Waveform::Square, 0.2, 1.0, None)),
    (
        Percussion::Tambourine,
        voice("tambourine", 1200.0, Waveform::Square, 0.15, 1.0, noise(NoiseKind::Sharp, 0.5)),
    ),
    (Percussion::Bongo, voice("bongo", 250.0, Waveform::Sine, 0.15, 1.0, None)),
    (Percussion::Conga, voice("conga", 180.0, Waveform::Sine, 0.2, 1.0, None)),
    (Percussion::FloorTom, voice("floor_tom", 100.0, Waveform::Sine, 0.4, 1.0, None)),
    (
        Percussion::Splash,
        voice("splash", 700.0, Waveform::Sawtooth, 0.4, 1.0, noise(NoiseKind::Metallic, 0.6)),
    ),
    (
        Percussion::China,
        voice("china", 450.0, Waveform::Sawtooth, 1.2, 1.0, noise(NoiseKind::Metallic, 0.6)),
    ),
];

pub fn voice_for(percussion: Percussion) -> &'static PercussionVoice {
    PERCUSSION_VOICES
        .iter()
        .find(|(p, _)| *p == percussion)
        .map(|(_, v)| v)
        .unwrap_or(&PERCUSSION_VOICES[0].1)
}

impl Percussion {
    pub fn name(self) -> &'static str {
        voice_for(self).name
    }

    /// Immediate attack to the voice's peak, then decay to near silence.
    pub fn contour(self, duration: f64) -> Vec<EnvelopePoint> {
        let voice = voice_for(self);
        let attack = 0.001_f64.min(duration);
        let end = voice.decay.min(duration).max(attack);

        let mut points = vec![
            EnvelopePoint::new(0.0, 0.0),
            EnvelopePoint::new(attack, voice.peak),
        ];
        if end > attack {
            points.push(EnvelopePoint::new(end, 0.01));
        }

        points
    }
}

impl fmt::Display for Percussion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Percussion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PERCUSSION_VOICES
            .iter()
            .find(|(_, v)| v.name == s)
            .map(|(p, _)| *p)
            .ok_or_else(|| format!("unknown beat '{}'", s))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_instrument_has_a_shape() {
        for instrument in Instrument::ALL {
            assert!(
                ENVELOPE_SHAPES.iter().any(|(i, _)| *i == instrument),
                "{instrument}"
            );
            assert_eq!(instrument.name().parse::<Instrument>(), Ok(instrument));
        }
        assert!("banjo".parse::<Instrument>().is_err());
    }

    #[test]
    fn every_percussion_name_parses_back() {
        for (percussion, voice) in PERCUSSION_VOICES {
            assert_eq!(voice.name.parse::<Percussion>(), Ok(*percussion));
        }
        assert_eq!("floor_tom".parse::<Percussion>(), Ok(Percussion::FloorTom));
        assert!("rest".parse::<Percussion>().is_err());
    }

    #[test]
    fn serde_names_match_table_names() {
        let json = serde_json::to_string(&Instrument::ElectricGuitar).unwrap();
        assert_eq!(json, "\"electricGuitar\"");
        let json = serde_json::to_string(&Percussion::FloorTom).unwrap();
        assert_eq!(json, "\"floor_tom\"");
    }

    #[test]
    fn piano_contour_is_fast_attack_long_decay() {
        let contour = Instrument::Piano.contour(0.5);
        assert_eq!(contour[0], EnvelopePoint::new(0.0, 0.0));
        assert_eq!(contour[1], EnvelopePoint::new(0.01, 1.0));
        assert_eq!(contour[2], EnvelopePoint::new(0.1, 0.3));

        let last = contour.last().unwrap();
        assert_eq!(last.time, 0.5);
        assert!(last.gain < 0.3 && last.gain > 0.01);
    }

    #[test]
    fn electric_guitar_releases_to_silence() {
        let contour = Instrument::ElectricGuitar.contour(1.0);
        let last = contour.last().unwrap();
        assert_eq!(last.time, 1.0);
        assert_eq!(last.gain, 0.0);
    }

    #[test]
    fn oscillator_contours_are_flat() {
        let contour = Instrument::Square.contour(0.25);
        assert_eq!(
            contour,
            vec![EnvelopePoint::new(0.0, 1.0), EnvelopePoint::new(0.25, 1.0)]
        );
    }

    #[test]
    fn percussion_decay_is_capped_by_duration() {
        let kick = Percussion::Kick.contour(0.25);
        assert_eq!(kick.last().unwrap().time, 0.25);
        assert_eq!(kick[1].gain, 1.5);

        let hihat = Percussion::Hihat.contour(2.0);
        assert_eq!(hihat.last().unwrap().time, 0.1);
        assert_eq!(voice_for(Percussion::Hihat).noise.unwrap().kind, NoiseKind::White);
    }
}
