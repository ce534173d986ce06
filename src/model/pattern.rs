use crate::model::envelope::{self, EnvelopePoint};
use crate::model::instruments::{Instrument, Percussion};
use crate::model::pitch;
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value, json};

/// Tempo assumed when neither the pattern nor the caller provides one.
pub const DEFAULT_BPM: f64 = 120.0;
pub const MAX_BPM: f64 = 300.0;

/// Gain for an item: one constant level, or breakpoints spread across the item.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Volume {
    Constant(f64),
    Envelope(Vec<f64>),
}

impl Volume {
    pub fn breakpoints(&self, duration: f64) -> Vec<EnvelopePoint> {
        match self {
            Volume::Constant(v) => envelope::spread(&[*v], duration),
            Volume::Envelope(values) => envelope::spread(values, duration),
        }
    }
}

/// Missing volume is full volume.
pub fn volume_breakpoints(vol: Option<&Volume>, duration: f64) -> Vec<EnvelopePoint> {
    match vol {
        Some(vol) => vol.breakpoints(duration),
        None => envelope::spread(&[], duration),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pitch {
    Named(String),
    Frequency(f64),
}

impl Pitch {
    pub fn frequency_hz(&self) -> Option<f64> {
        match self {
            Pitch::Named(name) => pitch::frequency_from_note_name(name),
            Pitch::Frequency(hz) => Some(*hz),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Pitch::Named(name) => name.clone(),
            Pitch::Frequency(hz) => format!("{:.2}Hz", hz),
        }
    }

    fn write_into(&self, obj: &mut Map<String, Value>) {
        match self {
            Pitch::Named(name) => {
                obj.insert("note".into(), json!(name));
            }
            Pitch::Frequency(hz) => {
                obj.insert("freq".into(), json!(hz));
            }
        }
    }
}

/// Which kind of sequence a rest came from, so it serializes back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestContext {
    Beat,
    Melody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChordBeat {
    pub beat: Percussion,
    pub dur: Option<f64>,
    pub vol: Option<Volume>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChordNote {
    /// `None` plays nothing.
    pub pitch: Option<Pitch>,
    pub dur: Option<f64>,
    pub instrument: Option<Instrument>,
    pub vol: Option<Volume>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternItem {
    Beat {
        beat: Percussion,
        dur: Option<f64>,
        vol: Option<Volume>,
    },
    BeatChord {
        beats: Vec<ChordBeat>,
        dur: Option<f64>,
    },
    Note {
        pitch: Pitch,
        dur: Option<f64>,
        instrument: Option<Instrument>,
        vol: Option<Volume>,
    },
    NoteChord {
        notes: Vec<ChordNote>,
        dur: Option<f64>,
    },
    Rest {
        context: RestContext,
        dur: Option<f64>,
    },
}

fn insert_common(obj: &mut Map<String, Value>, dur: Option<f64>, vol: Option<&Volume>) {
    if let Some(dur) = dur {
        obj.insert("dur".into(), json!(dur));
    }
    if let Some(vol) = vol {
        obj.insert("vol".into(), json!(vol));
    }
}

impl PatternItem {
    pub fn explicit_dur(&self) -> Option<f64> {
        match self {
            PatternItem::Beat { dur, .. }
            | PatternItem::BeatChord { dur, .. }
            | PatternItem::Note { dur, .. }
            | PatternItem::NoteChord { dur, .. }
            | PatternItem::Rest { dur, .. } => *dur,
        }
    }

    /// The item in its canonical JSON shape.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();

        match self {
            PatternItem::Beat { beat, dur, vol } => {
                obj.insert("beat".into(), json!(beat));
                insert_common(&mut obj, *dur, vol.as_ref());
            }
            PatternItem::BeatChord { beats, dur } => {
                let children: Vec<Value> = beats
                    .iter()
                    .map(|child| {
                        if child.dur.is_none() && child.vol.is_none() {
                            json!(child.beat)
                        } else {
                            let mut c = Map::new();
                            c.insert("beat".into(), json!(child.beat));
                            insert_common(&mut c, child.dur, child.vol.as_ref());
                            Value::Object(c)
                        }
                    })
                    .collect();
                obj.insert("beats".into(), Value::Array(children));
                insert_common(&mut obj, *dur, None);
            }
            PatternItem::Note {
                pitch,
                dur,
                instrument,
                vol,
            } => {
                pitch.write_into(&mut obj);
                insert_common(&mut obj, *dur, vol.as_ref());
                if let Some(instrument) = instrument {
                    obj.insert("instrument".into(), json!(instrument));
                }
            }
            PatternItem::NoteChord { notes, dur } => {
                let children: Vec<Value> = notes
                    .iter()
                    .map(|child| {
                        let mut c = Map::new();
                        if let Some(pitch) = &child.pitch {
                            pitch.write_into(&mut c);
                        }
                        insert_common(&mut c, child.dur, child.vol.as_ref());
                        if let Some(instrument) = child.instrument {
                            c.insert("instrument".into(), json!(instrument));
                        }
                        Value::Object(c)
                    })
                    .collect();
                obj.insert("notes".into(), Value::Array(children));
                insert_common(&mut obj, *dur, None);
            }
            PatternItem::Rest { context, dur } => {
                let key = match context {
                    RestContext::Beat => "beat",
                    RestContext::Melody => "note",
                };
                obj.insert(key.into(), json!("rest"));
                insert_common(&mut obj, *dur, None);
            }
        }

        Value::Object(obj)
    }
}

impl Serialize for PatternItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A validated pattern with its effective tempo.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct CanonicalPattern {
    pub bpm: f64,
    #[serde(rename = "pattern")]
    pub items: Vec<PatternItem>,
}

impl CanonicalPattern {
    pub fn new(bpm: f64, items: Vec<PatternItem>) -> Self {
        Self { bpm, items }
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }
}
