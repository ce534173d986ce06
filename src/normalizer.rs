use crate::error::{Result, SequencerError};
use crate::model::instruments::{Instrument, Percussion};
use crate::model::pattern::{
    CanonicalPattern, ChordBeat, ChordNote, MAX_BPM, PatternItem, Pitch, RestContext, Volume,
};
use crate::model::pitch;
use log::debug;
use serde_json::{Map, Value};

const REST: &str = "rest";

/// Container keys, in the order they are looked up.
const ITEM_KEYS: [&str; 3] = ["pattern", "beats", "notes"];

/// Locates the item list and any explicit bpm in a pattern container.
///
/// Accepts a bare array, or an object holding the array under `pattern`, `beats`
/// or `notes` with an optional `bpm` alongside.
pub fn extract_items(input: &Value) -> Result<(Option<&Value>, &[Value])> {
    match input {
        Value::Array(items) => Ok((None, items.as_slice())),
        Value::Object(obj) => ITEM_KEYS
            .iter()
            .find_map(|key| match obj.get(*key) {
                Some(Value::Array(items)) => Some(items.as_slice()),
                _ => None,
            })
            .map(|items| (obj.get("bpm").filter(|bpm| !bpm.is_null()), items))
            .ok_or(SequencerError::InvalidPatternShape),
        _ => Err(SequencerError::InvalidPatternShape),
    }
}

fn check_bpm(value: &Value) -> Result<f64> {
    match value.as_f64() {
        Some(bpm) if bpm.is_finite() && bpm > 0.0 && bpm <= MAX_BPM => Ok(bpm),
        _ => Err(SequencerError::InvalidBpm(value.to_string())),
    }
}

/// Validates a pattern and resolves every item into its canonical form.
pub fn normalize(input: &Value, fallback_bpm: f64) -> Result<CanonicalPattern> {
    let (bpm, items) = extract_items(input)?;

    let bpm = match bpm {
        Some(explicit) => check_bpm(explicit)?,
        None => check_bpm(&Value::from(fallback_bpm))?,
    };

    let items = items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_item(index, item))
        .collect::<Result<Vec<_>>>()?;

    debug!("Normalized pattern: {} items at {} bpm", items.len(), bpm);

    Ok(CanonicalPattern::new(bpm, items))
}

/// Parses JSON text, then normalizes it.
pub fn normalize_str(text: &str, fallback_bpm: f64) -> Result<CanonicalPattern> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| SequencerError::InvalidJson(e.to_string()))?;
    normalize(&value, fallback_bpm)
}

fn parse_item(index: usize, item: &Value) -> Result<PatternItem> {
    let Value::Object(obj) = item else {
        return Err(SequencerError::item(index, "item must be an object"));
    };

    let has_beat = obj.contains_key("beat");
    let has_beats = obj.contains_key("beats");
    let has_note = obj.contains_key("note") || obj.contains_key("freq");
    let has_notes = obj.contains_key("notes");

    match (has_beat, has_beats, has_note, has_notes) {
        (true, false, false, false) => parse_beat(index, obj),
        (false, true, false, false) => parse_beat_chord(index, obj),
        (false, false, true, false) => parse_note(index, obj),
        (false, false, false, true) => parse_note_chord(index, obj),
        (false, false, false, false) => Err(SequencerError::item(
            index,
            "missing 'beat', 'beats', 'note', 'notes' or 'freq'",
        )),
        _ => Err(SequencerError::item(
            index,
            "only one of 'beat', 'beats', 'note'/'freq' or 'notes' may be given",
        )),
    }
}

fn parse_beat(index: usize, obj: &Map<String, Value>) -> Result<PatternItem> {
    let dur = parse_dur(index, obj)?;

    if obj.get("beat").and_then(Value::as_str) == Some(REST) {
        return Ok(PatternItem::Rest {
            context: RestContext::Beat,
            dur,
        });
    }

    Ok(PatternItem::Beat {
        beat: parse_percussion(index, obj.get("beat"))?,
        dur,
        vol: parse_vol(index, obj)?,
    })
}

fn parse_beat_chord(index: usize, obj: &Map<String, Value>) -> Result<PatternItem> {
    let Some(Value::Array(children)) = obj.get("beats") else {
        return Err(SequencerError::item(index, "'beats' must be an array"));
    };

    let beats = children
        .iter()
        .enumerate()
        .map(|(child_idx, child)| match child {
            Value::String(_) => Ok(ChordBeat {
                beat: parse_percussion(index, Some(child))?,
                dur: None,
                vol: None,
            }),
            Value::Object(c) => {
                if !c.contains_key("beat") {
                    return Err(SequencerError::item(
                        index,
                        format!("beats[{}] is missing 'beat'", child_idx),
                    ));
                }
                Ok(ChordBeat {
                    beat: parse_percussion(index, c.get("beat"))?,
                    dur: parse_dur(index, c)?,
                    vol: parse_vol(index, c)?,
                })
            }
            _ => Err(SequencerError::item(
                index,
                format!("beats[{}] must be a string or an object", child_idx),
            )),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PatternItem::BeatChord {
        beats,
        dur: parse_dur(index, obj)?,
    })
}

fn parse_note(index: usize, obj: &Map<String, Value>) -> Result<PatternItem> {
    let dur = parse_dur(index, obj)?;

    if obj.get("note").and_then(Value::as_str) == Some(REST) {
        return Ok(PatternItem::Rest {
            context: RestContext::Melody,
            dur,
        });
    }

    let Some(pitch) = parse_pitch(index, obj)? else {
        return Err(SequencerError::item(index, "missing 'note' or 'freq'"));
    };

    Ok(PatternItem::Note {
        pitch,
        dur,
        instrument: parse_instrument(index, obj)?,
        vol: parse_vol(index, obj)?,
    })
}

fn parse_note_chord(index: usize, obj: &Map<String, Value>) -> Result<PatternItem> {
    let Some(Value::Array(children)) = obj.get("notes") else {
        return Err(SequencerError::item(index, "'notes' must be an array"));
    };

    let notes = children
        .iter()
        .enumerate()
        .map(|(child_idx, child)| {
            let Value::Object(c) = child else {
                return Err(SequencerError::item(
                    index,
                    format!("notes[{}] must be an object", child_idx),
                ));
            };

            let pitch = match c.get("note").and_then(Value::as_str) {
                Some(REST) => None,
                _ => parse_pitch(index, c)?,
            };

            Ok(ChordNote {
                pitch,
                dur: parse_dur(index, c)?,
                instrument: parse_instrument(index, c)?,
                vol: parse_vol(index, c)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PatternItem::NoteChord {
        notes,
        dur: parse_dur(index, obj)?,
    })
}

/// `freq` wins over `note`; a note name is only required to parse when no `freq` is given.
fn parse_pitch(index: usize, obj: &Map<String, Value>) -> Result<Option<Pitch>> {
    if let Some(freq) = obj.get("freq") {
        return match freq.as_f64() {
            Some(hz) if hz.is_finite() && hz > 0.0 => Ok(Some(Pitch::Frequency(hz))),
            _ => Err(SequencerError::item(
                index,
                "'freq' must be a positive number in Hz",
            )),
        };
    }

    match obj.get("note") {
        None => Ok(None),
        Some(Value::String(name)) if pitch::semitones_from_a4(name).is_some() => {
            Ok(Some(Pitch::Named(name.clone())))
        }
        Some(Value::String(name)) => Err(SequencerError::item(
            index,
            format!("'{}' is not a note name like C4, D#5 or Bb3", name),
        )),
        Some(_) => Err(SequencerError::item(index, "'note' must be a string")),
    }
}

fn parse_percussion(index: usize, value: Option<&Value>) -> Result<Percussion> {
    match value {
        Some(Value::String(name)) => name
            .parse::<Percussion>()
            .map_err(|why| SequencerError::item(index, why)),
        _ => Err(SequencerError::item(index, "'beat' must be a string")),
    }
}

fn parse_instrument(index: usize, obj: &Map<String, Value>) -> Result<Option<Instrument>> {
    match obj.get("instrument") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => name
            .parse::<Instrument>()
            .map(Some)
            .map_err(|why| SequencerError::item(index, why)),
        Some(_) => Err(SequencerError::item(index, "'instrument' must be a string")),
    }
}

fn parse_dur(index: usize, obj: &Map<String, Value>) -> Result<Option<f64>> {
    match obj.get("dur") {
        None | Some(Value::Null) => Ok(None),
        Some(dur) => match dur.as_f64() {
            Some(beats) if beats.is_finite() && beats >= 0.0 => Ok(Some(beats)),
            _ => Err(SequencerError::item(
                index,
                "'dur' must be a non-negative number",
            )),
        },
    }
}

fn unit_gain(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| (0.0..=1.0).contains(v))
}

fn parse_vol(index: usize, obj: &Map<String, Value>) -> Result<Option<Volume>> {
    let invalid = || {
        SequencerError::item(
            index,
            "'vol' must be a number or an array of numbers between 0 and 1",
        )
    };

    match obj.get("vol") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(points)) => points
            .iter()
            .map(|p| unit_gain(p).ok_or_else(invalid))
            .collect::<Result<Vec<_>>>()
            .map(|points| Some(Volume::Envelope(points))),
        Some(value) => unit_gain(value)
            .map(|v| Some(Volume::Constant(v)))
            .ok_or_else(invalid),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn bpm_is_checked_even_for_empty_patterns() {
        env_logger::try_init().unwrap_or(());

        assert_eq!(
            normalize(&json!({"bpm": 301, "pattern": []}), 120.0),
            Err(SequencerError::InvalidBpm("301".into()))
        );
        assert!(matches!(
            normalize(&json!({"bpm": 0, "beats": []}), 120.0),
            Err(SequencerError::InvalidBpm(_))
        ));
        assert!(matches!(
            normalize(&json!({"bpm": "fast", "notes": []}), 120.0),
            Err(SequencerError::InvalidBpm(_))
        ));
        assert!(matches!(
            normalize(&json!([]), -1.0),
            Err(SequencerError::InvalidBpm(_))
        ));

        let edge = normalize(&json!({"bpm": 300, "pattern": []}), 120.0).unwrap();
        assert_eq!(edge.bpm, 300.0);
    }

    #[test]
    fn accepts_the_four_container_shapes() {
        let item = json!({"beat": "kick"});

        let bare = normalize(&json!([item]), 90.0).unwrap();
        assert_eq!(bare.bpm, 90.0);
        assert_eq!(bare.items.len(), 1);

        for key in ["pattern", "beats", "notes"] {
            let wrapped = normalize(&json!({ key: [item], "bpm": 140 }), 90.0).unwrap();
            assert_eq!(wrapped.bpm, 140.0, "{key}");
            assert_eq!(wrapped.items, bare.items, "{key}");
        }

        let no_bpm = normalize(&json!({"pattern": [item]}), 90.0).unwrap();
        assert_eq!(no_bpm.bpm, 90.0);
    }

    #[test]
    fn rejects_unknown_containers() {
        for input in [
            json!({"items": []}),
            json!({"pattern": "kick"}),
            json!("kick"),
            json!(42),
            json!(null),
        ] {
            assert_eq!(
                normalize(&input, 120.0),
                Err(SequencerError::InvalidPatternShape),
                "{input}"
            );
        }
    }

    #[test]
    fn resolves_items_into_variants() {
        let pattern = normalize(
            &json!([
                {"beat": "kick", "dur": 1, "vol": 0.8},
                {"beat": "rest"},
                {"beats": ["kick", {"beat": "hihat", "dur": 0.5, "vol": [0.4, 0.1]}], "dur": 2},
                {"note": "C4", "instrument": "piano"},
                {"note": "rest", "dur": 0.5},
                {"freq": 440, "note": "not-a-note"},
                {"notes": [{"note": "E4"}, {"freq": 392.0, "dur": 2}, {}]}
            ]),
            120.0,
        )
        .unwrap();

        assert_eq!(
            pattern.items[0],
            PatternItem::Beat {
                beat: Percussion::Kick,
                dur: Some(1.0),
                vol: Some(Volume::Constant(0.8)),
            }
        );
        assert_eq!(
            pattern.items[1],
            PatternItem::Rest {
                context: RestContext::Beat,
                dur: None,
            }
        );

        let PatternItem::BeatChord { beats, dur } = &pattern.items[2] else {
            panic!("expected a beat chord");
        };
        assert_eq!(*dur, Some(2.0));
        assert_eq!(beats[0].beat, Percussion::Kick);
        assert_eq!(beats[1].vol, Some(Volume::Envelope(vec![0.4, 0.1])));

        assert_eq!(
            pattern.items[3],
            PatternItem::Note {
                pitch: Pitch::Named("C4".into()),
                dur: None,
                instrument: Some(Instrument::Piano),
                vol: None,
            }
        );
        assert!(matches!(
            pattern.items[4],
            PatternItem::Rest {
                context: RestContext::Melody,
                ..
            }
        ));
        assert!(matches!(
            &pattern.items[5],
            PatternItem::Note {
                pitch: Pitch::Frequency(hz),
                ..
            } if *hz == 440.0
        ));

        let PatternItem::NoteChord { notes, dur } = &pattern.items[6] else {
            panic!("expected a note chord");
        };
        assert_eq!(*dur, None);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[1].dur, Some(2.0));
        assert_eq!(notes[2].pitch, None);
    }

    #[test]
    fn item_errors_carry_the_index() {
        let cases = [
            json!({"beat": "cymbal"}),
            json!({"beat": 3}),
            json!({"note": "H2"}),
            json!({"note": "C999999999"}),
            json!({"notes": [{"note": "G12"}]}),
            json!({"freq": -5}),
            json!({"note": "C4", "dur": -1}),
            json!({"note": "C4", "dur": "long"}),
            json!({"note": "C4", "vol": 1.5}),
            json!({"note": "C4", "vol": [0.2, "loud"]}),
            json!({"note": "C4", "instrument": "banjo"}),
            json!({"beats": "kick"}),
            json!({"beats": [{"dur": 1}]}),
            json!({"notes": ["C4"]}),
            json!({"beat": "kick", "note": "C4"}),
            json!({"dur": 1}),
            json!("kick"),
        ];

        for case in cases {
            let result = normalize(&json!([{"beat": "kick"}, case]), 120.0);
            assert!(
                matches!(result, Err(SequencerError::InvalidPatternItem { index: 1, .. })),
                "{case} -> {result:?}"
            );
        }
    }

    #[test]
    fn zero_duration_items_survive_normalization() {
        let pattern = normalize(&json!([{"beat": "kick", "dur": 0}]), 120.0).unwrap();
        assert_eq!(pattern.items[0].explicit_dur(), Some(0.0));
    }

    #[test]
    fn text_input_must_be_json() {
        assert!(matches!(
            normalize_str("[{\"beat\": ", 120.0),
            Err(SequencerError::InvalidJson(_))
        ));

        let pattern = normalize_str(r#"{"bpm": 100, "pattern": [{"beat": "snare"}]}"#, 120.0).unwrap();
        assert_eq!(pattern.bpm, 100.0);
    }
}
