use crate::model::instruments::{Instrument, Percussion};
use crate::model::pattern::{
    CanonicalPattern, ChordNote, PatternItem, Pitch, Volume, volume_breakpoints,
};
use crate::model::request::{Sound, SynthesisRequest, Timeline};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Oscillator used for a single note with no instrument.
pub const DEFAULT_NOTE_INSTRUMENT: Instrument = Instrument::Square;
/// Oscillator used for a chord note with no instrument.
pub const DEFAULT_CHORD_INSTRUMENT: Instrument = Instrument::Sine;

/// Which of the two patterns take part in combined playback.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    #[default]
    Both,
    Beat,
    Melody,
}

impl PlaybackMode {
    pub fn includes_beat(self) -> bool {
        matches!(self, PlaybackMode::Both | PlaybackMode::Beat)
    }

    pub fn includes_melody(self) -> bool {
        matches!(self, PlaybackMode::Both | PlaybackMode::Melody)
    }
}

/// Length of an item in beats.
///
/// An explicit `dur` wins. Otherwise a beat chord lasts as long as its shortest child
/// (children without `dur` count as one beat), a note chord as long as its shortest
/// child with an explicit `dur` (zero if none has one), and anything else one beat.
pub fn resolve_beats(item: &PatternItem) -> f64 {
    if let Some(dur) = item.explicit_dur() {
        return dur;
    }

    match item {
        PatternItem::BeatChord { beats, .. } if !beats.is_empty() => beats
            .iter()
            .map(|child| child.dur.unwrap_or(1.0))
            .fold(f64::INFINITY, f64::min),
        PatternItem::NoteChord { notes, .. } => notes
            .iter()
            .filter_map(|child| child.dur)
            .reduce(f64::min)
            .unwrap_or(0.0),
        _ => 1.0,
    }
}

/// Total length in beats, skipped items excluded.
pub fn pattern_duration_beats(pattern: &CanonicalPattern) -> f64 {
    pattern.items.iter().map(resolve_beats).sum()
}

fn beat_request(
    percussion: Percussion,
    vol: Option<&Volume>,
    start: f64,
    duration: f64,
) -> SynthesisRequest {
    SynthesisRequest {
        sound: Sound::Beat { percussion },
        label: percussion.name().to_owned(),
        start_offset_seconds: start,
        duration_seconds: duration,
        volume_envelope: volume_breakpoints(vol, duration),
        amplitude_shape: percussion.contour(duration),
    }
}

fn tone_request(
    pitch: &Pitch,
    instrument: Instrument,
    vol: Option<&Volume>,
    start: f64,
    duration: f64,
) -> Option<SynthesisRequest> {
    let Some(frequency_hz) = pitch.frequency_hz() else {
        warn!("No frequency for pitch {:?}: skipping..!", pitch);
        return None;
    };

    Some(SynthesisRequest {
        sound: Sound::Tone {
            frequency_hz,
            instrument,
        },
        label: pitch.label(),
        start_offset_seconds: start,
        duration_seconds: duration,
        volume_envelope: volume_breakpoints(vol, duration),
        amplitude_shape: instrument.contour(duration),
    })
}

fn chord_note_request(
    child: &ChordNote,
    chord_beats: f64,
    seconds_per_beat: f64,
    start: f64,
) -> Option<SynthesisRequest> {
    let pitch = child.pitch.as_ref()?;
    let beats = child.dur.unwrap_or(chord_beats);
    if beats <= 0.0 {
        return None;
    }

    tone_request(
        pitch,
        child.instrument.unwrap_or(DEFAULT_CHORD_INSTRUMENT),
        child.vol.as_ref(),
        start,
        beats * seconds_per_beat,
    )
}

/// Walks the pattern with a single cursor and emits one request per sounding item or chord child.
pub fn schedule(pattern: &CanonicalPattern) -> Timeline {
    let seconds_per_beat = pattern.seconds_per_beat();
    let mut cursor = 0.0;
    let mut requests = Vec::new();

    for (index, item) in pattern.items.iter().enumerate() {
        let beats = resolve_beats(item);
        if beats == 0.0 {
            debug!("Item {} has zero duration, skipping..!", index);
            continue;
        }

        let item_seconds = beats * seconds_per_beat;

        match item {
            PatternItem::Beat { beat, vol, .. } => {
                requests.push(beat_request(*beat, vol.as_ref(), cursor, item_seconds));
            }
            PatternItem::BeatChord { beats: children, .. } => {
                for child in children {
                    let child_beats = child.dur.unwrap_or(beats);
                    if child_beats <= 0.0 {
                        continue;
                    }
                    requests.push(beat_request(
                        child.beat,
                        child.vol.as_ref(),
                        cursor,
                        child_beats * seconds_per_beat,
                    ));
                }
            }
            PatternItem::Note {
                pitch,
                instrument,
                vol,
                ..
            } => {
                requests.extend(tone_request(
                    pitch,
                    instrument.unwrap_or(DEFAULT_NOTE_INSTRUMENT),
                    vol.as_ref(),
                    cursor,
                    item_seconds,
                ));
            }
            PatternItem::NoteChord { notes, .. } => {
                requests.extend(
                    notes
                        .iter()
                        .filter_map(|child| chord_note_request(child, beats, seconds_per_beat, cursor)),
                );
            }
            PatternItem::Rest { .. } => {}
        }

        cursor += item_seconds;
    }

    debug!(
        "Scheduled {} requests over {:.3}s at {} bpm",
        requests.len(),
        cursor,
        pattern.bpm
    );

    Timeline {
        bpm: pattern.bpm,
        requests,
        total_seconds: cursor,
    }
}

/// Merges the selected timelines into one, ordered by start offset.
pub fn arrange(beat: &Timeline, melody: &Timeline, mode: PlaybackMode) -> Timeline {
    let mut requests = Vec::new();
    let mut total_seconds: f64 = 0.0;

    if mode.includes_beat() {
        requests.extend(beat.requests.iter().cloned());
        total_seconds = total_seconds.max(beat.total_seconds);
    }
    if mode.includes_melody() {
        requests.extend(melody.requests.iter().cloned());
        total_seconds = total_seconds.max(melody.total_seconds);
    }

    requests.sort_by(|a, b| a.start_offset_seconds.total_cmp(&b.start_offset_seconds));

    Timeline {
        bpm: if mode.includes_beat() { beat.bpm } else { melody.bpm },
        requests,
        total_seconds,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::envelope::EnvelopePoint;
    use crate::model::request::RequestKind;
    use crate::normalizer::normalize;
    use serde_json::{Value, json};

    fn timeline(input: Value, bpm: f64) -> Timeline {
        schedule(&normalize(&input, bpm).unwrap())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn kick_rest_snare() {
        env_logger::try_init().unwrap_or(());

        let t = timeline(
            json!([
                {"beat": "kick", "dur": 1},
                {"beat": "rest", "dur": 1},
                {"beat": "snare", "dur": 1}
            ]),
            120.0,
        );

        let summary: Vec<(&str, f64, f64)> = t
            .requests
            .iter()
            .map(|r| (r.label.as_str(), r.start_offset_seconds, r.duration_seconds))
            .collect();
        assert_eq!(summary, vec![("kick", 0.0, 0.5), ("snare", 1.0, 0.5)]);
        assert!(t.requests.iter().all(|r| r.kind() == RequestKind::Beat));
        assert_eq!(t.total_seconds, 1.5);
    }

    #[test]
    fn zero_duration_items_are_skipped_entirely() {
        let shapes = [
            json!({"beat": "kick", "dur": 0}),
            json!({"beat": "rest", "dur": 0}),
            json!({"note": "C4", "dur": 0}),
            json!({"freq": 300, "dur": 0}),
            json!({"beats": ["kick", "snare"], "dur": 0}),
            json!({"beats": [{"beat": "kick", "dur": 0}, {"beat": "snare", "dur": 2}]}),
            json!({"notes": [{"note": "C4", "dur": 1}], "dur": 0}),
            json!({"notes": [{"note": "C4"}, {"note": "E4"}]}),
        ];

        for shape in shapes {
            let t = timeline(json!([shape, {"beat": "kick"}]), 120.0);
            assert_eq!(t.requests.len(), 1, "{shape}");
            assert_eq!(t.requests[0].start_offset_seconds, 0.0, "{shape}");
            assert_eq!(t.total_seconds, 0.5, "{shape}");
        }
    }

    #[test]
    fn chords_advance_by_their_shortest_child() {
        let t = timeline(
            json!([
                {"beats": [{"beat": "kick", "dur": 2}, {"beat": "hihat", "dur": 1}]},
                {"beat": "snare"}
            ]),
            120.0,
        );

        assert_eq!(t.requests.len(), 3);
        assert_eq!(t.requests[0].duration_seconds, 1.0);
        assert_eq!(t.requests[1].duration_seconds, 0.5);
        assert_eq!(t.requests[0].start_offset_seconds, t.requests[1].start_offset_seconds);
        assert_eq!(t.requests[2].start_offset_seconds, 0.5);
    }

    #[test]
    fn bare_chord_children_take_the_chord_duration() {
        let t = timeline(json!([{"beats": ["kick", "hihat"], "dur": 0.5}]), 60.0);
        assert!(t.requests.iter().all(|r| r.duration_seconds == 0.5));

        let t = timeline(json!([{"beats": ["kick", {"beat": "hihat", "dur": 3}]}]), 60.0);
        assert_eq!(t.total_seconds, 1.0);
        assert_eq!(t.requests[1].duration_seconds, 3.0);
    }

    #[test]
    fn note_chords_use_explicit_child_durations() {
        let t = timeline(
            json!([
                {"notes": [
                    {"note": "C4", "dur": 2, "instrument": "strings", "vol": 0.5},
                    {"note": "E4", "dur": 1},
                    {"note": "G4"},
                    {"dur": 1}
                ]},
                {"note": "A4"}
            ]),
            60.0,
        );

        assert_eq!(t.requests.len(), 4);
        let durations: Vec<f64> = t.requests.iter().map(|r| r.duration_seconds).collect();
        assert_eq!(durations, vec![2.0, 1.0, 1.0, 1.0]);
        assert_eq!(t.requests[3].start_offset_seconds, 1.0);

        assert_eq!(t.requests[0].instrument(), Some(Instrument::Strings));
        assert_eq!(t.requests[1].instrument(), Some(DEFAULT_CHORD_INSTRUMENT));
        assert_eq!(t.requests[3].instrument(), Some(DEFAULT_NOTE_INSTRUMENT));
        assert_eq!(t.requests[0].volume_envelope, vec![EnvelopePoint::new(0.0, 0.5)]);
    }

    #[test]
    fn chord_children_do_not_inherit_volume() {
        let t = timeline(
            json!([{"beats": [{"beat": "kick"}, {"beat": "snare", "vol": 0.3}], "dur": 1}]),
            120.0,
        );
        assert_eq!(t.requests[0].volume_envelope, vec![EnvelopePoint::new(0.0, 1.0)]);
        assert_eq!(t.requests[1].volume_envelope, vec![EnvelopePoint::new(0.0, 0.3)]);
    }

    #[test]
    fn notes_resolve_frequency_and_label() {
        let t = timeline(
            json!([
                {"note": "A4", "instrument": "piano"},
                {"freq": 261.63, "note": "C4"},
                {"note": "rest"}
            ]),
            120.0,
        );

        assert_eq!(t.requests.len(), 2);
        assert_eq!(t.requests[0].frequency_hz(), Some(440.0));
        assert_eq!(t.requests[0].label, "A4");
        assert_eq!(t.requests[0].amplitude_shape[1], EnvelopePoint::new(0.01, 1.0));
        assert_eq!(t.requests[1].frequency_hz(), Some(261.63));
        assert_eq!(t.total_seconds, 1.5);
    }

    #[test]
    fn volume_arrays_become_breakpoints() {
        let t = timeline(json!([{"note": "C4", "dur": 1, "vol": [0.2, 0.8, 0.1]}]), 60.0);

        let points = &t.requests[0].volume_envelope;
        assert_eq!(
            *points,
            vec![
                EnvelopePoint::new(0.0, 0.2),
                EnvelopePoint::new(0.5, 0.8),
                EnvelopePoint::new(1.0, 0.1),
            ]
        );

        let effective = t.requests[0].effective_envelope();
        assert!(approx(effective[1].gain, 0.8));
    }

    #[test]
    fn duration_counts_every_non_zero_item() {
        let pattern = normalize(
            &json!([
                {"beat": "kick"},
                {"beat": "rest", "dur": 0.5},
                {"beat": "snare", "dur": 0},
                {"beats": [{"beat": "kick", "dur": 2}, {"beat": "hihat", "dur": 0.25}]}
            ]),
            120.0,
        )
        .unwrap();

        assert!(approx(pattern_duration_beats(&pattern), 1.75));
        assert!(approx(schedule(&pattern).total_seconds, 0.875));
    }

    #[test]
    fn arrange_merges_by_start_offset() {
        let beat = timeline(json!([{"beat": "kick"}, {"beat": "snare"}]), 120.0);
        let melody = timeline(json!({"bpm": 60, "notes": [{"note": "C4", "dur": 0.25}, {"note": "D4"}]}), 120.0);

        let both = arrange(&beat, &melody, PlaybackMode::Both);
        let starts: Vec<f64> = both.requests.iter().map(|r| r.start_offset_seconds).collect();
        assert_eq!(starts, vec![0.0, 0.0, 0.25, 0.5]);
        assert_eq!(both.requests[0].label, "kick");
        assert_eq!(both.total_seconds, 1.25);

        let melody_only = arrange(&beat, &melody, PlaybackMode::Melody);
        assert_eq!(melody_only.requests.len(), 2);
        assert_eq!(melody_only.bpm, 60.0);
        assert_eq!(arrange(&beat, &melody, PlaybackMode::Beat).total_seconds, 1.0);
    }
}
