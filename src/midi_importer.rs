use crate::midi::{MidiEventType, MidiFile, decode_midi};
use crate::model::instruments::{Instrument, Percussion};
use crate::model::pattern::{MAX_BPM, PatternItem, Pitch, RestContext, Volume};
use crate::model::pitch::note_name_from_midi_number;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Gaps shorter than this many beats are absorbed instead of becoming rests.
const REST_THRESHOLD_BEATS: f64 = 0.1;
const MIN_NOTE_BEATS: f64 = 0.25;
const IMPORT_INSTRUMENT: Instrument = Instrument::Piano;

#[derive(Debug, Clone, Copy)]
struct NoteInterval {
    midi: u8,
    start_tick: u64,
    end_tick: u64,
    velocity: u8,
}

/// Beat and melody patterns recovered from a MIDI file.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ImportedPatterns {
    pub title: Option<String>,
    pub tempo_bpm: u32,
    pub beat_pattern: Vec<PatternItem>,
    pub melody_pattern: Vec<PatternItem>,
}

impl ImportedPatterns {
    pub fn beat_json(&self) -> Value {
        json!({ "bpm": self.tempo_bpm, "pattern": self.beat_pattern })
    }

    pub fn melody_json(&self) -> Value {
        json!({ "bpm": self.tempo_bpm, "pattern": self.melody_pattern })
    }
}

pub fn import_midi_file<P: AsRef<Path>>(path: P) -> Result<ImportedPatterns> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read MIDI file {}", path.display()))?;

    let file = decode_midi(&bytes)
        .with_context(|| format!("Failed to decode MIDI file {}", path.display()))?;

    let mut patterns = convert_to_patterns(&file);
    patterns.title = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string());

    info!(
        "Imported '{}': {} melody items, {} beat items at {} bpm..!",
        patterns.title.as_deref().unwrap_or("No Title"),
        patterns.melody_pattern.len(),
        patterns.beat_pattern.len(),
        patterns.tempo_bpm
    );

    Ok(patterns)
}

fn round_to_quarter(beats: f64) -> f64 {
    (beats * 4.0).round() / 4.0
}

/// Pairs note-ons with note-offs across every track in time order, then lays the notes out as a
/// melody with rests in the gaps and a backing beat spanning the same length.
pub fn convert_to_patterns(file: &MidiFile) -> ImportedPatterns {
    let ticks_per_quarter = file.time_division.max(1) as f64;

    let mut intervals: Vec<NoteInterval> = Vec::new();
    let mut open_notes: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

    let mut note_events = Vec::new();
    for (track_idx, track) in file.tracks.iter().enumerate() {
        if let Some(name) = track.name() {
            debug!("Track {} name: {}", track_idx, name);
        }

        note_events.extend(track.events.iter().filter_map(|event| {
            let (Some(ch), Some((key, velocity))) = (event.channel, event.note()) else {
                return None;
            };
            Some((event.absolute_time, event.event_type, ch, key, velocity))
        }));
    }

    // tracks are decoded one after another, pairing needs file time order
    note_events.sort_by_key(|(tick, ..)| *tick);

    for (tick, event_type, ch, key, velocity) in note_events {
        match event_type {
            MidiEventType::NoteOn => open_notes
                .entry((ch, key))
                .or_default()
                .push((tick, velocity)),
            MidiEventType::NoteOff => close_note(&mut open_notes, &mut intervals, ch, key, tick),
            _ => {}
        }
    }

    for ((ch, key), stack) in open_notes.into_iter() {
        for (start_tick, _) in stack {
            warn!(
                "Unclosed NoteOn for {}, channel: {} at tick: {}, dropping it..!",
                key, ch, start_tick
            );
        }
    }

    intervals.sort_by_key(|interval| interval.start_tick);

    let mut melody_pattern = Vec::with_capacity(intervals.len());
    let mut last_end_tick: u64 = 0;

    for interval in intervals.iter() {
        let gap = (interval.start_tick as f64 - last_end_tick as f64) / ticks_per_quarter;
        if gap > REST_THRESHOLD_BEATS {
            let dur = round_to_quarter(gap);
            if dur > 0.0 {
                melody_pattern.push(PatternItem::Rest {
                    context: RestContext::Melody,
                    dur: Some(dur),
                });
            }
        }

        let length = interval.end_tick.saturating_sub(interval.start_tick) as f64 / ticks_per_quarter;
        melody_pattern.push(PatternItem::Note {
            pitch: Pitch::Named(note_name_from_midi_number(interval.midi)),
            dur: Some(round_to_quarter(length).max(MIN_NOTE_BEATS)),
            instrument: Some(IMPORT_INSTRUMENT),
            vol: Some(Volume::Constant(interval.velocity as f64 / 127.0)),
        });

        last_end_tick = interval.end_tick;
    }

    let total_beats = (last_end_tick as f64 / ticks_per_quarter).ceil() as usize;
    let beat_pattern = backing_beat(total_beats);

    if file.tempo_bpm as f64 > MAX_BPM {
        warn!(
            "Tempo {} bpm is above {} and the imported patterns will not validate..!",
            file.tempo_bpm, MAX_BPM
        );
    }

    debug!(
        "Converted {} notes into {} melody items over {} beats",
        intervals.len(),
        melody_pattern.len(),
        total_beats
    );

    ImportedPatterns {
        title: None,
        tempo_bpm: file.tempo_bpm,
        beat_pattern,
        melody_pattern,
    }
}

/// Kick on the bar, snare on the off-beats, two eighth hihats on beat three.
fn backing_beat(total_beats: usize) -> Vec<PatternItem> {
    let hit = |beat: Percussion, dur: f64, vol: f64| PatternItem::Beat {
        beat,
        dur: Some(dur),
        vol: Some(Volume::Envelope(vec![vol])),
    };

    let mut pattern = Vec::with_capacity(total_beats);
    for i in 0..total_beats {
        if i % 4 == 0 {
            pattern.push(hit(Percussion::Kick, 1.0, 0.8));
        } else if i % 2 == 1 {
            pattern.push(hit(Percussion::Snare, 1.0, 0.6));
        } else {
            pattern.push(hit(Percussion::Hihat, 0.5, 0.4));
            pattern.push(hit(Percussion::Hihat, 0.5, 0.4));
        }
    }

    pattern
}

fn close_note(
    open_notes: &mut HashMap<(u8, u8), Vec<(u64, u8)>>,
    intervals: &mut Vec<NoteInterval>,
    ch: u8,
    midi_num: u8,
    abs_tick: u64,
) {
    let Some((start_tick, velocity)) = open_notes
        .get_mut(&(ch, midi_num))
        .and_then(|stack| stack.pop())
    else {
        debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        );
        return;
    };

    intervals.push(NoteInterval {
        midi: midi_num,
        start_tick,
        end_tick: abs_tick,
        velocity,
    });
}
