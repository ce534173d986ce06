use crate::error::{Result, SequencerError};
use crate::midi::event::{decode_event, RawMidiEvent, META_TRACK_NAME};
use log::debug;
use serde::Serialize;

const HEADER_MAGIC: &[u8; 4] = b"MThd";
const TRACK_MAGIC: &[u8; 4] = b"MTrk";
const CHUNK_PREAMBLE_LEN: usize = 8;
const SMPTE_FLAG: u16 = 0x8000;
pub const DEFAULT_TEMPO_BPM: u32 = 120;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MidiTrack {
    /// Declared chunk length in bytes.
    pub length: u32,
    pub events: Vec<RawMidiEvent>,
}

impl MidiTrack {
    /// The first track-name meta event, if any.
    pub fn name(&self) -> Option<String> {
        self.events
            .iter()
            .find(|event| event.meta_type() == Some(META_TRACK_NAME))
            .and_then(|event| match &event.payload {
                crate::midi::EventPayload::Meta { data, .. } => {
                    Some(String::from_utf8_lossy(data).into_owned())
                }
                _ => None,
            })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MidiFile {
    pub format: u16,
    pub track_count: u16,
    /// Pulses per quarter note.
    pub time_division: u16,
    pub tracks: Vec<MidiTrack>,
    pub tempo_bpm: u32,
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    match bytes.get(offset..offset + 2) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(SequencerError::UnexpectedEof { offset }),
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    match bytes.get(offset..offset + 4) {
        Some(&[a, b, c, d]) => Ok(u32::from_be_bytes([a, b, c, d])),
        _ => Err(SequencerError::UnexpectedEof { offset }),
    }
}

fn expect_magic(bytes: &[u8], offset: usize, magic: &'static [u8; 4]) -> Result<()> {
    if bytes.get(offset..offset + 4) == Some(magic.as_slice()) {
        Ok(())
    } else {
        Err(SequencerError::InvalidHeader {
            offset,
            expected: if magic == HEADER_MAGIC { "MThd" } else { "MTrk" },
        })
    }
}

/// Decodes a Standard MIDI File held in memory.
pub fn decode_midi(bytes: &[u8]) -> Result<MidiFile> {
    expect_magic(bytes, 0, HEADER_MAGIC)?;

    let header_len = read_u32(bytes, 4)? as usize;
    let format = read_u16(bytes, 8)?;
    let track_count = read_u16(bytes, 10)?;
    let time_division = read_u16(bytes, 12)?;

    if time_division & SMPTE_FLAG != 0 {
        return Err(SequencerError::UnsupportedTimeFormat(time_division));
    }

    debug!(
        "MIDI format: {}, tracks: {}, ticks per quarter note: {}",
        format, track_count, time_division
    );

    let mut offset = CHUNK_PREAMBLE_LEN + header_len.max(6);
    let mut tracks = Vec::with_capacity(track_count as usize);
    let mut tempo_bpm = DEFAULT_TEMPO_BPM;

    for track_idx in 0..track_count {
        expect_magic(bytes, offset, TRACK_MAGIC)?;
        let length = read_u32(bytes, offset + 4)?;
        let start = offset + CHUNK_PREAMBLE_LEN;
        let end = start + length as usize;

        let Some(chunk) = bytes.get(start..end) else {
            return Err(SequencerError::UnexpectedEof { offset: bytes.len() });
        };

        let events = decode_track(chunk)?;
        for tempo in events.iter().filter_map(RawMidiEvent::tempo_bpm) {
            debug!("Tempo change -> {} bpm (track {})", tempo, track_idx);
            tempo_bpm = tempo;
        }

        debug!("Track {}: {} events in {} bytes", track_idx, events.len(), length);
        tracks.push(MidiTrack { length, events });
        offset = end;
    }

    Ok(MidiFile {
        format,
        track_count,
        time_division,
        tracks,
        tempo_bpm,
    })
}

fn decode_track(chunk: &[u8]) -> Result<Vec<RawMidiEvent>> {
    let mut events = Vec::new();
    let mut cursor = 0;
    let mut current_time: u64 = 0;
    let mut running_status: u8 = 0;

    while cursor < chunk.len() {
        let decoded = decode_event(chunk, cursor, current_time, running_status)?;
        current_time = decoded.event.absolute_time;
        running_status = decoded.running_status;
        cursor = decoded.next_offset;
        events.push(decoded.event);
    }

    Ok(events)
}
