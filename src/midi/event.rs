use crate::error::{Result, SequencerError};
use crate::midi::varlen::read_var_len;
use log::{debug, warn};
use serde::Serialize;

pub const META_STATUS: u8 = 0xFF;
pub const META_TRACK_NAME: u8 = 0x03;
pub const META_END_OF_TRACK: u8 = 0x2F;
pub const META_TEMPO: u8 = 0x51;
const SYSEX_END: u8 = 0xF7;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventType {
    NoteOff,
    NoteOn,
    PolyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    Meta,
    SysEx,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Note { key: u8, velocity: u8 },
    PolyPressure { key: u8, pressure: u8 },
    Control { controller: u8, value: u8 },
    Program { program: u8 },
    ChannelPressure { pressure: u8 },
    PitchBend { value: u16 },
    Meta { meta_type: u8, data: Vec<u8> },
    SysEx { data: Vec<u8> },
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RawMidiEvent {
    pub delta_time: u32,
    pub absolute_time: u64,
    pub status: u8,
    pub event_type: MidiEventType,
    pub channel: Option<u8>,
    pub payload: EventPayload,
}

impl RawMidiEvent {
    pub fn meta_type(&self) -> Option<u8> {
        match &self.payload {
            EventPayload::Meta { meta_type, .. } => Some(*meta_type),
            _ => None,
        }
    }

    /// Tempo in whole BPM if this is a well-formed set-tempo meta event.
    pub fn tempo_bpm(&self) -> Option<u32> {
        let EventPayload::Meta { meta_type: META_TEMPO, data } = &self.payload else {
            return None;
        };

        let [a, b, c] = data.as_slice() else {
            return None;
        };

        let micros_per_quarter = u32::from_be_bytes([0, *a, *b, *c]);
        if micros_per_quarter == 0 {
            return None;
        }

        Some((MICROSECONDS_PER_MINUTE / micros_per_quarter as f64).round() as u32)
    }

    /// Key and velocity for note events.
    pub fn note(&self) -> Option<(u8, u8)> {
        match self.payload {
            EventPayload::Note { key, velocity } => Some((key, velocity)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub event: RawMidiEvent,
    pub next_offset: usize,
    /// Status to carry into the next decode call on the same track.
    pub running_status: u8,
}

fn byte_at(bytes: &[u8], offset: usize) -> Result<u8> {
    bytes
        .get(offset)
        .copied()
        .ok_or(SequencerError::UnexpectedEof { offset })
}

fn slice_at(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or(SequencerError::UnexpectedEof { offset })?;

    bytes
        .get(offset..end)
        .ok_or(SequencerError::UnexpectedEof { offset: bytes.len() })
}

/// Decodes one delta-time + event pair starting at `offset`.
///
/// `running_status` is the last explicit channel status seen on this track (0 if none).
/// Meta and SysEx events leave it untouched.
pub fn decode_event(
    bytes: &[u8],
    offset: usize,
    current_time: u64,
    running_status: u8,
) -> Result<DecodedEvent> {
    let (delta_time, delta_len) = read_var_len(bytes, offset)?;
    let mut cursor = offset + delta_len;

    let candidate = byte_at(bytes, cursor)?;
    let status = if candidate < 0x80 {
        // data byte: leave the cursor on it and reuse the previous status
        running_status
    } else {
        cursor += 1;
        candidate
    };

    let channel = status & 0x0F;
    let (event_type, payload) = match status & 0xF0 {
        0x80 => {
            let key = byte_at(bytes, cursor)?;
            let velocity = byte_at(bytes, cursor + 1)?;
            cursor += 2;
            (MidiEventType::NoteOff, EventPayload::Note { key, velocity })
        }
        0x90 => {
            let key = byte_at(bytes, cursor)?;
            let velocity = byte_at(bytes, cursor + 1)?;
            cursor += 2;
            let event_type = if velocity == 0 {
                MidiEventType::NoteOff
            } else {
                MidiEventType::NoteOn
            };
            (event_type, EventPayload::Note { key, velocity })
        }
        0xA0 => {
            let key = byte_at(bytes, cursor)?;
            let pressure = byte_at(bytes, cursor + 1)?;
            cursor += 2;
            (
                MidiEventType::PolyPressure,
                EventPayload::PolyPressure { key, pressure },
            )
        }
        0xB0 => {
            let controller = byte_at(bytes, cursor)?;
            let value = byte_at(bytes, cursor + 1)?;
            cursor += 2;
            (
                MidiEventType::ControlChange,
                EventPayload::Control { controller, value },
            )
        }
        0xC0 => {
            let program = byte_at(bytes, cursor)?;
            cursor += 1;
            (MidiEventType::ProgramChange, EventPayload::Program { program })
        }
        0xD0 => {
            let pressure = byte_at(bytes, cursor)?;
            cursor += 1;
            (
                MidiEventType::ChannelPressure,
                EventPayload::ChannelPressure { pressure },
            )
        }
        0xE0 => {
            let lsb = byte_at(bytes, cursor)?;
            let msb = byte_at(bytes, cursor + 1)?;
            cursor += 2;
            let value = ((msb as u16) << 7) | lsb as u16;
            (MidiEventType::PitchBend, EventPayload::PitchBend { value })
        }
        0xF0 if status == META_STATUS => {
            let meta_type = byte_at(bytes, cursor)?;
            let (len, len_bytes) = read_var_len(bytes, cursor + 1)?;
            cursor += 1 + len_bytes;
            let data = slice_at(bytes, cursor, len as usize)?.to_vec();
            cursor += len as usize;
            debug!("Meta event {:#04x} with {} byte(s)", meta_type, len);
            (MidiEventType::Meta, EventPayload::Meta { meta_type, data })
        }
        0xF0 => {
            let start = cursor;
            let end = match bytes[start.min(bytes.len())..]
                .iter()
                .position(|&b| b == SYSEX_END)
            {
                Some(pos) => start + pos + 1,
                None => {
                    warn!(
                        "Unterminated SysEx starting at byte {}, consuming the rest of the track..!",
                        start
                    );
                    bytes.len().max(start)
                }
            };
            cursor = end;
            let data = bytes.get(start..end).unwrap_or_default().to_vec();
            (MidiEventType::SysEx, EventPayload::SysEx { data })
        }
        _ => {
            return Err(SequencerError::UnknownEventType {
                status,
                offset: offset + delta_len,
            });
        }
    };

    let channel = match event_type {
        MidiEventType::Meta | MidiEventType::SysEx => None,
        _ => Some(channel),
    };

    let running_status = match event_type {
        MidiEventType::Meta | MidiEventType::SysEx => running_status,
        _ => status,
    };

    Ok(DecodedEvent {
        event: RawMidiEvent {
            delta_time,
            absolute_time: current_time + delta_time as u64,
            status,
            event_type,
            channel,
            payload,
        },
        next_offset: cursor,
        running_status,
    })
}
