//! Standard MIDI File decoding.
//!
//! Bytes flow through three layers: [`varlen`] reads the base-128 quantities used for
//! delta-times and meta lengths, [`event`] decodes a single event given the track's
//! running status, and [`file`] walks the header and track chunks.

pub mod event;
pub mod file;
pub mod varlen;

pub use event::{decode_event, DecodedEvent, EventPayload, MidiEventType, RawMidiEvent};
pub use file::{decode_midi, MidiFile, MidiTrack, DEFAULT_TEMPO_BPM};
pub use varlen::{read_var_len, write_var_len};
