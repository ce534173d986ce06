//! Equal-temperament pitch math anchored at A4 = 440 Hz (MIDI note 69).

pub const A4_HZ: f64 = 440.0;
pub const A4_MIDI: i32 = 69;

/// Octaves a note name may carry, C-1 (MIDI 0) up to B9.
const OCTAVES: std::ops::RangeInclusive<i32> = -1..=9;

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Semitone distance of a natural pitch letter from A in the same octave.
fn letter_offset(letter: char) -> Option<i32> {
    match letter.to_ascii_uppercase() {
        'C' => Some(-9),
        'D' => Some(-7),
        'E' => Some(-5),
        'F' => Some(-4),
        'G' => Some(-2),
        'A' => Some(0),
        'B' => Some(2),
        _ => None,
    }
}

/// Semitones from A4 for names like `C4`, `F#5`, `Bb3` or `C-1`.
pub fn semitones_from_a4(name: &str) -> Option<i32> {
    let mut chars = name.chars();
    let mut semitones = letter_offset(chars.next()?)?;

    let rest = chars.as_str();
    let octave_str = if let Some(stripped) = rest.strip_prefix('#') {
        semitones += 1;
        stripped
    } else if let Some(stripped) = rest.strip_prefix('b') {
        semitones -= 1;
        stripped
    } else {
        rest
    };

    let digits = octave_str.strip_prefix('-').unwrap_or(octave_str);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let octave: i32 = octave_str.parse().ok().filter(|o| OCTAVES.contains(o))?;
    Some(semitones + (octave - 4) * 12)
}

pub fn frequency_from_semitones(semitones: i32) -> f64 {
    A4_HZ * 2f64.powf(semitones as f64 / 12.0)
}

pub fn frequency_from_note_name(name: &str) -> Option<f64> {
    semitones_from_a4(name).map(frequency_from_semitones)
}

pub fn frequency_from_midi_number(midi: u8) -> f64 {
    frequency_from_semitones(midi as i32 - A4_MIDI)
}

pub fn midi_number_from_note_name(name: &str) -> Option<i32> {
    semitones_from_a4(name).map(|s| s + A4_MIDI)
}

/// Sharp-spelled note name, octave numbering with middle C = C4.
pub fn note_name_from_midi_number(midi: u8) -> String {
    let octave = midi as i32 / 12 - 1;
    format!("{}{}", SHARP_NAMES[midi as usize % 12], octave)
}

/// Name of the nearest equal-tempered pitch, if it falls inside the MIDI range.
pub fn note_name_from_frequency(freq_hz: f64) -> Option<String> {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return None;
    }

    let midi = (A4_MIDI as f64 + 12.0 * (freq_hz / A4_HZ).log2()).round();
    if (0.0..=127.0).contains(&midi) {
        Some(note_name_from_midi_number(midi as u8))
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rel_eq(a: f64, b: f64) -> bool {
        ((a - b) / b).abs() <= 1e-6
    }

    #[test]
    fn reference_pitches() {
        assert!(rel_eq(frequency_from_note_name("A4").unwrap(), 440.0));
        assert!(rel_eq(frequency_from_note_name("A5").unwrap(), 880.0));
        assert!(rel_eq(frequency_from_note_name("C4").unwrap(), 261.625_565));
        assert!(rel_eq(frequency_from_note_name("F#6").unwrap(), 1479.977_65));
        assert!(rel_eq(frequency_from_note_name("Bb3").unwrap(), 233.081_88));
        assert!(rel_eq(frequency_from_note_name("e2").unwrap(), 82.406_889));
    }

    #[test]
    fn enharmonic_spellings_match() {
        assert_eq!(semitones_from_a4("C#4"), semitones_from_a4("Db4"));
        assert_eq!(semitones_from_a4("G#2"), semitones_from_a4("Ab2"));
        assert_eq!(midi_number_from_note_name("C4"), Some(60));
        assert_eq!(midi_number_from_note_name("C-1"), Some(0));
        assert_eq!(midi_number_from_note_name("G9"), Some(127));
        assert_eq!(midi_number_from_note_name("B9"), Some(131));
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in [
            "", "H4", "C", "C#", "Cx4", "C4.5", "rest", "4C", "C--1", "C10", "A-2",
            "C999999999", "C99999999999",
        ] {
            assert_eq!(semitones_from_a4(name), None, "{name}");
        }
    }

    #[test]
    fn note_names_round_trip_for_every_midi_number() {
        for midi in 0..=127u8 {
            let name = note_name_from_midi_number(midi);
            let freq = frequency_from_note_name(&name).unwrap();
            assert!(
                rel_eq(freq, frequency_from_midi_number(midi)),
                "{midi} -> {name} -> {freq}"
            );
            assert_eq!(note_name_from_frequency(freq), Some(name));
        }
    }

    #[test]
    fn frequency_outside_midi_range_has_no_name() {
        assert_eq!(note_name_from_frequency(0.0), None);
        assert_eq!(note_name_from_frequency(-1.0), None);
        assert_eq!(note_name_from_frequency(30_000.0), None);
        assert_eq!(note_name_from_frequency(441.0).as_deref(), Some("A4"));
    }
}
