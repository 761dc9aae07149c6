//! # Musical Tuning Module
//!
//! Equal-temperament helpers shared by the pitch tracker, the accuracy
//! scorer, and the melody analyzer.
//!
//! ## Features
//! - Full MIDI note table (0 to 127) with names and frequencies
//! - Frequency to nearest MIDI note conversion
//! - Cent deviation calculations with guards for invalid input
//! - A4 = 440 Hz reference

use once_cell::sync::Lazy;

/// Reference tuning for A4.
pub const A4_FREQUENCY: f64 = 440.0;
/// MIDI number of A4.
pub const A4_MIDI_NOTE: u8 = 69;

/// Pitch class names starting at C, using sharps.
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Represents a single MIDI note with its name and frequency.
#[derive(Debug, Clone)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// Frequency in Hz
    pub frequency: f64,
}

/// Statically computed names and frequencies for all 128 MIDI notes.
///
/// MIDI 60 is C4 (middle C) and MIDI 69 is A4 at 440 Hz.
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    (0..128u8)
        .map(|midi| {
            let frequency =
                A4_FREQUENCY * 2.0_f64.powf((midi as f64 - A4_MIDI_NOTE as f64) / 12.0);
            let octave = (midi as i32 / 12) - 1;
            let name = format!("{}{}", PITCH_CLASS_NAMES[midi as usize % 12], octave);
            Note { name, frequency }
        })
        .collect()
});

/// Nearest-note information for a detected frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteInfo {
    pub midi_note: u8,
    pub name: String,
    /// Offset from the note in whole cents (-50 to +50).
    pub cents: f64,
}

/// Converts a frequency to a fractional MIDI note number.
///
/// Returns `None` for non-positive or non-finite frequencies.
pub fn frequency_to_midi(freq: f64) -> Option<f64> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    Some(12.0 * (freq / A4_FREQUENCY).log2() + A4_MIDI_NOTE as f64)
}

/// Finds the nearest MIDI note to a frequency.
///
/// The MIDI number is clamped into 0..=127 so very low or very high
/// detections still map onto a valid note; `cents` is measured against
/// the unclamped nearest semitone and rounded to whole cents.
///
/// # Arguments
/// * `freq` - Input frequency in Hz
///
/// # Returns
/// * `Some(NoteInfo)` - Nearest note, its name and cents offset
/// * `None` - The frequency is not a usable pitch
pub fn find_nearest_note(freq: f64) -> Option<NoteInfo> {
    let midi_float = frequency_to_midi(freq)?;
    let nearest = midi_float.round();
    let cents = ((midi_float - nearest) * 100.0).round();
    let midi_note = nearest.clamp(0.0, 127.0) as u8;

    Some(NoteInfo {
        midi_note,
        name: midi_to_name(midi_note),
        cents,
    })
}

/// Returns the note name for a MIDI number (e.g., 60 -> "C4").
pub fn midi_to_name(midi_note: u8) -> String {
    NOTES[midi_note.min(127) as usize].name.clone()
}

/// Returns the equal-tempered frequency of a MIDI number.
pub fn midi_to_frequency(midi_note: u8) -> f64 {
    NOTES[midi_note.min(127) as usize].frequency
}

/// Calculates the deviation of `freq` from `target_freq` in cents.
///
/// - 100 cents = 1 semitone
/// - Positive values are sharp, negative values flat
/// - Returns 0 when either frequency is zero, negative, or not finite,
///   so callers never see NaN or infinity.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    if !freq.is_finite() || !target_freq.is_finite() || freq <= 0.0 || target_freq <= 0.0 {
        return 0.0;
    }
    1200.0 * (freq / target_freq).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_c_and_a4_names() {
        assert_eq!(midi_to_name(60), "C4");
        assert_eq!(midi_to_name(69), "A4");
        assert_eq!(midi_to_name(0), "C-1");
        assert_eq!(midi_to_name(127), "G9");
    }

    #[test]
    fn a4_is_440() {
        assert!((midi_to_frequency(69) - 440.0).abs() < 1e-9);
        assert!((midi_to_frequency(60) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn nearest_note_reports_cents() {
        let info = find_nearest_note(445.0).unwrap();
        assert_eq!(info.midi_note, 69);
        assert_eq!(info.name, "A4");
        assert_eq!(info.cents, 20.0);

        let info = find_nearest_note(261.63).unwrap();
        assert_eq!(info.midi_note, 60);
        assert_eq!(info.cents, 0.0);
    }

    #[test]
    fn nearest_note_rejects_invalid_frequencies() {
        assert!(find_nearest_note(0.0).is_none());
        assert!(find_nearest_note(-10.0).is_none());
        assert!(find_nearest_note(f64::NAN).is_none());
    }

    #[test]
    fn cents_deviation_is_guarded() {
        assert!((calculate_cents_deviation(880.0, 440.0) - 1200.0).abs() < 1e-9);
        assert_eq!(calculate_cents_deviation(0.0, 440.0), 0.0);
        assert_eq!(calculate_cents_deviation(440.0, 0.0), 0.0);
        assert_eq!(calculate_cents_deviation(f64::INFINITY, 440.0), 0.0);
    }
}
