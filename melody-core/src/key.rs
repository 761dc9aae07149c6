//! Key detection over a finished note sequence.
//!
//! [`HistogramKeyDetector`] is the default used by the melody analyzer. It
//! picks the most frequent pitch class as the tonic and decides major or
//! minor by comparing the counts of the two candidate thirds.
//! [`KrumhanslKeyDetector`] correlates against probe-tone profiles instead.

use crate::tuning::PITCH_CLASS_NAMES;
use crate::MidiNote;

/// Estimates a key name such as "C major" or "A minor".
pub trait KeyDetector {
    fn detect_key(&self, notes: &[MidiNote]) -> String;
}

/// Counts how many notes fall on each pitch class (C = 0).
pub fn pitch_class_histogram(notes: &[MidiNote]) -> [u32; 12] {
    let mut histogram = [0u32; 12];
    for note in notes {
        histogram[(note.midi_note % 12) as usize] += 1;
    }
    histogram
}

fn key_name(tonic: usize, minor: bool) -> String {
    let mode = if minor { "minor" } else { "major" };
    format!("{} {}", PITCH_CLASS_NAMES[tonic % 12], mode)
}

/// Most-frequent pitch class plus a major/minor third comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramKeyDetector;

impl KeyDetector for HistogramKeyDetector {
    /// Ties between tonic candidates go to the lowest pitch class. The key is
    /// minor only when the minor third occurs strictly more often than the
    /// major third.
    fn detect_key(&self, notes: &[MidiNote]) -> String {
        let histogram = pitch_class_histogram(notes);

        let mut tonic = 0;
        for (pitch_class, &count) in histogram.iter().enumerate() {
            if count > histogram[tonic] {
                tonic = pitch_class;
            }
        }

        let major_third = histogram[(tonic + 4) % 12];
        let minor_third = histogram[(tonic + 3) % 12];
        key_name(tonic, minor_third > major_third)
    }
}

/// Krumhansl-Kessler probe-tone profiles, tonic first.
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Krumhansl-Schmuckler key finding.
///
/// Builds a duration-weighted pitch-class distribution and correlates it
/// with the 24 rotated major and minor profiles. Returns "C major" when
/// there is nothing to correlate.
#[derive(Debug, Clone, Copy, Default)]
pub struct KrumhanslKeyDetector;

impl KrumhanslKeyDetector {
    fn distribution(notes: &[MidiNote]) -> [f64; 12] {
        let mut weights = [0.0f64; 12];
        for note in notes {
            weights[(note.midi_note % 12) as usize] += note.duration_sec.max(0.0);
        }
        weights
    }
}

fn correlation(xs: &[f64; 12], ys: &[f64; 12]) -> Option<f64> {
    let mean_x = xs.iter().sum::<f64>() / 12.0;
    let mean_y = ys.iter().sum::<f64>() / 12.0;
    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        covariance += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    let denominator = (var_x * var_y).sqrt();
    if denominator > 0.0 {
        Some(covariance / denominator)
    } else {
        None
    }
}

impl KeyDetector for KrumhanslKeyDetector {
    fn detect_key(&self, notes: &[MidiNote]) -> String {
        let weights = Self::distribution(notes);

        let mut best: Option<(f64, usize, bool)> = None;
        for tonic in 0..12 {
            // Rotate so index 0 of the rotated distribution is the candidate tonic.
            let mut rotated = [0.0f64; 12];
            for (i, slot) in rotated.iter_mut().enumerate() {
                *slot = weights[(tonic + i) % 12];
            }
            for (profile, minor) in [(&MAJOR_PROFILE, false), (&MINOR_PROFILE, true)] {
                if let Some(r) = correlation(&rotated, profile) {
                    if best.is_none_or(|(score, _, _)| r > score) {
                        best = Some((r, tonic, minor));
                    }
                }
            }
        }

        match best {
            Some((_, tonic, minor)) => key_name(tonic, minor),
            None => key_name(0, false),
        }
    }
}
