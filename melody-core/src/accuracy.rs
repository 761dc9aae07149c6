//! Pitch accuracy scoring against a target melody.

use serde::{Deserialize, Serialize};

use crate::config::PitchConfig;
use crate::pitch::detect_pitch_samples;
use crate::tuning::calculate_cents_deviation;
use crate::AudioFrame;

/// Accuracy of a sung frame relative to a sequence of target pitches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyReport {
    /// Mean per-note accuracy, 0 to 100.
    pub accuracy: f64,
    /// Signed deviation per target in cents.
    pub cents_deviation: Vec<f64>,
}

impl AccuracyReport {
    pub const EMPTY: AccuracyReport = AccuracyReport {
        accuracy: 0.0,
        cents_deviation: Vec::new(),
    };
}

/// Accuracy of a single note: 100 at 0 cents, losing a point every 2 cents.
pub fn note_accuracy(cents: f64) -> f64 {
    (100.0 - cents.abs() / 2.0).max(0.0)
}

/// Scores a frame against `target_frequencies`.
///
/// The frame is split into one equal contiguous chunk per target (any
/// trailing remainder is ignored) and each chunk is pitch-detected on its
/// own. A chunk where detection fails records a deviation of 0 cents,
/// which counts as a perfect note.
///
/// # Arguments
/// * `frame` - The sung audio
/// * `target_frequencies` - Expected pitch per chunk, in Hz
/// * `config` - Detector thresholds
///
/// # Returns
/// * `AccuracyReport` - Overall accuracy and per-target cents deviation
pub fn score_accuracy(
    frame: &AudioFrame,
    target_frequencies: &[f64],
    config: &PitchConfig,
) -> AccuracyReport {
    if target_frequencies.is_empty() {
        return AccuracyReport::EMPTY;
    }

    let chunk_len = frame.len() / target_frequencies.len();
    let cents_deviation: Vec<f64> = target_frequencies
        .iter()
        .enumerate()
        .map(|(i, &target)| {
            let chunk = &frame.samples()[i * chunk_len..(i + 1) * chunk_len];
            let detected = detect_pitch_samples(chunk, frame.sample_rate(), config).frequency;
            match detected {
                Some(freq) => calculate_cents_deviation(freq, target),
                None => 0.0,
            }
        })
        .collect();

    let accuracy = cents_deviation.iter().map(|&c| note_accuracy(c)).sum::<f64>()
        / cents_deviation.len() as f64;

    log::debug!(
        "Scored {} targets: accuracy={:.1}",
        target_frequencies.len(),
        accuracy
    );

    AccuracyReport {
        accuracy,
        cents_deviation,
    }
}
