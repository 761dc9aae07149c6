//! Vocal characteristics from a pitch history.
//!
//! Summarises how steadily a singer held pitch: average frequency,
//! stability, vibrato, drift, and a rough dynamic range. Useful for
//! feedback alongside the melody itself.

use linreg::linear_regression;
use serde::{Deserialize, Serialize};

use crate::tuning::calculate_cents_deviation;
use crate::TimedPitchSample;

/// Fewer samples than this are not enough to look for vibrato.
pub const MIN_VIBRATO_SAMPLES: usize = 50;
/// Lags (in samples) searched for periodic pitch variation.
const VIBRATO_LAGS: std::ops::Range<usize> = 5..30;
const VIBRATO_CORRELATION_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocalCharacteristics {
    pub average_frequency: f64,
    /// 1.0 for a perfectly steady pitch, falling towards 0 as it wanders.
    pub pitch_stability: f64,
    pub vibrato_rate_hz: Option<f64>,
    pub vibrato_depth_cents: Option<f64>,
    /// Linear pitch trend over the take; positive means going sharp.
    pub pitch_drift_cents_per_sec: Option<f64>,
    /// Rough level spread in dB, from the confidence (loudness) range.
    pub dynamic_range: f64,
}

impl Default for VocalCharacteristics {
    fn default() -> Self {
        Self {
            average_frequency: 0.0,
            pitch_stability: 0.0,
            vibrato_rate_hz: None,
            vibrato_depth_cents: None,
            pitch_drift_cents_per_sec: None,
            dynamic_range: 0.0,
        }
    }
}

/// Profiles a pitch history sampled at `rate_hz` samples per second.
pub fn profile(samples: &[TimedPitchSample], rate_hz: f64) -> VocalCharacteristics {
    let frequencies: Vec<f64> = samples
        .iter()
        .map(|s| s.frequency)
        .filter(|&f| f > 0.0 && f.is_finite())
        .collect();
    if frequencies.is_empty() {
        return VocalCharacteristics::default();
    }

    let count = frequencies.len() as f64;
    let average_frequency = frequencies.iter().sum::<f64>() / count;
    let variance = frequencies
        .iter()
        .map(|f| (f - average_frequency).powi(2))
        .sum::<f64>()
        / count;
    let pitch_stability = (1.0 - variance.sqrt() / average_frequency).max(0.0);

    let (vibrato_rate_hz, vibrato_depth_cents) =
        match detect_vibrato(&frequencies, average_frequency, rate_hz) {
            Some((rate, depth)) => (Some(rate), Some(depth)),
            None => (None, None),
        };

    let (min_conf, max_conf) = samples
        .iter()
        .map(|s| s.confidence)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c), hi.max(c)));

    VocalCharacteristics {
        average_frequency,
        pitch_stability,
        vibrato_rate_hz,
        vibrato_depth_cents,
        pitch_drift_cents_per_sec: pitch_drift(samples, average_frequency),
        dynamic_range: (max_conf - min_conf) * 20.0,
    }
}

/// Finds the strongest autocorrelation lag of the frequency deviations.
///
/// # Returns
/// * `Some((rate_hz, depth_cents))` - A periodic wobble was found
/// * `None` - Too few samples or no periodic component
fn detect_vibrato(frequencies: &[f64], average: f64, rate_hz: f64) -> Option<(f64, f64)> {
    if frequencies.len() < MIN_VIBRATO_SAMPLES || rate_hz <= 0.0 {
        return None;
    }
    let deviations: Vec<f64> = frequencies.iter().map(|f| f - average).collect();

    let mut best_lag = 0;
    let mut best_correlation = 0.0;
    for lag in VIBRATO_LAGS {
        let correlation: f64 = deviations
            .iter()
            .zip(deviations.iter().skip(lag))
            .map(|(a, b)| a * b)
            .sum();
        if correlation > best_correlation {
            best_correlation = correlation;
            best_lag = lag;
        }
    }

    if best_lag == 0 || best_correlation <= VIBRATO_CORRELATION_THRESHOLD {
        return None;
    }
    let max_deviation = deviations.iter().fold(0.0f64, |m, d| m.max(d.abs()));
    let depth = 1200.0 * (1.0 + max_deviation / average).log2() / 2.0;
    Some((rate_hz / best_lag as f64, depth))
}

/// Slope of cents (relative to the average) against time.
fn pitch_drift(samples: &[TimedPitchSample], average: f64) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = samples
        .iter()
        .filter(|s| s.frequency > 0.0 && s.frequency.is_finite())
        .map(|s| (s.timestamp_sec, calculate_cents_deviation(s.frequency, average)))
        .unzip();
    if xs.len() < 2 {
        return None;
    }
    linear_regression::<_, _, f64>(&xs, &ys)
        .ok()
        .map(|(slope, _intercept)| slope)
        .filter(|slope: &f64| slope.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn history(freqs: impl Iterator<Item = f64>, rate_hz: f64) -> Vec<TimedPitchSample> {
        freqs
            .enumerate()
            .map(|(i, f)| TimedPitchSample {
                frequency: f,
                note_name: "A4".into(),
                midi_note: 69,
                cents: 0.0,
                confidence: if i % 2 == 0 { 0.9 } else { 0.6 },
                timestamp_sec: i as f64 / rate_hz,
            })
            .collect()
    }

    #[test]
    fn empty_history_is_default() {
        assert_eq!(profile(&[], 20.0), VocalCharacteristics::default());
    }

    #[test]
    fn steady_tone_is_stable_without_vibrato() {
        let samples = history(std::iter::repeat(440.0).take(60), 20.0);
        let profile = profile(&samples, 20.0);
        assert_eq!(profile.average_frequency, 440.0);
        assert_eq!(profile.pitch_stability, 1.0);
        assert_eq!(profile.vibrato_rate_hz, None);
        assert!(profile.pitch_drift_cents_per_sec.unwrap().abs() < 1e-9);
        assert!((profile.dynamic_range - 6.0).abs() < 1e-9);
    }

    #[test]
    fn two_hertz_vibrato_is_detected() {
        let freqs = (0..100).map(|i| 440.0 + 5.0 * (2.0 * PI * 2.0 * i as f64 / 20.0).sin());
        let profile = profile(&history(freqs, 20.0), 20.0);
        assert_eq!(profile.vibrato_rate_hz, Some(2.0));
        let depth = profile.vibrato_depth_cents.unwrap();
        assert!(depth > 5.0 && depth < 20.0, "depth {depth}");
        assert!(profile.pitch_stability > 0.99);
    }

    #[test]
    fn short_history_skips_vibrato() {
        let freqs = (0..20).map(|i| 440.0 + 5.0 * (2.0 * PI * 2.0 * i as f64 / 20.0).sin());
        let profile = profile(&history(freqs, 20.0), 20.0);
        assert_eq!(profile.vibrato_rate_hz, None);
        assert_eq!(profile.vibrato_depth_cents, None);
    }

    #[test]
    fn rising_pitch_has_positive_drift() {
        // One cent per sample at 20 samples per second is ~20 cents/s.
        let freqs = (0..40).map(|i| 440.0 * 2f64.powf(i as f64 / 1200.0));
        let profile = profile(&history(freqs, 20.0), 20.0);
        let drift = profile.pitch_drift_cents_per_sec.unwrap();
        assert!((drift - 20.0).abs() < 0.5, "drift {drift}");
    }
}
