//! # Pitch Detection Module
//!
//! This module implements per-frame fundamental frequency estimation for
//! sung or hummed input using the YIN algorithm.
//!
//! ## Features
//! - YIN difference function with cumulative mean normalization
//! - First-dip search relative to the global minimum to avoid octave errors
//! - Clarity check to reject noise
//! - Parabolic interpolation for sub-sample accuracy
//! - Loudness-based confidence for downstream note segmentation

use crate::config::PitchConfig;
use crate::{AudioFrame, PitchEstimate};

/// Root-mean-square level of a block of samples, zero for an empty block.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Confidence proxy derived from loudness: `min(rms * 10, 1)`.
///
/// This is not a periodicity score. A loud but noisy frame still reports
/// high confidence; the note segmenter relies on exactly this behaviour.
pub fn loudness_confidence(rms: f64) -> f64 {
    if !rms.is_finite() {
        return 0.0;
    }
    (rms * 10.0).clamp(0.0, 1.0)
}

/// Estimates the pitch of one frame.
///
/// Confidence is computed from the frame's loudness independently of
/// whether a frequency was found, so a loud unpitched frame yields
/// `frequency: None` with a non-zero confidence.
///
/// # Arguments
/// * `frame` - Audio frame to analyze
/// * `config` - Detector thresholds
///
/// # Returns
/// * `PitchEstimate` - Frequency (if any) and confidence
pub fn detect_pitch(frame: &AudioFrame, config: &PitchConfig) -> PitchEstimate {
    detect_pitch_samples(frame.samples(), frame.sample_rate(), config)
}

/// Same as [`detect_pitch`] over a borrowed slice, used for sub-frame chunks.
pub fn detect_pitch_samples(samples: &[f32], sample_rate: u32, config: &PitchConfig) -> PitchEstimate {
    if samples.is_empty() || sample_rate == 0 {
        return PitchEstimate::SILENT;
    }
    let level = rms(samples);
    PitchEstimate {
        frequency: detect_pitch_yin(samples, sample_rate, level, config),
        confidence: loudness_confidence(level),
    }
}

/// YIN pitch detection.
///
/// # Arguments
/// * `signal` - Input audio signal
/// * `sample_rate` - Sample rate in Hz
/// * `level` - Precomputed RMS of `signal`, used as a noise gate
/// * `config` - Detector thresholds
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - No pitch detected (silence, noise, or a frame too short to hold a period)
pub fn detect_pitch_yin(
    signal: &[f32],
    sample_rate: u32,
    level: f64,
    config: &PitchConfig,
) -> Option<f64> {
    let half = signal.len() / 2;
    if half < 3 || sample_rate == 0 {
        return None;
    }

    // --- Noise gate ---
    if !(level >= config.amplitude_threshold) {
        return None;
    }

    // --- Step 1 & 2: Difference function ---
    let mut yin_buffer = vec![0.0f64; half];
    for tau in 1..half {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = signal[i] as f64 - signal[i + tau] as f64;
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // --- Step 3: Cumulative mean normalized difference ---
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..half {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f64 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // --- Step 4: First dip close to the global minimum ---
    let min_val = yin_buffer
        .iter()
        .skip(1)
        .cloned()
        .fold(f64::INFINITY, f64::min);
    let threshold = min_val + 0.05;

    let mut period = 0;
    for tau in 2..half {
        if yin_buffer[tau] < threshold && yin_buffer[tau] < yin_buffer[tau - 1] {
            period = tau;
            break;
        }
    }
    if period == 0 {
        return None;
    }
    // Walk down to the bottom of the dip.
    while period + 1 < half && yin_buffer[period + 1] < yin_buffer[period] {
        period += 1;
    }

    // --- Step 5: Clarity check ---
    if yin_buffer[period] > config.clarity_threshold {
        return None;
    }

    // --- Step 6: Parabolic interpolation ---
    if period + 1 >= half {
        return None;
    }
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];

    let curvature = y1 - 2.0 * y2 + y3;
    let period_float = if curvature != 0.0 {
        period as f64 + (y1 - y3) / (2.0 * curvature)
    } else {
        period as f64
    };

    let frequency = sample_rate as f64 / period_float;
    if frequency.is_finite() && frequency > config.min_frequency_hz {
        Some(frequency)
    } else {
        None
    }
}
