//! # Spectral Analysis Module
//!
//! Computes the magnitude spectrum of a frame and the timbre descriptors
//! derived from it (spectral centroid and brightness).
//!
//! The transform is an exact DFT computed with RustFFT. No window or DC
//! removal is applied, so bin values equal a direct DFT of the first
//! `n` samples, where `n` is the frame length rounded down to a power of
//! two and capped at [`MAX_TRANSFORM_SIZE`].

use rustfft::{num_complex::Complex, FftPlanner};

use crate::{AudioFrame, SpectralFeatures};

/// Largest transform length; yields at most 2048 spectrum bins.
pub const MAX_TRANSFORM_SIZE: usize = 4096;

/// Energy above this frequency counts towards brightness.
pub const BRIGHTNESS_CUTOFF_HZ: f64 = 2000.0;

/// Largest power of two not exceeding `len`, capped at [`MAX_TRANSFORM_SIZE`].
/// Returns 0 for an empty frame.
pub fn transform_size(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let pow2 = 1usize << (usize::BITS - 1 - len.leading_zeros());
    pow2.min(MAX_TRANSFORM_SIZE)
}

/// Performs a forward FFT on the first `n` samples and returns the
/// magnitudes of bins `0..n/2`.
///
/// # Arguments
/// * `samples` - Input audio signal; must hold at least `n` samples
/// * `n` - Transform length (a power of two)
pub fn magnitude_spectrum(samples: &[f32], n: usize) -> Vec<f64> {
    if n < 2 || samples.len() < n {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);

    let mut buffer: Vec<Complex<f64>> = samples[..n]
        .iter()
        .map(|&sample| Complex { re: sample as f64, im: 0.0 })
        .collect();

    fft.process(&mut buffer);

    buffer
        .iter()
        .take(n / 2)
        .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
        .collect()
}

/// Computes the magnitude spectrum of a frame with its centroid and brightness.
///
/// Silence, an empty frame, or a zero sample rate all produce a zero
/// centroid and zero brightness rather than NaN.
pub fn analyze_spectrum(frame: &AudioFrame) -> SpectralFeatures {
    let n = transform_size(frame.len());
    if n < 2 || frame.sample_rate() == 0 {
        return SpectralFeatures::default();
    }

    let spectrum = magnitude_spectrum(frame.samples(), n);
    let bin_hz = frame.sample_rate() as f64 / n as f64;

    let mut weighted_sum = 0.0;
    let mut magnitude_sum = 0.0;
    let mut total_energy = 0.0;
    let mut high_energy = 0.0;

    for (k, &magnitude) in spectrum.iter().enumerate() {
        let freq = k as f64 * bin_hz;
        let energy = magnitude * magnitude;
        weighted_sum += freq * magnitude;
        magnitude_sum += magnitude;
        total_energy += energy;
        if freq > BRIGHTNESS_CUTOFF_HZ {
            high_energy += energy;
        }
    }

    let spectral_centroid_hz = if magnitude_sum > 0.0 {
        weighted_sum / magnitude_sum
    } else {
        0.0
    };
    let brightness = if total_energy > 0.0 {
        high_energy / total_energy
    } else {
        0.0
    };

    SpectralFeatures {
        spectrum,
        spectral_centroid_hz,
        brightness,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::tests::sine;

    /// Reference O(n^2) DFT magnitude for comparison.
    fn direct_dft(samples: &[f32], n: usize) -> Vec<f64> {
        (0..n / 2)
            .map(|k| {
                let (mut re, mut im) = (0.0f64, 0.0f64);
                for (i, &s) in samples[..n].iter().enumerate() {
                    let angle = -2.0 * std::f64::consts::PI * k as f64 * i as f64 / n as f64;
                    re += s as f64 * angle.cos();
                    im += s as f64 * angle.sin();
                }
                (re * re + im * im).sqrt()
            })
            .collect()
    }

    #[test]
    fn transform_size_rounds_down_and_caps() {
        assert_eq!(transform_size(0), 0);
        assert_eq!(transform_size(1), 1);
        assert_eq!(transform_size(1000), 512);
        assert_eq!(transform_size(2048), 2048);
        assert_eq!(transform_size(3000), 2048);
        assert_eq!(transform_size(10_000), MAX_TRANSFORM_SIZE);
    }

    #[test]
    fn silence_has_zero_centroid_and_brightness() {
        let features = analyze_spectrum(&AudioFrame::new(vec![0.0; 1024], 44100));
        assert_eq!(features.spectral_centroid_hz, 0.0);
        assert_eq!(features.brightness, 0.0);
        assert_eq!(features.spectrum.len(), 512);
    }

    #[test]
    fn empty_frame_is_default() {
        let features = analyze_spectrum(&AudioFrame::new(vec![], 44100));
        assert_eq!(features, SpectralFeatures::default());
        let features = analyze_spectrum(&AudioFrame::new(vec![0.1; 64], 0));
        assert_eq!(features, SpectralFeatures::default());
    }

    #[test]
    fn matches_direct_dft() {
        let samples = sine(1000.0, 8000, 300, 0.7);
        let n = transform_size(samples.len());
        let fast = magnitude_spectrum(&samples, n);
        let slow = direct_dft(&samples, n);
        assert_eq!(fast.len(), slow.len());
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert!((a - b).abs() < 1e-6, "fft {a} vs dft {b}");
        }
    }

    #[test]
    fn spectrum_is_capped_at_2048_bins() {
        let features = analyze_spectrum(&AudioFrame::new(sine(440.0, 44100, 8192, 0.5), 44100));
        assert_eq!(features.spectrum.len(), 2048);
    }

    #[test]
    fn low_tone_is_dark_and_high_tone_is_bright() {
        let low = analyze_spectrum(&AudioFrame::new(sine(220.0, 44100, 2048, 0.5), 44100));
        let high = analyze_spectrum(&AudioFrame::new(sine(6000.0, 44100, 2048, 0.5), 44100));
        assert!(low.brightness < 0.05, "low brightness {}", low.brightness);
        assert!(high.brightness > 0.95, "high brightness {}", high.brightness);
        assert!(low.spectral_centroid_hz < high.spectral_centroid_hz);
    }

    #[test]
    fn centroid_sits_on_a_bin_aligned_tone() {
        // 1378.125 Hz is exactly bin 64 of a 2048-point transform at 44.1 kHz.
        let freq = 64.0 * 44100.0 / 2048.0;
        let features = analyze_spectrum(&AudioFrame::new(sine(freq, 44100, 2048, 0.5), 44100));
        assert!((features.spectral_centroid_hz - freq).abs() < 1.0);
    }
}
