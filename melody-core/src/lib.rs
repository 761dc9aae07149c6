// melody-core/src/lib.rs

//! The core logic for vocal melody analysis.
//! This crate turns raw microphone audio into a symbolic melody: pitched
//! notes, tempo, key, and pitch-accuracy scores. It is completely headless
//! and contains no UI code; front ends drive it through the
//! [`worker::AnalysisWorker`] boundary and the pure functions below.

pub mod accuracy;
pub mod audio;
pub mod config;
pub mod fft;
pub mod key;
pub mod melody;
pub mod pitch;
pub mod prompt;
pub mod segmenter;
pub mod tracker;
pub mod tuning;
pub mod vocal;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use accuracy::AccuracyReport;
pub use config::PipelineConfig;
pub use melody::{MelodyAnalysis, PitchRange, Scale};
pub use prompt::StyleSpec;
pub use worker::{AnalysisRequest, AnalysisResponse, AnalysisWorker, WorkerError};

/// A window of mono audio samples captured at a known sample rate.
///
/// Frames are immutable once built. Handing one to the worker moves it,
/// so the samples are never shared mutably across threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Result of running the pitch detector over one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchEstimate {
    /// The detected fundamental in Hz, `None` when no periodic signal was found.
    pub frequency: Option<f64>,
    /// Loudness-derived confidence (0.0 to 1.0).
    pub confidence: f64,
}

impl PitchEstimate {
    pub const SILENT: PitchEstimate = PitchEstimate {
        frequency: None,
        confidence: 0.0,
    };
}

/// Spectral description of a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectralFeatures {
    /// Bin magnitudes from DC up to (but excluding) Nyquist.
    pub spectrum: Vec<f64>,
    pub spectral_centroid_hz: f64,
    /// Share of spectral energy above 2 kHz (0.0 to 1.0).
    pub brightness: f64,
}

impl Default for SpectralFeatures {
    fn default() -> Self {
        Self {
            spectrum: Vec::new(),
            spectral_centroid_hz: 0.0,
            brightness: 0.0,
        }
    }
}

/// One timestamped observation from a pitch tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedPitchSample {
    pub frequency: f64,
    pub note_name: String,
    pub midi_note: u8,
    /// Offset from the nearest equal-tempered note.
    pub cents: f64,
    pub confidence: f64,
    pub timestamp_sec: f64,
}

impl TimedPitchSample {
    /// Whether the sample sits within `tolerance_cents` of its note.
    pub fn is_in_tune(&self, tolerance_cents: f64) -> bool {
        self.cents.abs() <= tolerance_cents
    }
}

/// A discrete note event produced by the segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiNote {
    pub midi_note: u8,
    pub note_name: String,
    pub start_time_sec: f64,
    pub duration_sec: f64,
    pub velocity: u8,
    pub frequency_hz: f64,
    pub confidence: f64,
}

impl MidiNote {
    pub fn end_time_sec(&self) -> f64 {
        self.start_time_sec + self.duration_sec
    }
}
