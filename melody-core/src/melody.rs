//! # Melody Analysis Module
//!
//! Derives aggregate descriptors from a finished note sequence: duration,
//! pitch range, average pitch, tempo, key, and overall confidence.
//!
//! ## Heuristics
//! - Tempo assumes the mean note length is a quarter note
//! - Key comes from a [`KeyDetector`], by default the pitch-class histogram
//! - Confidence is the plain mean of per-note confidences

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::key::{HistogramKeyDetector, KeyDetector};
use crate::segmenter::quantize_notes;
use crate::MidiNote;

pub const MIN_TEMPO_BPM: f64 = 60.0;
pub const MAX_TEMPO_BPM: f64 = 200.0;
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;
pub const DEFAULT_KEY: &str = "C major";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    /// A key is minor when its name mentions "minor"; everything else is major.
    pub fn from_key(key: &str) -> Self {
        if key.contains("minor") {
            Scale::Minor
        } else {
            Scale::Major
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scale::Major => write!(f, "major"),
            Scale::Minor => write!(f, "minor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PitchRange {
    pub min: u8,
    pub max: u8,
}

/// Aggregate description of a sung melody.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MelodyAnalysis {
    pub notes: Vec<MidiNote>,
    pub tempo_bpm: f64,
    pub key: String,
    pub scale: Scale,
    pub duration_sec: f64,
    pub average_pitch: f64,
    pub pitch_range: PitchRange,
    pub confidence: f64,
}

impl Default for MelodyAnalysis {
    fn default() -> Self {
        Self {
            notes: Vec::new(),
            tempo_bpm: DEFAULT_TEMPO_BPM,
            key: DEFAULT_KEY.to_string(),
            scale: Scale::Major,
            duration_sec: 0.0,
            average_pitch: 0.0,
            pitch_range: PitchRange::default(),
            confidence: 0.0,
        }
    }
}

/// Tempo from the mean note duration, treating it as a quarter note.
///
/// `round(60 / (mean * 4))`, clamped into 60..=200 BPM.
pub fn estimate_tempo(mean_duration_sec: f64) -> f64 {
    let raw = (60.0 / (mean_duration_sec * 4.0)).round();
    if raw.is_nan() {
        return DEFAULT_TEMPO_BPM;
    }
    raw.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM)
}

/// Melody analyzer with a pluggable key detector.
pub struct MelodyAnalyzer<K: KeyDetector = HistogramKeyDetector> {
    key_detector: K,
}

impl MelodyAnalyzer<HistogramKeyDetector> {
    pub fn new() -> Self {
        Self {
            key_detector: HistogramKeyDetector,
        }
    }
}

impl Default for MelodyAnalyzer<HistogramKeyDetector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KeyDetector> MelodyAnalyzer<K> {
    pub fn with_key_detector(key_detector: K) -> Self {
        Self { key_detector }
    }

    /// Analyzes a note sequence. An empty sequence yields
    /// [`MelodyAnalysis::default`].
    pub fn analyze(&self, notes: &[MidiNote]) -> MelodyAnalysis {
        let Some(last) = notes.last() else {
            return MelodyAnalysis::default();
        };

        let count = notes.len() as f64;
        let duration_sec = last.end_time_sec();

        let average_pitch = notes.iter().map(|n| n.midi_note as f64).sum::<f64>() / count;
        let pitch_range = PitchRange {
            min: notes.iter().map(|n| n.midi_note).min().unwrap_or(0),
            max: notes.iter().map(|n| n.midi_note).max().unwrap_or(0),
        };

        let mean_duration = notes.iter().map(|n| n.duration_sec).sum::<f64>() / count;
        let tempo_bpm = estimate_tempo(mean_duration);

        let key = self.key_detector.detect_key(notes);
        let scale = Scale::from_key(&key);
        let confidence = notes.iter().map(|n| n.confidence).sum::<f64>() / count;

        log::debug!(
            "Analyzed {} notes: key={}, tempo={} BPM, range={}..{}",
            notes.len(),
            key,
            tempo_bpm,
            pitch_range.min,
            pitch_range.max
        );

        MelodyAnalysis {
            notes: notes.to_vec(),
            tempo_bpm,
            key,
            scale,
            duration_sec,
            average_pitch,
            pitch_range,
            confidence,
        }
    }

    /// Analyzes notes sung against a known tempo.
    ///
    /// `bpm` (clamped into the usual tempo range) replaces the estimate, and
    /// when `quantize_resolution` is set the notes are first snapped to that
    /// grid at `bpm`. A `bpm` that is not a positive number is ignored and
    /// this behaves like [`MelodyAnalyzer::analyze`].
    pub fn analyze_at_tempo(
        &self,
        notes: &[MidiNote],
        bpm: f64,
        quantize_resolution: Option<u32>,
    ) -> MelodyAnalysis {
        if !(bpm.is_finite() && bpm > 0.0) {
            log::warn!("Ignoring invalid tempo {bpm}");
            return self.analyze(notes);
        }
        let mut analysis = match quantize_resolution {
            Some(resolution) => self.analyze(&quantize_notes(notes, bpm, resolution)),
            None => self.analyze(notes),
        };
        analysis.tempo_bpm = bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM);
        analysis
    }
}

impl fmt::Display for MelodyAnalysis {
    /// Human-readable report, one line per note.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Melody Analysis")?;
        writeln!(f, "===============")?;
        writeln!(f, "Key: {}", self.key)?;
        writeln!(f, "Tempo: {} BPM", self.tempo_bpm)?;
        writeln!(f, "Duration: {:.2}s", self.duration_sec)?;
        writeln!(f, "Notes: {}", self.notes.len())?;
        writeln!(f, "Pitch Range: {} - {}", self.pitch_range.min, self.pitch_range.max)?;
        writeln!(f, "Confidence: {:.0}%", self.confidence * 100.0)?;
        writeln!(f)?;
        writeln!(f, "Notes:")?;
        write!(f, "------")?;
        for (i, note) in self.notes.iter().enumerate() {
            write!(
                f,
                "\n{}. {} ({}) @ {:.2}s for {:.2}s (vel: {})",
                i + 1,
                note.note_name,
                note.midi_note,
                note.start_time_sec,
                note.duration_sec,
                note.velocity
            )?;
        }
        Ok(())
    }
}
