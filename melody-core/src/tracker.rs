//! Continuous pitch tracking.
//!
//! Drives the frame-level detector over a stream of frames and labels every
//! voiced frame with its nearest note, producing the timestamped samples the
//! note segmenter consumes.

use crate::config::{PitchConfig, TrackerConfig};
use crate::pitch::detect_pitch;
use crate::tuning::find_nearest_note;
use crate::{AudioFrame, PitchEstimate, TimedPitchSample};

#[derive(Debug, Clone, Copy, Default)]
pub struct PitchTracker {
    pitch: PitchConfig,
    tracker: TrackerConfig,
}

impl PitchTracker {
    pub fn new(pitch: PitchConfig, tracker: TrackerConfig) -> Self {
        Self { pitch, tracker }
    }

    /// Seconds between consecutive pitch samples.
    pub fn sample_interval_sec(&self) -> f64 {
        1.0 / self.tracker.rate_hz
    }

    /// Converts an estimate into a sample; frames without a frequency yield `None`.
    pub fn label(&self, estimate: PitchEstimate, timestamp_sec: f64) -> Option<TimedPitchSample> {
        let frequency = estimate.frequency?;
        let note = find_nearest_note(frequency)?;
        Some(TimedPitchSample {
            frequency,
            note_name: note.name,
            midi_note: note.midi_note,
            cents: note.cents,
            confidence: estimate.confidence,
            timestamp_sec,
        })
    }

    /// Detects and labels one frame captured at `timestamp_sec`.
    pub fn sample(&self, frame: &AudioFrame, timestamp_sec: f64) -> Option<TimedPitchSample> {
        self.label(detect_pitch(frame, &self.pitch), timestamp_sec)
    }

    /// Labels frames captured at the tracker rate, the first at `start_sec`.
    pub fn track(&self, frames: &[AudioFrame], start_sec: f64) -> Vec<TimedPitchSample> {
        let interval = self.sample_interval_sec();
        frames
            .iter()
            .enumerate()
            .filter_map(|(i, frame)| self.sample(frame, start_sec + i as f64 * interval))
            .collect()
    }

    /// Slices a recorded signal into frames, one every `sample_rate / rate_hz`
    /// samples. Frames that would run past the end of the signal are not
    /// produced.
    pub fn frames(&self, signal: &[f32], sample_rate: u32) -> Vec<AudioFrame> {
        let frame_size = self.tracker.frame_size;
        let hop = (sample_rate as f64 / self.tracker.rate_hz).round() as usize;
        if frame_size == 0 || hop == 0 || signal.len() < frame_size {
            return Vec::new();
        }
        (0..=(signal.len() - frame_size) / hop)
            .map(|i| {
                let start = i * hop;
                AudioFrame::new(signal[start..start + frame_size].to_vec(), sample_rate)
            })
            .collect()
    }

    /// Tracks a whole recorded signal starting at time zero.
    pub fn track_signal(&self, signal: &[f32], sample_rate: u32) -> Vec<TimedPitchSample> {
        self.track(&self.frames(signal, sample_rate), 0.0)
    }
}
