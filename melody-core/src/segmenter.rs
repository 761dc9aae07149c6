//! # Note Segmentation Module
//!
//! Merges a stream of timestamped pitch samples into discrete note events.
//!
//! The scan is linear with no backtracking: a note is opened on the first
//! confident sample of a new MIDI number, extended while the following
//! confident samples keep that number, and closed when the number changes or
//! the input ends. Output order follows input order; separate runs of the
//! same pitch are never merged.
//!
//! Every note gets the same velocity, [`NOTE_VELOCITY`]. Loudness is not
//! modelled yet.

use crate::config::SegmenterConfig;
use crate::{MidiNote, TimedPitchSample};

/// Velocity assigned to every segmented note.
pub const NOTE_VELOCITY: u8 = 80;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoteSegmenter {
    config: SegmenterConfig,
}

impl NoteSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Segments `samples` (in timestamp order) into notes.
    ///
    /// Samples with confidence below `min_confidence` (or NaN) are skipped
    /// entirely; they neither extend nor end the current note. Notes whose duration is
    /// not strictly greater than `min_note_duration_sec` are discarded.
    pub fn segment(&self, samples: &[TimedPitchSample]) -> Vec<MidiNote> {
        let mut notes = Vec::new();
        let mut current: Option<MidiNote> = None;

        for sample in samples {
            if !(sample.confidence >= self.config.min_confidence) {
                continue;
            }

            match current.as_mut() {
                Some(note) if note.midi_note == sample.midi_note => {
                    note.duration_sec = sample.timestamp_sec - note.start_time_sec;
                    note.confidence = note.confidence.max(sample.confidence);
                }
                _ => {
                    if let Some(finished) = current.take() {
                        self.finish(finished, &mut notes);
                    }
                    current = Some(self.open(sample));
                }
            }
        }

        if let Some(finished) = current {
            self.finish(finished, &mut notes);
        }

        log::debug!("Segmented {} samples into {} notes", samples.len(), notes.len());
        notes
    }

    fn open(&self, sample: &TimedPitchSample) -> MidiNote {
        MidiNote {
            midi_note: sample.midi_note,
            note_name: sample.note_name.clone(),
            start_time_sec: sample.timestamp_sec,
            duration_sec: 0.0,
            velocity: NOTE_VELOCITY,
            frequency_hz: sample.frequency,
            confidence: sample.confidence,
        }
    }

    fn finish(&self, note: MidiNote, notes: &mut Vec<MidiNote>) {
        if note.duration_sec > self.config.min_note_duration_sec {
            notes.push(note);
        }
    }
}

/// Snaps note starts and durations to a rhythmic grid.
///
/// The grid is `(60 / bpm) / (resolution / 4)` seconds, so a resolution of
/// 16 quantizes to sixteenth notes. Every quantized note lasts at least one
/// grid unit. Notes are returned unchanged when `bpm` or `resolution` cannot
/// describe a grid.
pub fn quantize_notes(notes: &[MidiNote], bpm: f64, resolution: u32) -> Vec<MidiNote> {
    if !(bpm.is_finite() && bpm > 0.0) || resolution == 0 {
        return notes.to_vec();
    }
    let beat = 60.0 / bpm;
    let grid = beat / (resolution as f64 / 4.0);

    notes
        .iter()
        .map(|note| MidiNote {
            start_time_sec: (note.start_time_sec / grid).round() * grid,
            duration_sec: ((note.duration_sec / grid).round() * grid).max(grid),
            ..note.clone()
        })
        .collect()
}
