use std::f64::consts::PI;
use std::time::Duration;

use melody_core::config::parse_config;
use melody_core::melody::MelodyAnalyzer;
use melody_core::segmenter::NoteSegmenter;
use melody_core::tracker::PitchTracker;
use melody_core::{
    prompt, AnalysisRequest, AnalysisResponse, AnalysisWorker, PipelineConfig, PitchRange, Scale,
    StyleSpec,
};

const SAMPLE_RATE: u32 = 44100;

/// One second of each tone, back to back.
fn synth_melody(freqs: &[f64]) -> Vec<f32> {
    freqs
        .iter()
        .flat_map(|&freq| {
            (0..SAMPLE_RATE as usize).map(move |i| {
                (0.5 * (2.0 * PI * freq * i as f64 / SAMPLE_RATE as f64).sin()) as f32
            })
        })
        .collect()
}

#[test]
fn sung_triad_becomes_c_major_melody() {
    let config = PipelineConfig::default();
    let signal = synth_melody(&[261.63, 329.63, 392.0]);

    let tracker = PitchTracker::new(config.pitch, config.tracker);
    let samples = tracker.track_signal(&signal, SAMPLE_RATE);
    let notes = NoteSegmenter::new(config.segmenter).segment(&samples);

    let midis: Vec<u8> = notes.iter().map(|n| n.midi_note).collect();
    assert_eq!(midis, vec![60, 64, 67]);
    for note in &notes {
        assert!(note.duration_sec > 0.8 && note.duration_sec <= 1.0, "{note:?}");
        assert_eq!(note.velocity, 80);
    }

    let analysis = MelodyAnalyzer::new().analyze(&notes);
    assert_eq!(analysis.key, "C major");
    assert_eq!(analysis.scale, Scale::Major);
    assert_eq!(analysis.pitch_range, PitchRange { min: 60, max: 67 });
    assert!(analysis.confidence > 0.5);
    // ~0.95 s notes estimate 16 BPM, clamped up.
    assert_eq!(analysis.tempo_bpm, 60.0);

    let style = StyleSpec {
        genre: "pop".into(),
        mood: "bright".into(),
        instruments: vec!["piano".into()],
        arrangement: None,
    };
    assert_eq!(
        prompt::compose(&analysis, &style),
        "bright pop instrumental, featuring piano, in C major, 60 BPM"
    );
}

#[test]
fn worker_batch_feeds_the_segmenter() {
    let config = PipelineConfig::default();
    let signal = synth_melody(&[261.63, 329.63, 392.0]);
    let tracker = PitchTracker::new(config.pitch, config.tracker);
    let frames = tracker.frames(&signal, SAMPLE_RATE);
    let frame_count = frames.len();

    let worker = AnalysisWorker::spawn(&config).unwrap();
    worker.wait_ready(Duration::from_secs(10)).unwrap();

    let pending = worker.submit(AnalysisRequest::BatchDetectPitch(frames)).unwrap();
    let estimates = match pending.wait(Duration::from_secs(30)).unwrap() {
        AnalysisResponse::BatchPitch(estimates) => estimates,
        other => panic!("unexpected response {other:?}"),
    };
    assert_eq!(estimates.len(), frame_count);

    let interval = tracker.sample_interval_sec();
    let samples: Vec<_> = estimates
        .into_iter()
        .enumerate()
        .filter_map(|(i, estimate)| tracker.label(estimate, i as f64 * interval))
        .collect();
    let notes = NoteSegmenter::new(config.segmenter).segment(&samples);
    let analysis = MelodyAnalyzer::new().analyze(&notes);

    assert_eq!(analysis.notes.len(), 3);
    assert_eq!(analysis.key, "C major");
    assert_eq!(analysis.pitch_range, PitchRange { min: 60, max: 67 });
}

#[test]
fn silence_produces_the_default_melody() {
    let config = PipelineConfig::default();
    let tracker = PitchTracker::new(config.pitch, config.tracker);
    let samples = tracker.track_signal(&vec![0.0; SAMPLE_RATE as usize * 2], SAMPLE_RATE);
    assert!(samples.is_empty());

    let notes = NoteSegmenter::new(config.segmenter).segment(&samples);
    let analysis = MelodyAnalyzer::new().analyze(&notes);
    assert_eq!(analysis, melody_core::MelodyAnalysis::default());
}

#[test]
fn configured_quantization_snaps_sung_notes_to_the_beat() {
    let config = parse_config("[segmenter]\nquantize_resolution = 4\n").unwrap();
    let signal = synth_melody(&[261.63, 329.63, 392.0]);
    let tracker = PitchTracker::new(config.pitch, config.tracker);
    let notes = NoteSegmenter::new(config.segmenter).segment(&tracker.track_signal(&signal, SAMPLE_RATE));

    // Sung at 60 BPM, each ~0.95 s note snaps to a whole beat.
    let analysis = MelodyAnalyzer::new().analyze_at_tempo(
        &notes,
        60.0,
        config.segmenter.quantize_resolution,
    );
    assert_eq!(analysis.tempo_bpm, 60.0);
    let starts: Vec<f64> = analysis.notes.iter().map(|n| n.start_time_sec).collect();
    assert_eq!(starts, vec![0.0, 1.0, 2.0]);
    assert!(analysis.notes.iter().all(|n| n.duration_sec == 1.0));
    assert_eq!(analysis.duration_sec, 3.0);
}
