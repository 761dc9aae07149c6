//! # Melody - command-line front end
//!
//! Drives the melody-core pipeline from the microphone or from a synthetic
//! melody and prints the melody descriptor and a generation prompt.
//!
//! ## Architecture
//! - **Capture**: CPAL callback thread slices input into frames
//! - **Analysis**: frames are pipelined to the `AnalysisWorker` pool
//! - **Main thread**: collects estimates, segments notes, analyzes, prints
//!
//! `melody serve` instead exposes the worker pool as newline-delimited JSON
//! on stdin/stdout.

mod cli;

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::io;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use cpal::traits::StreamTrait;
use serde_json::json;

use cli::{Cli, Command, TempoArgs};
use melody_core::audio::CapturedFrame;
use melody_core::config::{self, PipelineConfig, SegmenterConfig};
use melody_core::melody::MelodyAnalyzer;
use melody_core::segmenter::NoteSegmenter;
use melody_core::tracker::PitchTracker;
use melody_core::worker::{serve_json_lines, PendingResponse};
use melody_core::{
    audio, prompt, tuning, vocal, AnalysisRequest, AnalysisResponse, AnalysisWorker,
    MelodyAnalysis, MidiNote, PitchEstimate, StyleSpec, TimedPitchSample,
};

/// Frames buffered between the audio callback and the main thread.
const CAPTURE_QUEUE: usize = 64;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let worker = AnalysisWorker::spawn(&config).context("starting analysis worker")?;
    worker
        .wait_ready(worker.request_timeout())
        .context("analysis worker did not start")?;

    let tracker = PitchTracker::new(config.pitch, config.tracker);

    let (samples, rate_hz, tempo, style) = match cli.command {
        Command::Listen {
            seconds,
            tempo,
            style,
        } => {
            let (samples, rate_hz) = listen(&worker, &tracker, &config, seconds)?;
            (samples, rate_hz, tempo, StyleSpec::from(style))
        }
        Command::Demo {
            midi,
            note_seconds,
            sample_rate,
            tempo,
            style,
        } => {
            let samples = demo(&worker, &tracker, &midi, note_seconds, sample_rate)?;
            (samples, config.tracker.rate_hz, tempo, StyleSpec::from(style))
        }
        Command::Serve => {
            let stdin = io::stdin();
            let answered = serve_json_lines(&worker, stdin.lock(), io::stdout().lock())
                .context("serving analysis requests")?;
            log::info!("Answered {} requests", answered);
            return Ok(());
        }
    };

    log::info!("Collected {} pitch samples", samples.len());

    let notes = NoteSegmenter::new(config.segmenter).segment(&samples);
    let melody = analyze_notes(&notes, tempo, &config.segmenter);
    let generation_prompt = prompt::compose(&melody, &style);
    let vocal_profile = cli.vocal.then(|| vocal::profile(&samples, rate_hz));

    if cli.json {
        let output = json!({
            "melody": melody,
            "prompt": generation_prompt,
            "vocal": vocal_profile,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{melody}");
        println!();
        println!("Prompt: {generation_prompt}");
        if let Some(profile) = vocal_profile {
            println!();
            println!("Average frequency: {:.1} Hz", profile.average_frequency);
            println!("Pitch stability: {:.0}%", profile.pitch_stability * 100.0);
            if let (Some(rate), Some(depth)) = (profile.vibrato_rate_hz, profile.vibrato_depth_cents) {
                println!("Vibrato: {rate:.1} Hz, {depth:.0} cents");
            }
            if let Some(drift) = profile.pitch_drift_cents_per_sec {
                println!("Drift: {drift:+.1} cents/s");
            }
        }
    }

    Ok(())
}

/// Records from the microphone for `seconds`, pipelining every frame to the
/// worker as it arrives.
///
/// Returns the labelled samples and the effective sample rate in Hz.
fn listen(
    worker: &AnalysisWorker,
    tracker: &PitchTracker,
    config: &PipelineConfig,
    seconds: f64,
) -> Result<(Vec<TimedPitchSample>, f64)> {
    let recording = recording_length(seconds)?;
    let frame_size = config.tracker.frame_size;
    let (frame_tx, frame_rx) = crossbeam_channel::bounded::<CapturedFrame>(CAPTURE_QUEUE);
    let (stream, sample_rate) =
        audio::start_audio_capture(frame_tx, frame_size).context("starting microphone capture")?;
    let frame_period = frame_size as f64 / sample_rate as f64;

    let deadline = Instant::now() + recording;
    eprintln!("Recording for {seconds:.1}s... sing now.");

    let mut in_flight: VecDeque<(f64, PendingResponse)> = VecDeque::new();
    let mut estimates: Vec<(f64, PitchEstimate)> = Vec::new();

    while Instant::now() < deadline {
        crossbeam_channel::select! {
            recv(frame_rx) -> msg => match msg {
                Ok(captured) => {
                    let timestamp = captured.start_sec();
                    let pending = worker.submit(AnalysisRequest::DetectPitch(captured.frame))?;
                    in_flight.push_back((timestamp, pending));
                }
                Err(_) => {
                    log::warn!("Capture channel closed early");
                    break;
                }
            },
            default(Duration::from_millis(20)) => {},
        }
        // Collect whatever has finished, oldest first, without blocking.
        while let Some((timestamp, pending)) = in_flight.pop_front() {
            match pending.try_take()? {
                Some(response) => collect(timestamp, response, &mut estimates),
                None => {
                    in_flight.push_front((timestamp, pending));
                    break;
                }
            }
        }
    }

    if let Err(e) = stream.pause() {
        log::warn!("Error pausing stream: {}", e);
    }
    drop(stream);

    for (timestamp, pending) in in_flight {
        match pending.wait(worker.request_timeout()) {
            Ok(response) => collect(timestamp, response, &mut estimates),
            Err(e) => log::warn!("Skipping frame at {timestamp:.2}s: {e}"),
        }
    }

    let samples = estimates
        .into_iter()
        .filter_map(|(timestamp, estimate)| tracker.label(estimate, timestamp))
        .collect();
    Ok((samples, 1.0 / frame_period))
}

/// Validates `--seconds` as a positive, representable duration.
fn recording_length(seconds: f64) -> Result<Duration> {
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("recording length must be positive, got {seconds}");
    }
    match Duration::try_from_secs_f64(seconds) {
        Ok(recording) => Ok(recording),
        Err(e) => bail!("recording length {seconds}s is out of range: {e}"),
    }
}

/// Turns segmented notes into the melody descriptor, honouring a fixed tempo
/// and quantization when one was requested.
///
/// Quantization needs a tempo; without `--bpm` it is skipped and the tempo
/// is estimated from the notes.
fn analyze_notes(notes: &[MidiNote], tempo: TempoArgs, segmenter: &SegmenterConfig) -> MelodyAnalysis {
    let analyzer = MelodyAnalyzer::new();
    let resolution = tempo.quantize.or(segmenter.quantize_resolution);
    match tempo.bpm {
        Some(bpm) => analyzer.analyze_at_tempo(notes, bpm, resolution),
        None => {
            if resolution.is_some() {
                log::warn!("Quantization needs a tempo (--bpm); leaving note timing as sung");
            }
            analyzer.analyze(notes)
        }
    }
}

fn collect(timestamp: f64, response: AnalysisResponse, estimates: &mut Vec<(f64, PitchEstimate)>) {
    match response {
        AnalysisResponse::Pitch(estimate) => estimates.push((timestamp, estimate)),
        AnalysisResponse::Error(message) => {
            log::warn!("Analysis failed for frame at {timestamp:.2}s: {message}")
        }
        other => log::warn!("Unexpected response for frame at {timestamp:.2}s: {other:?}"),
    }
}

/// Synthesizes the given notes as sine tones and runs them through the
/// worker as one batch.
fn demo(
    worker: &AnalysisWorker,
    tracker: &PitchTracker,
    midi: &[u8],
    note_seconds: f64,
    sample_rate: u32,
) -> Result<Vec<TimedPitchSample>> {
    if !(note_seconds.is_finite() && note_seconds > 0.0) || sample_rate == 0 {
        bail!("note length and sample rate must be positive");
    }
    let note_len = (note_seconds * sample_rate as f64) as usize;
    let signal: Vec<f32> = midi
        .iter()
        .flat_map(|&note| {
            let freq = tuning::midi_to_frequency(note);
            (0..note_len).map(move |i| {
                (0.5 * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin()) as f32
            })
        })
        .collect();

    let frames = tracker.frames(&signal, sample_rate);
    log::info!("Synthesized {} notes into {} frames", midi.len(), frames.len());

    let response = worker
        .submit(AnalysisRequest::BatchDetectPitch(frames))?
        .wait(worker.request_timeout())
        .context("waiting for batch pitch detection")?;

    let estimates = match response {
        AnalysisResponse::BatchPitch(estimates) => estimates,
        AnalysisResponse::Error(message) => bail!("pitch detection failed: {message}"),
        other => bail!("unexpected worker response: {other:?}"),
    };

    let interval = tracker.sample_interval_sec();
    Ok(estimates
        .into_iter()
        .enumerate()
        .filter_map(|(i, estimate)| tracker.label(estimate, i as f64 * interval))
        .collect())
}
