//! # Analysis Worker
//!
//! A message-driven boundary that runs frame analysis on dedicated threads
//! so capture and front-end threads never block on signal processing.
//!
//! ## Architecture
//! - **Request channel**: one crossbeam channel shared by every worker thread
//! - **Reply channel**: each request carries its own, so every request
//!   yields exactly one response
//! - **Shutdown channel**: dropped to stop all threads
//! - **Ready**: sent once, by the last thread to start
//!
//! Requests carry no shared state, so the pool processes them in any order
//! and callers may pipeline as many as they like.
//!
//! Requests and responses are serde types. [`serve_json_lines`] exposes the
//! pool to another process as newline-delimited JSON.

use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accuracy::{score_accuracy, AccuracyReport};
use crate::config::{ConfigError, PipelineConfig, PitchConfig};
use crate::fft::analyze_spectrum;
use crate::pitch::detect_pitch;
use crate::{AudioFrame, PitchEstimate, SpectralFeatures};

/// Transport-level failures seen by the caller.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn analysis thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error on request stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Analysis worker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Analysis worker is not running")]
    Disconnected,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Work the boundary accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum AnalysisRequest {
    DetectPitch(AudioFrame),
    AnalyzeSpectrum(AudioFrame),
    #[serde(rename_all = "camelCase")]
    ScorePitchAccuracy {
        frame: AudioFrame,
        target_frequencies: Vec<f64>,
    },
    BatchDetectPitch(Vec<AudioFrame>),
}

impl AnalysisRequest {
    fn kind(&self) -> &'static str {
        match self {
            AnalysisRequest::DetectPitch(_) => "detect-pitch",
            AnalysisRequest::AnalyzeSpectrum(_) => "analyze-spectrum",
            AnalysisRequest::ScorePitchAccuracy { .. } => "score-pitch-accuracy",
            AnalysisRequest::BatchDetectPitch(_) => "batch-detect-pitch",
        }
    }
}

/// One response per request; `Error` replaces the result when processing fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum AnalysisResponse {
    Pitch(PitchEstimate),
    Spectrum(SpectralFeatures),
    Accuracy(AccuracyReport),
    /// Estimates in the same order as the request's frames.
    BatchPitch(Vec<PitchEstimate>),
    Error(String),
}

impl AnalysisResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, AnalysisResponse::Error(_))
    }
}

/// Runs a request on the current thread.
///
/// Frames holding NaN or infinite samples are rejected with an `Error`
/// response instead of producing meaningless numbers.
pub fn process_request(request: AnalysisRequest, config: &PitchConfig) -> AnalysisResponse {
    match request {
        AnalysisRequest::DetectPitch(frame) => {
            if let Err(message) = check_frame(&frame) {
                return AnalysisResponse::Error(message);
            }
            AnalysisResponse::Pitch(detect_pitch(&frame, config))
        }
        AnalysisRequest::AnalyzeSpectrum(frame) => {
            if let Err(message) = check_frame(&frame) {
                return AnalysisResponse::Error(message);
            }
            AnalysisResponse::Spectrum(analyze_spectrum(&frame))
        }
        AnalysisRequest::ScorePitchAccuracy {
            frame,
            target_frequencies,
        } => {
            if let Err(message) = check_frame(&frame) {
                return AnalysisResponse::Error(message);
            }
            AnalysisResponse::Accuracy(score_accuracy(&frame, &target_frequencies, config))
        }
        AnalysisRequest::BatchDetectPitch(frames) => {
            for (i, frame) in frames.iter().enumerate() {
                if let Err(message) = check_frame(frame) {
                    return AnalysisResponse::Error(format!("frame {i}: {message}"));
                }
            }
            AnalysisResponse::BatchPitch(
                frames.iter().map(|frame| detect_pitch(frame, config)).collect(),
            )
        }
    }
}

fn check_frame(frame: &AudioFrame) -> Result<(), String> {
    match frame.samples().iter().position(|s| !s.is_finite()) {
        Some(index) => Err(format!("frame contains non-finite sample at index {index}")),
        None => Ok(()),
    }
}

/// Runs `work`, turning a panic into an `Error` response.
fn run_guarded<F>(work: F) -> AnalysisResponse
where
    F: FnOnce() -> AnalysisResponse,
{
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(response) => response,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "analysis panicked".to_string()
            };
            AnalysisResponse::Error(format!("analysis panicked: {message}"))
        }
    }
}

struct Envelope {
    request: AnalysisRequest,
    reply: Sender<AnalysisResponse>,
}

/// Handle to a submitted request.
#[derive(Debug)]
pub struct PendingResponse {
    reply_rx: Receiver<AnalysisResponse>,
}

impl PendingResponse {
    /// Blocks until the response arrives or `timeout` expires.
    pub fn wait(self, timeout: Duration) -> Result<AnalysisResponse, WorkerError> {
        match self.reply_rx.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(WorkerError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Returns the response if it has already arrived.
    pub fn try_take(&self) -> Result<Option<AnalysisResponse>, WorkerError> {
        match self.reply_rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// The underlying channel, for use in `crossbeam_channel::select!`.
    pub fn receiver(&self) -> &Receiver<AnalysisResponse> {
        &self.reply_rx
    }
}

/// Pool of analysis threads behind a request channel.
#[derive(Debug)]
pub struct AnalysisWorker {
    request_tx: Option<Sender<Envelope>>,
    shutdown_tx: Option<Sender<()>>,
    ready_rx: Receiver<()>,
    ready: AtomicBool,
    thread_handles: Vec<JoinHandle<()>>,
    request_timeout: Duration,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("request", &self.request.kind())
            .finish()
    }
}

impl AnalysisWorker {
    /// Starts `config.worker.threads` analysis threads.
    ///
    /// Returns immediately; use [`AnalysisWorker::wait_ready`] to observe
    /// that every thread is up.
    pub fn spawn(config: &PipelineConfig) -> Result<Self, WorkerError> {
        config.validate()?;
        let thread_count = config.worker.threads;
        let pitch_config = config.pitch;

        let (request_tx, request_rx) = crossbeam_channel::unbounded::<Envelope>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<()>(1);
        let started = Arc::new(AtomicUsize::new(0));

        let mut thread_handles = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let request_rx = request_rx.clone();
            let shutdown_rx = shutdown_rx.clone();
            let ready_tx = ready_tx.clone();
            let started = Arc::clone(&started);

            let handle = thread::Builder::new()
                .name(format!("analysis-worker-{index}"))
                .spawn(move || {
                    if started.fetch_add(1, Ordering::SeqCst) + 1 == thread_count {
                        log::info!("[WORKER] All {} analysis threads started", thread_count);
                        let _ = ready_tx.send(());
                    }
                    drop(ready_tx);
                    worker_loop(index, request_rx, shutdown_rx, pitch_config);
                })
                .map_err(WorkerError::Spawn)?;
            thread_handles.push(handle);
        }

        Ok(Self {
            request_tx: Some(request_tx),
            shutdown_tx: Some(shutdown_tx),
            ready_rx,
            ready: AtomicBool::new(false),
            thread_handles,
            request_timeout: config.worker.request_timeout(),
        })
    }

    /// Waits for the one-time Ready signal. Returns immediately once it
    /// has been observed.
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), WorkerError> {
        if self.ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.ready_rx.recv_timeout(timeout) {
            Ok(()) => {
                self.ready.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(WorkerError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Queues a request without waiting for it to be processed.
    pub fn submit(&self, request: AnalysisRequest) -> Result<PendingResponse, WorkerError> {
        let request_tx = self.request_tx.as_ref().ok_or(WorkerError::Disconnected)?;
        let (reply, reply_rx) = crossbeam_channel::bounded(1);
        request_tx
            .send(Envelope { request, reply })
            .map_err(|_| WorkerError::Disconnected)?;
        Ok(PendingResponse { reply_rx })
    }

    /// Submits a request and waits up to the configured timeout.
    pub fn call(&self, request: AnalysisRequest) -> Result<AnalysisResponse, WorkerError> {
        self.submit(request)?.wait(self.request_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Stops every thread and waits for them to exit. Requests still queued
    /// are dropped and their callers see [`WorkerError::Disconnected`].
    pub fn shutdown(&mut self) {
        if self.shutdown_tx.is_none() {
            return;
        }
        log::info!("[WORKER] Shutting down analysis threads...");
        self.request_tx = None;
        // Dropping the sender disconnects every thread's shutdown receiver.
        self.shutdown_tx = None;
        for handle in self.thread_handles.drain(..) {
            if handle.join().is_err() {
                log::error!("[WORKER] Analysis thread exited with a panic");
            }
        }
        log::info!("[WORKER] Analysis threads stopped");
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serves newline-delimited JSON requests from `reader`, writing exactly one
/// JSON response line per request to `writer`, in request order.
///
/// Blank lines are skipped. A line that does not parse, or a request that
/// times out, is answered with an `Error` response and serving continues.
/// Returns the number of responses written once `reader` is exhausted.
pub fn serve_json_lines<R, W>(
    worker: &AnalysisWorker,
    reader: R,
    mut writer: W,
) -> Result<usize, WorkerError>
where
    R: BufRead,
    W: Write,
{
    let mut answered = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<AnalysisRequest>(&line) {
            Ok(request) => match worker.call(request) {
                Ok(response) => response,
                Err(e @ WorkerError::Timeout(_)) => AnalysisResponse::Error(e.to_string()),
                Err(e) => return Err(e),
            },
            Err(e) => AnalysisResponse::Error(format!("invalid request: {e}")),
        };
        serde_json::to_writer(&mut writer, &response)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        answered += 1;
    }
    log::info!("[WORKER] Request stream closed after {} responses", answered);
    Ok(answered)
}

fn worker_loop(
    index: usize,
    request_rx: Receiver<Envelope>,
    shutdown_rx: Receiver<()>,
    config: PitchConfig,
) {
    log::debug!("[WORKER-{index}] Entering request loop");
    loop {
        crossbeam_channel::select! {
            recv(request_rx) -> msg => match msg {
                Ok(Envelope { request, reply }) => {
                    let kind = request.kind();
                    log::debug!("[WORKER-{index}] Processing {kind} request");
                    let response = run_guarded(|| process_request(request, &config));
                    if let AnalysisResponse::Error(message) = &response {
                        log::warn!("[WORKER-{index}] {kind} request failed: {message}");
                    }
                    if reply.send(response).is_err() {
                        log::debug!("[WORKER-{index}] Caller dropped {kind} request before the reply");
                    }
                }
                Err(_) => {
                    log::debug!("[WORKER-{index}] Request channel closed");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => {
                log::debug!("[WORKER-{index}] Received shutdown signal");
                break;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::tests::sine;

    const WAIT: Duration = Duration::from_secs(10);

    fn worker() -> AnalysisWorker {
        let worker = AnalysisWorker::spawn(&PipelineConfig::default()).unwrap();
        worker.wait_ready(WAIT).unwrap();
        worker
    }

    fn tone(freq: f64) -> AudioFrame {
        AudioFrame::new(sine(freq, 44100, 2048, 0.5), 44100)
    }

    #[test]
    fn ready_is_observed_once_and_cached() {
        let worker = worker();
        assert!(worker.wait_ready(Duration::ZERO).is_ok());
    }

    #[test]
    fn detect_pitch_round_trip() {
        let worker = worker();
        match worker.call(AnalysisRequest::DetectPitch(tone(440.0))).unwrap() {
            AnalysisResponse::Pitch(estimate) => {
                let freq = estimate.frequency.unwrap();
                assert!((freq - 440.0).abs() < 8.8);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn spectrum_and_accuracy_requests() {
        let worker = worker();
        let spectrum = worker.call(AnalysisRequest::AnalyzeSpectrum(tone(440.0))).unwrap();
        assert!(matches!(spectrum, AnalysisResponse::Spectrum(ref f) if f.spectrum.len() == 1024));

        let accuracy = worker
            .call(AnalysisRequest::ScorePitchAccuracy {
                frame: tone(440.0),
                target_frequencies: vec![],
            })
            .unwrap();
        assert_eq!(accuracy, AnalysisResponse::Accuracy(AccuracyReport::EMPTY));
    }

    #[test]
    fn batch_preserves_input_order() {
        let worker = worker();
        let freqs = [220.0, 440.0, 330.0, 880.0, 262.0];
        let frames = freqs.iter().map(|&f| tone(f)).collect();
        match worker.call(AnalysisRequest::BatchDetectPitch(frames)).unwrap() {
            AnalysisResponse::BatchPitch(estimates) => {
                assert_eq!(estimates.len(), freqs.len());
                for (estimate, expected) in estimates.iter().zip(freqs.iter()) {
                    let freq = estimate.frequency.unwrap();
                    assert!((freq - expected).abs() < expected * 0.02, "{freq} vs {expected}");
                }
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn every_pipelined_request_gets_one_response() {
        let worker = worker();
        let pending: Vec<_> = (0..16)
            .map(|i| {
                let freq = 200.0 + 20.0 * i as f64;
                worker.submit(AnalysisRequest::DetectPitch(tone(freq))).unwrap()
            })
            .collect();
        for pending in pending {
            let response = pending.wait(WAIT).unwrap();
            assert!(matches!(response, AnalysisResponse::Pitch(_)));
        }
    }

    #[test]
    fn non_finite_frame_is_an_error_response() {
        let worker = worker();
        let mut samples = sine(440.0, 44100, 2048, 0.5);
        samples[17] = f32::NAN;
        let response = worker
            .call(AnalysisRequest::DetectPitch(AudioFrame::new(samples, 44100)))
            .unwrap();
        match response {
            AnalysisResponse::Error(message) => assert!(message.contains("non-finite")),
            other => panic!("unexpected response {other:?}"),
        }

        // The worker keeps serving after a failed request.
        let response = worker.call(AnalysisRequest::DetectPitch(tone(440.0))).unwrap();
        assert!(!response.is_error());
    }

    #[test]
    fn batch_error_names_the_frame() {
        let bad = AudioFrame::new(vec![0.0, f32::INFINITY, 0.0], 44100);
        let response = process_request(
            AnalysisRequest::BatchDetectPitch(vec![tone(440.0), bad]),
            &PitchConfig::default(),
        );
        assert_eq!(
            response,
            AnalysisResponse::Error("frame 1: frame contains non-finite sample at index 1".into())
        );
    }

    #[test]
    fn panics_become_error_responses() {
        let response = run_guarded(|| panic!("fft exploded"));
        assert_eq!(response, AnalysisResponse::Error("analysis panicked: fft exploded".into()));
    }

    #[test]
    fn pending_response_times_out_and_disconnects() {
        let (reply, reply_rx) = crossbeam_channel::bounded(1);
        let pending = PendingResponse { reply_rx };
        assert!(pending.try_take().unwrap().is_none());
        assert!(matches!(
            pending.wait(Duration::from_millis(10)),
            Err(WorkerError::Timeout(_))
        ));
        drop(reply);

        let (reply, reply_rx) = crossbeam_channel::bounded::<AnalysisResponse>(1);
        drop(reply);
        let pending = PendingResponse { reply_rx };
        assert!(matches!(pending.wait(WAIT), Err(WorkerError::Disconnected)));
    }

    #[test]
    fn submit_after_shutdown_is_disconnected() {
        let mut worker = worker();
        worker.shutdown();
        assert!(matches!(
            worker.submit(AnalysisRequest::DetectPitch(tone(440.0))),
            Err(WorkerError::Disconnected)
        ));
    }

    #[test]
    fn zero_threads_is_rejected() {
        let mut config = PipelineConfig::default();
        config.worker.threads = 0;
        assert!(matches!(
            AnalysisWorker::spawn(&config),
            Err(WorkerError::Config(_))
        ));
    }

    #[test]
    fn json_lines_get_one_response_each_in_order() {
        let worker = worker();
        let detect = serde_json::to_string(&AnalysisRequest::DetectPitch(tone(440.0))).unwrap();
        let batch = serde_json::to_string(&AnalysisRequest::BatchDetectPitch(vec![
            tone(220.0),
            tone(330.0),
        ]))
        .unwrap();
        let input = format!("{detect}\n\nnot json\n{batch}\n");

        let mut output = Vec::new();
        let answered = serve_json_lines(&worker, input.as_bytes(), &mut output).unwrap();
        assert_eq!(answered, 3);

        let responses: Vec<AnalysisResponse> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert!(matches!(responses[0], AnalysisResponse::Pitch(ref e) if e.frequency.is_some()));
        assert!(matches!(responses[1], AnalysisResponse::Error(ref m) if m.starts_with("invalid request")));
        assert!(matches!(responses[2], AnalysisResponse::BatchPitch(ref e) if e.len() == 2));
    }

    #[test]
    fn json_lines_after_shutdown_is_disconnected() {
        let mut worker = worker();
        worker.shutdown();
        let line = serde_json::to_string(&AnalysisRequest::DetectPitch(tone(440.0))).unwrap();
        let mut output = Vec::new();
        let result = serve_json_lines(&worker, line.as_bytes(), &mut output);
        assert!(matches!(result, Err(WorkerError::Disconnected)));
        assert!(output.is_empty());
    }

    #[test]
    fn requests_serialize_with_tagged_variants() {
        let request = AnalysisRequest::ScorePitchAccuracy {
            frame: AudioFrame::new(vec![0.0], 8000),
            target_frequencies: vec![440.0],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "scorePitchAccuracy");
        assert_eq!(json["payload"]["targetFrequencies"][0], 440.0);
        assert_eq!(json["payload"]["frame"]["sampleRate"], 8000);
    }
}
