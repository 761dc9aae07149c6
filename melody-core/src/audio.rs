//! # Audio Capture Module
//!
//! This module handles real-time microphone capture using CPAL
//! (Cross-Platform Audio Library) and slices the incoming stream into
//! fixed-size [`AudioFrame`]s for the analysis pipeline.
//!
//! ## Features
//! - Automatic input device selection
//! - Prefers mono 32-bit float near 44.1 kHz, downmixes multi-channel input
//! - Non-blocking hand-off: frames are dropped rather than stalling the
//!   audio callback when the consumer falls behind
//! - Every frame carries its sample offset in the stream, so timestamps stay
//!   correct across dropped frames

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Sender, TrySendError};

use crate::AudioFrame;

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// A frame together with where it starts in the capture stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// Mono sample index of the frame's first sample since capture started.
    pub start_sample: u64,
    pub frame: AudioFrame,
}

impl CapturedFrame {
    /// Capture time of the frame's first sample, zero when the rate is unknown.
    pub fn start_sec(&self) -> f64 {
        match self.frame.sample_rate() {
            0 => 0.0,
            rate => self.start_sample as f64 / rate as f64,
        }
    }
}

/// Collects interleaved callback data into mono frames of a fixed size.
#[derive(Debug)]
pub struct FrameAccumulator {
    frame_size: usize,
    channels: usize,
    sample_rate: u32,
    buffer: Vec<f32>,
    next_start: u64,
}

impl FrameAccumulator {
    pub fn new(frame_size: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            frame_size: frame_size.max(1),
            channels: channels.max(1),
            sample_rate,
            buffer: Vec::with_capacity(frame_size * 2),
            next_start: 0,
        }
    }

    /// Appends interleaved samples and returns every frame completed by them.
    ///
    /// Multi-channel input is averaged to mono. A trailing partial group of
    /// channels is ignored. Start offsets advance for every frame produced,
    /// whether or not the caller manages to deliver it.
    pub fn push(&mut self, data: &[f32]) -> Vec<CapturedFrame> {
        if self.channels == 1 {
            self.buffer.extend_from_slice(data);
        } else {
            self.buffer.extend(
                data.chunks_exact(self.channels)
                    .map(|group| group.iter().sum::<f32>() / self.channels as f32),
            );
        }

        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_size {
            let samples: Vec<f32> = self.buffer.drain(..self.frame_size).collect();
            frames.push(CapturedFrame {
                start_sample: self.next_start,
                frame: AudioFrame::new(samples, self.sample_rate),
            });
            self.next_start += self.frame_size as u64;
        }
        frames
    }

    /// Samples waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Hands frames to the consumer without blocking.
///
/// Returns how many frames were dropped because the channel was full.
fn forward_frames(frames: Vec<CapturedFrame>, sender: &Sender<CapturedFrame>) -> usize {
    let mut dropped = 0;
    for frame in frames {
        match sender.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => dropped += 1,
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
    dropped
}

/// Starts audio capture from the default input device.
///
/// # Arguments
/// * `sender` - Channel that receives each completed frame with its offset
/// * `frame_size` - Samples per frame
///
/// # Returns
/// * `Ok((stream, sample_rate))` - The running stream (keep it alive) and its rate
/// * `Err(e)` - No device, no f32 input format, or the stream failed to start
pub fn start_audio_capture(
    sender: Sender<CapturedFrame>,
    frame_size: usize,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = TARGET_SAMPLE_RATE.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    log::info!("Selected sample rate: {} Hz, {} channel(s)", sample_rate, channels);

    let err_fn = |err| log::error!("An error occurred on the audio stream: {}", err);

    let mut accumulator = FrameAccumulator::new(frame_size, channels, sample_rate);
    let mut total_dropped = 0usize;

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let dropped = forward_frames(accumulator.push(data), &sender);
            if dropped > 0 {
                total_dropped += dropped;
                log::warn!(
                    "Analysis is behind, dropped {} frame(s) ({} total)",
                    dropped,
                    total_dropped
                );
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Picks the f32 input configuration closest to the target rate, preferring mono.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let in_range =
                c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
            let rate_diff = if in_range {
                0
            } else {
                let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
                let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
                min_diff.min(max_diff)
            };
            (rate_diff, c.channels() != 1, c.channels())
        })
}
