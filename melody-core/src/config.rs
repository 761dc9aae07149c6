//! Pipeline configuration.
//!
//! Every section can be omitted from the TOML file; missing fields fall back
//! to the defaults the analysis stages were tuned with.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pitch: PitchConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Pitch detector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchConfig {
    /// Frames quieter than this RMS level are treated as silence.
    #[serde(default = "default_amplitude_threshold")]
    pub amplitude_threshold: f64,
    /// Largest normalized difference value accepted as a periodic dip.
    #[serde(default = "default_clarity_threshold")]
    pub clarity_threshold: f64,
    #[serde(default = "default_min_frequency_hz")]
    pub min_frequency_hz: f64,
}

/// How a continuous signal is sliced into frames for tracking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// Pitch samples produced per second.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Notes must last strictly longer than this to be kept.
    #[serde(default = "default_min_note_duration_sec")]
    pub min_note_duration_sec: f64,
    /// Snap notes to this rhythmic grid (16 = sixteenths) when a fixed
    /// tempo is supplied. Unset leaves note timing as sung.
    #[serde(default)]
    pub quantize_resolution: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: default_amplitude_threshold(),
            clarity_threshold: default_clarity_threshold(),
            min_frequency_hz: default_min_frequency_hz(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            frame_size: default_frame_size(),
            rate_hz: default_rate_hz(),
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            min_note_duration_sec: default_min_note_duration_sec(),
            quantize_resolution: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_amplitude_threshold() -> f64 { 0.01 }
fn default_clarity_threshold() -> f64 { 0.1 }
fn default_min_frequency_hz() -> f64 { 20.0 }
fn default_frame_size() -> usize { 2048 }
fn default_rate_hz() -> f64 { 20.0 }
fn default_min_confidence() -> f64 { 0.5 }
fn default_min_note_duration_sec() -> f64 { 0.1 }
fn default_threads() -> usize { 2 }
fn default_request_timeout_ms() -> u64 { 3000 }

impl PipelineConfig {
    /// Rejects settings that would make a stage divide by zero or never run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.threads == 0 {
            return Err(ConfigError::Invalid("worker.threads must be at least 1".into()));
        }
        if self.tracker.frame_size == 0 {
            return Err(ConfigError::Invalid("tracker.frame_size must be at least 1".into()));
        }
        if !(self.tracker.rate_hz.is_finite() && self.tracker.rate_hz > 0.0) {
            return Err(ConfigError::Invalid("tracker.rate_hz must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.segmenter.min_confidence) {
            return Err(ConfigError::Invalid(
                "segmenter.min_confidence must be within 0..=1".into(),
            ));
        }
        if self.segmenter.quantize_resolution == Some(0) {
            return Err(ConfigError::Invalid(
                "segmenter.quantize_resolution must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Parses a TOML document into a validated config.
pub fn parse_config(content: &str) -> Result<PipelineConfig, ConfigError> {
    let config: PipelineConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Loads and validates a TOML config file.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    log::info!("Loaded pipeline config from {}", path.display());
    Ok(config)
}
