//! Configuration for the variance adaptor.
//!
//! Defaults match the published FastSpeech2 LJSpeech hyperparameters
//! (hidden 256, predictor filter 256, kernel 3, 256 variance bins,
//! f0 range 71.0–795.8 Hz, energy range 0.0–315.0).
//!
//! Bucket boundaries for the pitch/energy embeddings are derived here once
//! from the corpus statistics and are immutable afterwards: pitch boundaries
//! are log-spaced (f0 perception is logarithmic), energy boundaries linear.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Where pitch/energy are predicted and embedded: on the phoneme-level
/// sequence (before expansion) or the frame-level sequence (after).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureLevel {
    Phoneme,
    Frame,
}

/// Hyperparameters for the variance adaptor and its predictors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarianceConfig {
    // --- Sequence width ---
    pub encoder_hidden: usize,

    // --- Variance predictor ---
    pub filter_size: usize,
    pub kernel_size: usize,
    /// Training-time dropout rate (inactive at inference).
    pub dropout: f64,

    // --- Variance embeddings ---
    pub n_pitch_bins: usize,
    pub n_energy_bins: usize,
    pub pitch_min: f32,
    pub pitch_max: f32,
    pub energy_min: f32,
    pub energy_max: f32,

    // --- Feature level (pre- vs post-expansion prediction) ---
    pub pitch_feature_level: FeatureLevel,
    pub energy_feature_level: FeatureLevel,
}

impl Default for VarianceConfig {
    fn default() -> Self {
        Self {
            encoder_hidden: 256,
            filter_size: 256,
            kernel_size: 3,
            dropout: 0.5,
            n_pitch_bins: 256,
            n_energy_bins: 256,
            pitch_min: 71.0,
            pitch_max: 795.8,
            energy_min: 0.0,
            energy_max: 315.0,
            pitch_feature_level: FeatureLevel::Frame,
            energy_feature_level: FeatureLevel::Frame,
        }
    }
}

impl VarianceConfig {
    /// Check internal consistency. Called by the adaptor constructor.
    pub fn validate(&self) -> Result<()> {
        if self.kernel_size % 2 == 0 {
            return Err(Error::Config(format!(
                "kernel_size must be odd for same-padding convs, got {}",
                self.kernel_size
            )));
        }
        if self.n_pitch_bins < 2 || self.n_energy_bins < 2 {
            return Err(Error::Config(format!(
                "need at least 2 variance bins, got pitch={} energy={}",
                self.n_pitch_bins, self.n_energy_bins
            )));
        }
        if self.pitch_min <= 0.0 {
            return Err(Error::Config(format!(
                "pitch_min must be positive for log-spaced bins, got {}",
                self.pitch_min
            )));
        }
        if self.pitch_min >= self.pitch_max {
            return Err(Error::Config(format!(
                "pitch range is empty: [{}, {}]",
                self.pitch_min, self.pitch_max
            )));
        }
        if self.energy_min >= self.energy_max {
            return Err(Error::Config(format!(
                "energy range is empty: [{}, {}]",
                self.energy_min, self.energy_max
            )));
        }
        Ok(())
    }

    /// Log-spaced pitch bucket boundaries: `n_pitch_bins - 1` thresholds,
    /// giving `n_pitch_bins` buckets.
    pub fn pitch_boundaries(&self) -> Vec<f32> {
        log_spaced(self.pitch_min, self.pitch_max, self.n_pitch_bins - 1)
    }

    /// Linearly spaced energy bucket boundaries: `n_energy_bins - 1`
    /// thresholds, giving `n_energy_bins` buckets.
    pub fn energy_boundaries(&self) -> Vec<f32> {
        lin_spaced(self.energy_min, self.energy_max, self.n_energy_bins - 1)
    }

    /// Parse a config from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn lin_spaced(min: f32, max: f32, n: usize) -> Vec<f32> {
    if n == 1 {
        return vec![min];
    }
    let step = (max - min) / (n - 1) as f32;
    (0..n).map(|i| min + step * i as f32).collect()
}

fn log_spaced(min: f32, max: f32, n: usize) -> Vec<f32> {
    lin_spaced(min.ln(), max.ln(), n)
        .into_iter()
        .map(f32::exp)
        .collect()
}
