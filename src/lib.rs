//! FastSpeech2 variance adaptor in pure Rust.
//!
//! A candle-based implementation of the variance adaptor from FastSpeech2-
//! style non-autoregressive text-to-speech: per-phoneme duration, pitch and
//! energy prediction, bucketized variance embeddings, and the length
//! regulator that expands a phoneme-level hidden sequence into a
//! frame-level one. Loads original safetensors weights directly.
//!
//! ## Architecture
//!
//! The adaptor sits between the encoder and decoder transformer stacks
//! (both external to this crate):
//!
//! ```text
//! encoder hidden states [B, T, C]
//!          ↓
//! duration predictor ── log-durations (training loss)
//!          ↓
//! length regulator ── repeat each phoneme `duration` times
//!          ↓
//! frame hidden states [B, T', C]
//!          ↓
//! pitch predictor  → bucketize → + pitch embedding
//! energy predictor → bucketize → + energy embedding
//!          ↓
//! conditioned frame hidden states → decoder
//! ```
//!
//! During training the expansion and embeddings are teacher-forced from
//! ground-truth targets; at inference the model's own predictions drive
//! them, scaled by user prosody controls (speed, pitch shift, loudness).
//!
//! ## Modules
//!
//! - [`config`] — hyperparameters, feature levels, bucket boundaries
//! - [`model`] — predictors, embeddings, length regulator, adaptor

pub mod config;
pub mod model;

mod error;

pub use config::{FeatureLevel, VarianceConfig};
pub use error::{Error, Result};
pub use model::adaptor::{
    AdaptorInput, ProsodyControl, VarianceAdaptor, VarianceOutput,
};
