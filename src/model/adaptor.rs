//! Variance adaptor: duration → expansion → pitch → energy.
//!
//! Orchestrates the three variance predictors, the bucketized pitch/energy
//! embeddings and the length regulator into the full pipeline:
//!
//! ```text
//! encoder hidden [B, T, C]
//!   → duration predictor (log scale)
//!   → length regulator (ground-truth or predicted+controlled durations)
//!   → frame hidden [B, T', C]
//!   → pitch predictor  → + pitch embedding
//!   → energy predictor → + energy embedding
//!   → conditioned frame hidden [B, T', C] (to the decoder)
//! ```
//!
//! The two operating modes are a tagged input, not hidden `None`-checks:
//! [`AdaptorInput::TeacherForced`] conditions on ground-truth targets
//! (training — duration/pitch/energy prediction error stays out of the
//! decoder's input distribution), [`AdaptorInput::Inference`] conditions on
//! the model's own predictions scaled by user [`ProsodyControl`] factors.
//!
//! Pitch/energy can operate on the phoneme-level sequence (predicted and
//! embedded before expansion, so the embedding gets repeated with its
//! phoneme) or the frame-level sequence (after expansion), per
//! [`FeatureLevel`] in the config. The level is honored identically on both
//! paths.

use candle_core::{DType, Tensor};
use candle_nn::VarBuilder;

use crate::config::{FeatureLevel, VarianceConfig};
use crate::model::embedding::VarianceEmbedding;
use crate::model::length_regulator::{self, Expanded};
use crate::model::mask::get_mask_from_lengths;
use crate::model::predictor::VariancePredictor;
use crate::{Error, Result};

/// Inference-time prosody multipliers. 1.0 reproduces the unmodified model.
#[derive(Debug, Clone, Copy)]
pub struct ProsodyControl {
    /// Duration multiplier (< 1.0 speeds speech up, > 1.0 slows it down).
    pub duration: f64,
    /// Pitch multiplier, applied before bucketization.
    pub pitch: f64,
    /// Energy multiplier, applied before bucketization.
    pub energy: f64,
}

impl Default for ProsodyControl {
    fn default() -> Self {
        Self {
            duration: 1.0,
            pitch: 1.0,
            energy: 1.0,
        }
    }
}

/// Per-call operating mode of the adaptor.
pub enum AdaptorInput<'a> {
    /// Training: condition on ground-truth targets.
    TeacherForced {
        /// `[B, T]` integer durations per phoneme.
        duration: &'a Tensor,
        /// Pitch targets at the configured feature level
        /// (`[B, T]` phoneme-level or `[B, max_mel_len]` frame-level).
        pitch: &'a Tensor,
        /// Energy targets, same shape rules as `pitch`.
        energy: &'a Tensor,
        /// Ground-truth mel length per item.
        mel_lens: &'a [usize],
        /// Batch mel width; the expanded output is exactly this wide.
        max_mel_len: usize,
    },
    /// Inference: condition on controlled predictions.
    Inference(ProsodyControl),
}

/// What gets bucketized and embedded into the hidden sequence: the
/// ground-truth target (teacher-forced) or the model's own prediction
/// scaled by a control factor (inference).
enum VarianceSource<'a> {
    Target(&'a Tensor),
    Controlled(f64),
}

/// Everything the adaptor hands downstream.
pub struct VarianceOutput {
    /// `[B, T', C]` pitch/energy-conditioned frame-level hidden states.
    pub hidden: Tensor,
    /// `[B, T]` predicted log-duration (`ln(d + 1)` scale), masked.
    pub log_duration: Tensor,
    /// Predicted pitch, masked; shape follows the configured feature level.
    pub pitch: Tensor,
    /// Predicted energy, masked; shape follows the configured feature level.
    pub energy: Tensor,
    /// Valid frame count per item.
    pub frame_lens: Vec<usize>,
    /// `[B, T']` frame-level validity mask.
    pub frame_mask: Tensor,
    /// Items hard-truncated during teacher-forced expansion. Nonzero means
    /// duration data disagreed with the mel length — a data anomaly.
    pub truncated: usize,
}

/// The variance adaptor.
pub struct VarianceAdaptor {
    config: VarianceConfig,
    duration_predictor: VariancePredictor,
    pitch_predictor: VariancePredictor,
    energy_predictor: VariancePredictor,
    pitch_embedding: VarianceEmbedding,
    energy_embedding: VarianceEmbedding,
}

impl VarianceAdaptor {
    /// Load weights from a var store scoped to the adaptor's namespace.
    pub fn load(vb: VarBuilder, config: &VarianceConfig) -> Result<Self> {
        config.validate()?;

        let duration_predictor =
            VariancePredictor::load(vb.pp("duration_predictor"), config)?;
        let pitch_predictor = VariancePredictor::load(vb.pp("pitch_predictor"), config)?;
        let energy_predictor = VariancePredictor::load(vb.pp("energy_predictor"), config)?;
        let pitch_embedding = VarianceEmbedding::load(
            vb.pp("pitch_embedding"),
            config.pitch_boundaries(),
            config.encoder_hidden,
        )?;
        let energy_embedding = VarianceEmbedding::load(
            vb.pp("energy_embedding"),
            config.energy_boundaries(),
            config.encoder_hidden,
        )?;

        Ok(Self {
            config: config.clone(),
            duration_predictor,
            pitch_predictor,
            energy_predictor,
            pitch_embedding,
            energy_embedding,
        })
    }

    /// Run the full duration→expand→pitch→energy pipeline.
    ///
    /// - `x`: `[B, T, C]` phoneme-level hidden states from the encoder
    /// - `src_lens`: valid phoneme count per item (`src_lens[b] ≤ T`)
    pub fn forward(
        &self,
        x: &Tensor,
        src_lens: &[usize],
        input: AdaptorInput,
    ) -> Result<VarianceOutput> {
        let (batch, src_len, _) = x.dims3().map_err(|_| {
            Error::Shape(format!(
                "encoder output must be [B, T, C], got {:?}",
                x.dims()
            ))
        })?;
        if src_lens.len() != batch {
            return Err(Error::Shape(format!(
                "{} source lengths for a batch of {batch}",
                src_lens.len()
            )));
        }
        let src_mask = get_mask_from_lengths(src_lens, src_len, x.device())?;

        let log_duration = self.duration_predictor.forward(x, &src_mask)?;

        match input {
            AdaptorInput::TeacherForced {
                duration,
                pitch,
                energy,
                mel_lens,
                max_mel_len,
            } => self.teacher_forced(
                x,
                &src_mask,
                log_duration,
                duration,
                pitch,
                energy,
                mel_lens,
                max_mel_len,
            ),
            AdaptorInput::Inference(control) => {
                self.inference(x, &src_mask, log_duration, control)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn teacher_forced(
        &self,
        x: &Tensor,
        src_mask: &Tensor,
        log_duration: Tensor,
        duration: &Tensor,
        pitch_target: &Tensor,
        energy_target: &Tensor,
        mel_lens: &[usize],
        max_mel_len: usize,
    ) -> Result<VarianceOutput> {
        if duration.dims() != log_duration.dims() {
            return Err(Error::Shape(format!(
                "duration target {:?} does not match the phoneme sequence {:?}",
                duration.dims(),
                log_duration.dims()
            )));
        }

        let mut x = x.clone();
        let mut phoneme_pitch = None;
        let mut phoneme_energy = None;

        // Phoneme-level variances are embedded before expansion, so each
        // embedding is repeated together with its phoneme.
        if self.config.pitch_feature_level == FeatureLevel::Phoneme {
            let (conditioned, prediction) =
                self.add_pitch(&x, src_mask, VarianceSource::Target(pitch_target))?;
            x = conditioned;
            phoneme_pitch = Some(prediction);
        }
        if self.config.energy_feature_level == FeatureLevel::Phoneme {
            let (conditioned, prediction) =
                self.add_energy(&x, src_mask, VarianceSource::Target(energy_target))?;
            x = conditioned;
            phoneme_energy = Some(prediction);
        }

        // Expand with the ground-truth durations to the known mel width, so
        // the output lines up frame-for-frame with the supervision target.
        let expanded = length_regulator::expand(
            &x,
            &duration_vecs(duration)?,
            Some(max_mel_len),
        )?;
        let frame_mask = get_mask_from_lengths(mel_lens, max_mel_len, x.device())?;

        let mut frames = expanded.hidden;
        let pitch = match phoneme_pitch {
            Some(p) => p,
            None => {
                let (conditioned, prediction) =
                    self.add_pitch(&frames, &frame_mask, VarianceSource::Target(pitch_target))?;
                frames = conditioned;
                prediction
            }
        };
        let energy = match phoneme_energy {
            Some(e) => e,
            None => {
                let (conditioned, prediction) = self.add_energy(
                    &frames,
                    &frame_mask,
                    VarianceSource::Target(energy_target),
                )?;
                frames = conditioned;
                prediction
            }
        };

        Ok(VarianceOutput {
            hidden: frames,
            log_duration,
            pitch,
            energy,
            frame_lens: mel_lens.to_vec(),
            frame_mask,
            truncated: expanded.truncated,
        })
    }

    fn inference(
        &self,
        x: &Tensor,
        src_mask: &Tensor,
        log_duration: Tensor,
        control: ProsodyControl,
    ) -> Result<VarianceOutput> {
        let durations = invert_log_duration(&log_duration, control.duration)?;

        let mut x = x.clone();
        let mut phoneme_pitch = None;
        let mut phoneme_energy = None;

        if self.config.pitch_feature_level == FeatureLevel::Phoneme {
            let (conditioned, prediction) =
                self.add_pitch(&x, src_mask, VarianceSource::Controlled(control.pitch))?;
            x = conditioned;
            phoneme_pitch = Some(prediction);
        }
        if self.config.energy_feature_level == FeatureLevel::Phoneme {
            let (conditioned, prediction) =
                self.add_energy(&x, src_mask, VarianceSource::Controlled(control.energy))?;
            x = conditioned;
            phoneme_energy = Some(prediction);
        }

        // No explicit target width: the frame count is whatever the
        // controlled durations sum to, and the decoder learns it from the
        // returned lengths and mask.
        let Expanded {
            hidden: mut frames,
            lens: frame_lens,
            mask: frame_mask,
            truncated,
        } = length_regulator::expand(&x, &durations, None)?;

        let pitch = match phoneme_pitch {
            Some(p) => p,
            None => {
                let (conditioned, prediction) = self.add_pitch(
                    &frames,
                    &frame_mask,
                    VarianceSource::Controlled(control.pitch),
                )?;
                frames = conditioned;
                prediction
            }
        };
        let energy = match phoneme_energy {
            Some(e) => e,
            None => {
                let (conditioned, prediction) = self.add_energy(
                    &frames,
                    &frame_mask,
                    VarianceSource::Controlled(control.energy),
                )?;
                frames = conditioned;
                prediction
            }
        };

        Ok(VarianceOutput {
            hidden: frames,
            log_duration,
            pitch,
            energy,
            frame_lens,
            frame_mask,
            truncated,
        })
    }

    /// Predict pitch on `x`, embed either the target (teacher-forced) or
    /// the controlled prediction, and add the embedding to `x`.
    ///
    /// Returns the conditioned sequence and the masked prediction.
    fn add_pitch(
        &self,
        x: &Tensor,
        mask: &Tensor,
        source: VarianceSource,
    ) -> Result<(Tensor, Tensor)> {
        if let Some(empty) = empty_prediction(x)? {
            return Ok((x.clone(), empty));
        }
        let prediction = self.pitch_predictor.forward(x, mask)?;
        let values = match source {
            VarianceSource::Target(target) => {
                check_target_shape("pitch", target, mask)?;
                target.clone()
            }
            // Control scales the raw prediction before bucketization
            VarianceSource::Controlled(control) => (&prediction * control)?,
        };
        let embedded = self.pitch_embedding.forward(&values)?;
        Ok(((x + embedded)?, prediction))
    }

    /// Energy twin of [`Self::add_pitch`].
    fn add_energy(
        &self,
        x: &Tensor,
        mask: &Tensor,
        source: VarianceSource,
    ) -> Result<(Tensor, Tensor)> {
        if let Some(empty) = empty_prediction(x)? {
            return Ok((x.clone(), empty));
        }
        let prediction = self.energy_predictor.forward(x, mask)?;
        let values = match source {
            VarianceSource::Target(target) => {
                check_target_shape("energy", target, mask)?;
                target.clone()
            }
            VarianceSource::Controlled(control) => (&prediction * control)?,
        };
        let embedded = self.energy_embedding.forward(&values)?;
        Ok(((x + embedded)?, prediction))
    }
}

/// Zero-width frame sequences (every duration was zero) have nothing to
/// predict on, and the conv stack cannot run on an empty sequence; the
/// prediction is an empty `[B, 0]` tensor instead.
fn empty_prediction(x: &Tensor) -> Result<Option<Tensor>> {
    let (batch, width, _) = x.dims3()?;
    if width > 0 {
        return Ok(None);
    }
    Ok(Some(Tensor::zeros((batch, 0), x.dtype(), x.device())?))
}

/// Invert predicted log-durations (`ln(d + 1)` scale) to integer frame
/// counts: `clamp(round(round(exp(x) − 1) · factor), ≥ 0)`.
pub fn invert_log_duration(log_duration: &Tensor, factor: f64) -> Result<Vec<Vec<u32>>> {
    let rows: Vec<Vec<f32>> = log_duration.to_dtype(DType::F32)?.to_vec2()?;
    Ok(rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|&x| {
                    let d = (f64::from(x).exp() - 1.0).round();
                    (d * factor).round().max(0.0) as u32
                })
                .collect()
        })
        .collect())
}

fn duration_vecs(duration: &Tensor) -> Result<Vec<Vec<u32>>> {
    let rows: Vec<Vec<f32>> = duration.to_dtype(DType::F32)?.to_vec2()?;
    Ok(rows
        .iter()
        .map(|row| row.iter().map(|&d| d.round().max(0.0) as u32).collect())
        .collect())
}

fn check_target_shape(name: &str, target: &Tensor, mask: &Tensor) -> Result<()> {
    if target.dims() != mask.dims() {
        return Err(Error::Shape(format!(
            "{name} target {:?} does not match the sequence mask {:?}",
            target.dims(),
            mask.dims()
        )));
    }
    Ok(())
}
