//! Variance predictor: per-position scalar regression.
//!
//! One network, three instances — duration (log scale), pitch, energy.
//!
//! ```text
//! x [B, T, hidden]
//!   → transpose → [B, hidden, T]
//!   → Conv1d(hidden → filter, k, same padding) → ReLU
//!   → transpose → LayerNorm(filter)
//!   → transpose → Conv1d(filter → filter, k, same padding) → ReLU
//!   → transpose → LayerNorm(filter)
//!   → Linear(filter → 1) → squeeze → [B, T]
//!   → mask (padding forced to exactly 0.0)
//! ```
//!
//! Position-wise with a local conv receptive field — no recurrence, so the
//! whole sequence is computed in one parallel pass. Dropout after each norm
//! is part of the training graph only and is omitted at inference.
//!
//! ## Weight key paths
//!
//! ```text
//! conv1d_1.{weight,bias}      — Conv1d(hidden, filter, k)
//! layer_norm_1.{weight,bias}  — LayerNorm(filter)
//! conv1d_2.{weight,bias}      — Conv1d(filter, filter, k)
//! layer_norm_2.{weight,bias}  — LayerNorm(filter)
//! linear_layer.{weight,bias}  — Linear(filter, 1)
//! ```

use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;

use crate::config::VarianceConfig;
use crate::model::mask::check_mask_shape;
use crate::Result;

/// Conv/projection network mapping each hidden vector to one scalar.
pub struct VariancePredictor {
    conv1: candle_nn::Conv1d,
    norm1: candle_nn::LayerNorm,
    conv2: candle_nn::Conv1d,
    norm2: candle_nn::LayerNorm,
    proj: candle_nn::Linear,
}

impl VariancePredictor {
    pub fn load(vb: VarBuilder, config: &VarianceConfig) -> Result<Self> {
        let k = config.kernel_size;
        let conv_cfg = candle_nn::Conv1dConfig {
            padding: (k - 1) / 2,
            stride: 1,
            dilation: 1,
            groups: 1,
            ..Default::default()
        };

        let conv1 = candle_nn::conv1d(
            config.encoder_hidden,
            config.filter_size,
            k,
            conv_cfg,
            vb.pp("conv1d_1"),
        )?;
        let norm1 = candle_nn::layer_norm(config.filter_size, 1e-5, vb.pp("layer_norm_1"))?;
        let conv2 = candle_nn::conv1d(
            config.filter_size,
            config.filter_size,
            k,
            conv_cfg,
            vb.pp("conv1d_2"),
        )?;
        let norm2 = candle_nn::layer_norm(config.filter_size, 1e-5, vb.pp("layer_norm_2"))?;
        let proj = candle_nn::linear(config.filter_size, 1, vb.pp("linear_layer"))?;

        Ok(Self {
            conv1,
            norm1,
            conv2,
            norm2,
            proj,
        })
    }

    /// Predict one scalar per position.
    ///
    /// - `x`: `[B, T, hidden]`
    /// - `mask`: `[B, T]` (1=valid, 0=padding)
    ///
    /// Returns `[B, T]` with masked positions set to exactly 0.0, so padding
    /// never leaks into loss terms or embedding lookups downstream.
    pub fn forward(&self, x: &Tensor, mask: &Tensor) -> Result<Tensor> {
        check_mask_shape(x, mask)?;

        // [B, T, hidden] → [B, hidden, T] for Conv1d
        let h = x.transpose(1, 2)?;
        let h = self.conv1.forward(&h)?.relu()?;
        // LayerNorm runs over the channel dim, so back to [B, T, filter]
        let h = self.norm1.forward(&h.transpose(1, 2)?)?;
        let h = self.conv2.forward(&h.transpose(1, 2)?)?.relu()?;
        let h = self.norm2.forward(&h.transpose(1, 2)?)?;

        // [B, T, filter] → [B, T, 1] → [B, T]
        let out = self.proj.forward(&h)?.squeeze(2)?;

        // Zero out padding positions
        Ok(out.broadcast_mul(mask)?)
    }
}
