//! Bucketized variance embeddings.
//!
//! Maps a continuous pitch/energy scalar to a discrete bucket via ordered
//! threshold comparison, then looks up a learned embedding row for that
//! bucket. With `n - 1` boundaries there are `n` buckets, matching the
//! embedding table's row count. Boundaries are fixed at construction
//! (precomputed from corpus statistics, see [`crate::config`]) and never
//! change at inference.

use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;

use crate::{Error, Result};

/// Embedding table indexed by bucketized scalar values.
pub struct VarianceEmbedding {
    boundaries: Vec<f32>,
    table: candle_nn::Embedding,
}

impl VarianceEmbedding {
    /// Load the embedding table for `boundaries.len() + 1` buckets.
    ///
    /// `boundaries` must be strictly increasing and non-empty.
    pub fn load(vb: VarBuilder, boundaries: Vec<f32>, dim: usize) -> Result<Self> {
        if boundaries.is_empty() {
            return Err(Error::Config("bucket boundaries are empty".into()));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Config(
                "bucket boundaries must be strictly increasing".into(),
            ));
        }
        let n_bins = boundaries.len() + 1;
        let table = candle_nn::embedding(n_bins, dim, vb)?;
        Ok(Self { boundaries, table })
    }

    /// Number of buckets (= embedding rows).
    pub fn n_bins(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// Bucket index for one value: the count of boundaries strictly below
    /// it. Values below the first boundary map to 0, values at or above the
    /// last to `n_bins - 1` — order-preserving by construction.
    pub fn bucketize(&self, value: f32) -> u32 {
        self.boundaries.partition_point(|&b| b < value) as u32
    }

    /// Bucketize and embed a `[B, T]` value tensor into `[B, T, dim]`.
    pub fn forward(&self, values: &Tensor) -> Result<Tensor> {
        let (b, t) = values.dims2()?;
        let rows: Vec<Vec<f32>> = values.to_dtype(candle_core::DType::F32)?.to_vec2()?;
        let indices: Vec<u32> = rows
            .iter()
            .flat_map(|row| row.iter().map(|&v| self.bucketize(v)))
            .collect();
        let indices = Tensor::from_vec(indices, (b, t), values.device())?;
        Ok(self.table.forward(&indices)?)
    }
}
