//! Length regulator: duration-driven phoneme→frame expansion.
//!
//! The alignment mechanism of non-autoregressive synthesis: instead of an
//! attention-learned alignment, each phoneme's hidden vector is repeated
//! `duration` times, concatenated in order, and the batch re-padded to a
//! rectangular `[B, T', C]` tensor. The frame-level valid length of an item
//! is the sum of its durations; zero-duration phonemes contribute nothing.
//!
//! ```text
//! h = [h0, h1, h2], durations = [2, 0, 3]
//!   → [h0, h0, h2, h2, h2]        (valid length 5, h1 dropped)
//! ```
//!
//! With an explicit `target_len` (teacher-forced training, where the output
//! must line up with the ground-truth mel length) the output is padded or
//! hard-truncated to exactly that width. Truncation means the duration data
//! disagrees with the mel length — an anomaly, so it is counted in the
//! result and logged, never silently swallowed.

use candle_core::{IndexOp, Tensor};

use crate::model::mask::get_mask_from_lengths;
use crate::{Error, Result};

/// Frame-level sequence produced by [`expand`].
pub struct Expanded {
    /// `[B, T', C]` frame-level hidden states, zero-padded.
    pub hidden: Tensor,
    /// Valid frame count per item (after any truncation).
    pub lens: Vec<usize>,
    /// `[B, T']` validity mask derived from `lens`.
    pub mask: Tensor,
    /// Number of items hard-truncated to `target_len`.
    pub truncated: usize,
}

/// Expand a phoneme-level sequence into a frame-level sequence.
///
/// - `hidden`: `[B, T, C]` phoneme-level hidden states
/// - `durations`: per-item duration vectors; `durations[b].len()` may not
///   exceed `T`, and positions past it are treated as padding
/// - `target_len`: explicit output width (teacher-forced training), or
///   `None` to use the batch max of the summed durations
pub fn expand(
    hidden: &Tensor,
    durations: &[Vec<u32>],
    target_len: Option<usize>,
) -> Result<Expanded> {
    let (batch, src_len, channels) = hidden.dims3().map_err(|_| {
        Error::Shape(format!(
            "hidden sequence must be [B, T, C], got {:?}",
            hidden.dims()
        ))
    })?;
    if durations.len() != batch {
        return Err(Error::Shape(format!(
            "{} duration vectors for a batch of {batch}",
            durations.len()
        )));
    }
    for (b, dur) in durations.iter().enumerate() {
        if dur.len() > src_len {
            return Err(Error::Shape(format!(
                "item {b} has {} durations but the sequence width is {src_len}",
                dur.len()
            )));
        }
    }

    let totals: Vec<usize> = durations
        .iter()
        .map(|dur| dur.iter().map(|&d| d as usize).sum())
        .collect();
    let width = match target_len {
        Some(len) => len,
        None => totals.iter().copied().max().unwrap_or(0),
    };

    let mut rows = Vec::with_capacity(batch);
    let mut lens = Vec::with_capacity(batch);
    let mut truncated = 0usize;
    for (b, dur) in durations.iter().enumerate() {
        let valid = if totals[b] > width {
            truncated += 1;
            width
        } else {
            totals[b]
        };
        lens.push(valid);

        // Frame t takes the vector of the phoneme it falls inside
        let mut indices = Vec::with_capacity(valid);
        'fill: for (pos, &d) in dur.iter().enumerate() {
            for _ in 0..d {
                if indices.len() == valid {
                    break 'fill;
                }
                indices.push(pos as u32);
            }
        }

        let row = if valid > 0 {
            let indices = Tensor::from_vec(indices, valid, hidden.device())?;
            let selected = hidden.i(b)?.index_select(&indices, 0)?; // [valid, C]
            if valid < width {
                let pad = Tensor::zeros(
                    (width - valid, channels),
                    hidden.dtype(),
                    hidden.device(),
                )?;
                Tensor::cat(&[&selected, &pad], 0)?
            } else {
                selected
            }
        } else {
            Tensor::zeros((width, channels), hidden.dtype(), hidden.device())?
        };
        rows.push(row);
    }

    if truncated > 0 {
        tracing::warn!(
            truncated,
            target_len = width,
            "duration sums exceed the target frame length; hard-truncating"
        );
    }

    let hidden = Tensor::stack(&rows, 0)?;
    let mask = get_mask_from_lengths(&lens, width, hidden.device())?;
    Ok(Expanded {
        hidden,
        lens,
        mask,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    /// `[1, T, 2]` sequence whose vectors are `[i, 10*i]` for easy tracing.
    fn tagged_hidden(t: usize) -> Tensor {
        let data: Vec<f32> = (0..t).flat_map(|i| [i as f32, 10.0 * i as f32]).collect();
        Tensor::from_vec(data, (1, t, 2), &Device::Cpu).unwrap()
    }

    #[test]
    fn repeats_each_phoneme_by_its_duration() {
        let hidden = tagged_hidden(3);
        let out = expand(&hidden, &[vec![2, 0, 3]], None).unwrap();

        assert_eq!(out.lens, vec![5]);
        assert_eq!(out.truncated, 0);
        assert_eq!(out.hidden.dims(), &[1, 5, 2]);
        let rows: Vec<Vec<f32>> = out.hidden.i(0).unwrap().to_vec2().unwrap();
        // [h0, h0, h2, h2, h2] — h1 had duration 0 and is dropped
        assert_eq!(rows[0], vec![0.0, 0.0]);
        assert_eq!(rows[1], vec![0.0, 0.0]);
        assert_eq!(rows[2], vec![2.0, 20.0]);
        assert_eq!(rows[4], vec![2.0, 20.0]);
    }

    #[test]
    fn explicit_target_truncates() {
        let hidden = tagged_hidden(3);
        // Durations sum to 5, target is 4 → hard truncation to [h0, h0, h2, h2]
        let out = expand(&hidden, &[vec![2, 0, 3]], Some(4)).unwrap();

        assert_eq!(out.lens, vec![4]);
        assert_eq!(out.truncated, 1);
        assert_eq!(out.hidden.dims(), &[1, 4, 2]);
        let rows: Vec<Vec<f32>> = out.hidden.i(0).unwrap().to_vec2().unwrap();
        assert_eq!(rows[3], vec![2.0, 20.0]);
    }

    #[test]
    fn explicit_target_pads() {
        let hidden = tagged_hidden(2);
        let out = expand(&hidden, &[vec![1, 1]], Some(6)).unwrap();

        assert_eq!(out.lens, vec![2]);
        assert_eq!(out.truncated, 0);
        assert_eq!(out.hidden.dims(), &[1, 6, 2]);
        let rows: Vec<Vec<f32>> = out.hidden.i(0).unwrap().to_vec2().unwrap();
        assert_eq!(rows[1], vec![1.0, 10.0]);
        assert_eq!(rows[2], vec![0.0, 0.0]); // padding
        let mask: Vec<Vec<f32>> = out.mask.to_vec2().unwrap();
        assert_eq!(mask[0], vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn batch_width_is_the_max_summed_duration() {
        let data: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let hidden = Tensor::from_vec(data, (2, 2, 2), &Device::Cpu).unwrap();
        let out = expand(&hidden, &[vec![2, 1], vec![1, 0]], None).unwrap();

        assert_eq!(out.lens, vec![3, 1]);
        assert_eq!(out.hidden.dims(), &[2, 3, 2]);
        let mask: Vec<Vec<f32>> = out.mask.to_vec2().unwrap();
        assert_eq!(mask[0], vec![1.0, 1.0, 1.0]);
        assert_eq!(mask[1], vec![1.0, 0.0, 0.0]);
        // Item 1's padded tail is zeroed
        let rows: Vec<Vec<f32>> = out.hidden.i(1).unwrap().to_vec2().unwrap();
        assert_eq!(rows[1], vec![0.0, 0.0]);
        assert_eq!(rows[2], vec![0.0, 0.0]);
    }

    #[test]
    fn all_zero_durations_yield_an_empty_item() {
        let data: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let hidden = Tensor::from_vec(data, (2, 2, 2), &Device::Cpu).unwrap();
        let out = expand(&hidden, &[vec![0, 0], vec![2, 1]], None).unwrap();

        assert_eq!(out.lens, vec![0, 3]);
        let mask: Vec<Vec<f32>> = out.mask.to_vec2().unwrap();
        assert_eq!(mask[0], vec![0.0, 0.0, 0.0]);
        let rows: Vec<Vec<f32>> = out.hidden.i(0).unwrap().to_vec2().unwrap();
        assert!(rows.iter().all(|r| r.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn short_duration_vectors_treat_the_tail_as_padding() {
        let hidden = tagged_hidden(3);
        let out = expand(&hidden, &[vec![2]], None).unwrap();
        assert_eq!(out.lens, vec![2]);
        let rows: Vec<Vec<f32>> = out.hidden.i(0).unwrap().to_vec2().unwrap();
        assert_eq!(rows[0], vec![0.0, 0.0]);
        assert_eq!(rows[1], vec![0.0, 0.0]);
    }

    #[test]
    fn duration_batch_mismatch_fails_fast() {
        let hidden = tagged_hidden(3);
        assert!(matches!(
            expand(&hidden, &[vec![1], vec![1]], None),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            expand(&hidden, &[vec![1, 1, 1, 1]], None),
            Err(Error::Shape(_))
        ));
    }
}
