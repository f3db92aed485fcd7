//! Length masks for ragged batches.
//!
//! Variable-length sequences are carried as a dense `[B, T, C]` tensor plus
//! a per-item valid-length vector; the mask is always derived from the
//! lengths, never stored alongside them. After expansion the max length
//! changes, so the frame-level mask is recomputed from the new lengths.
//!
//! Masks are f32 tensors with 1.0 at valid positions and 0.0 at padding,
//! so they can be multiplied straight into predictor outputs.

use candle_core::{Device, Tensor};

use crate::{Error, Result};

/// Build a `[B, max_len]` validity mask from per-item lengths.
///
/// `mask[b, t] == 1.0` iff `t < lens[b]`.
///
/// Errors with [`Error::Shape`] if any length exceeds `max_len`.
pub fn get_mask_from_lengths(lens: &[usize], max_len: usize, device: &Device) -> Result<Tensor> {
    for (b, &len) in lens.iter().enumerate() {
        if len > max_len {
            return Err(Error::Shape(format!(
                "item {b} has valid length {len} > max length {max_len}"
            )));
        }
    }

    let mut data = vec![0.0f32; lens.len() * max_len];
    for (b, &len) in lens.iter().enumerate() {
        data[b * max_len..b * max_len + len].fill(1.0);
    }
    Ok(Tensor::from_vec(data, (lens.len(), max_len), device)?)
}

/// Check that a `[B, T, C]` hidden tensor and a `[B, T]` mask agree.
///
/// Fails fast with [`Error::Shape`] on any rank or dimension mismatch —
/// a disagreement here is a caller bug and must never reach the math.
pub fn check_mask_shape(hidden: &Tensor, mask: &Tensor) -> Result<()> {
    let (b, t, _c) = hidden.dims3().map_err(|_| {
        Error::Shape(format!(
            "hidden sequence must be [B, T, C], got rank-{} {:?}",
            hidden.rank(),
            hidden.dims()
        ))
    })?;
    let (mb, mt) = mask.dims2().map_err(|_| {
        Error::Shape(format!(
            "mask must be [B, T], got rank-{} {:?}",
            mask.rank(),
            mask.dims()
        ))
    })?;
    if (b, t) != (mb, mt) {
        return Err(Error::Shape(format!(
            "hidden [{b}, {t}, _] does not match mask [{mb}, {mt}]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn mask_from_lengths() {
        let mask = get_mask_from_lengths(&[3, 1], 4, &Device::Cpu).unwrap();
        assert_eq!(mask.dims(), &[2, 4]);
        let rows: Vec<Vec<f32>> = mask.to_vec2().unwrap();
        assert_eq!(rows[0], vec![1.0, 1.0, 1.0, 0.0]);
        assert_eq!(rows[1], vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn zero_length_item_is_all_padding() {
        let mask = get_mask_from_lengths(&[0, 2], 2, &Device::Cpu).unwrap();
        let rows: Vec<Vec<f32>> = mask.to_vec2().unwrap();
        assert_eq!(rows[0], vec![0.0, 0.0]);
        assert_eq!(rows[1], vec![1.0, 1.0]);
    }

    #[test]
    fn length_exceeding_max_is_a_precondition_violation() {
        let err = get_mask_from_lengths(&[5], 4, &Device::Cpu).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn mask_shape_check() {
        let device = Device::Cpu;
        let hidden = Tensor::zeros((2, 6, 8), DType::F32, &device).unwrap();
        let good = Tensor::zeros((2, 6), DType::F32, &device).unwrap();
        let bad = Tensor::zeros((2, 5), DType::F32, &device).unwrap();

        check_mask_shape(&hidden, &good).unwrap();
        assert!(matches!(
            check_mask_shape(&hidden, &bad),
            Err(Error::Shape(_))
        ));
        // Rank mismatch also fails fast
        assert!(matches!(
            check_mask_shape(&good, &good),
            Err(Error::Shape(_))
        ));
    }
}
