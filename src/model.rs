//! Model components for the variance adaptor.
//!
//! ## Components
//!
//! - [`mask`] — length masks and shape precondition checks
//! - [`predictor`] — conv/projection variance predictor (duration, pitch, energy)
//! - [`embedding`] — bucketized pitch/energy embeddings
//! - [`length_regulator`] — duration-driven phoneme→frame expansion
//! - [`adaptor`] — the full duration→expand→pitch→energy pipeline

pub mod adaptor;
pub mod embedding;
pub mod length_regulator;
pub mod mask;
pub mod predictor;
