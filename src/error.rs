//! Error types for fastspeech2-rs.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor/model error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// Shape or mask precondition violation — a caller bug, never recoverable.
    ///
    /// Raised when a sequence tensor disagrees with its declared valid
    /// lengths or mask, before any computation touches the data.
    #[error("shape: {0}")]
    Shape(String),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
