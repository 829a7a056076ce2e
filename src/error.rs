//! Error types shared by the segmentation pipeline and the service around it.

use thiserror::Error;

/// Failure reported by a [`Predictor`](crate::predictor::Predictor) implementation.
///
/// The predictor is opaque to the pipeline, so only a message is carried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PredictorError {
    message: String,
}

impl PredictorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors produced while turning an upload plus points into polygons.
#[derive(Error, Debug)]
pub enum SegmentError {
    /// The uploaded bytes are not a supported, non-empty image.
    #[error("image decode error: {0}")]
    Decode(String),

    /// No points were supplied; callers short-circuit on this before the predictor runs.
    #[error("no points supplied")]
    EmptyPointSet,

    #[error("predictor error: {0}")]
    Predictor(#[from] PredictorError),

    /// Degenerate geometry; resolved locally as zero area.
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("image encode error: {0}")]
    Encode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Broken pipeline invariant, such as a missing embedding right after loading one.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while loading service configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T, E = SegmentError> = std::result::Result<T, E>;
