//! Error taxonomy shared across the modelport crates.
//!
//! Archive and reconstruction errors are fatal to the reconstruction step.
//! Export errors are isolated per exporter. Comparison outcomes are data and
//! live with the harness, not here.

use crate::RepresentationKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while opening or reading a parameter archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("corrupt archive {}: {reason}", .path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("key `{key}` not found in archive")]
    KeyNotFound { key: String },

    #[error(
        "shape mismatch for `{key}`: shape {shape:?} of {dtype} needs {expected_bytes} bytes \
         but the entry holds {actual_bytes}"
    )]
    ShapeMismatch {
        key: String,
        shape: Vec<usize>,
        dtype: String,
        expected_bytes: usize,
        actual_bytes: usize,
    },

    #[error("invalid shape {shape:?} for `{key}`: dimensions must be positive")]
    InvalidShape { key: String, shape: Vec<usize> },

    #[error("unsupported element type `{name}`")]
    UnsupportedType { name: String },

    #[error("duplicate archive key `{key}`")]
    DuplicateKey { key: String },

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// The archive key this error refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::KeyNotFound { key }
            | Self::ShapeMismatch { key, .. }
            | Self::InvalidShape { key, .. }
            | Self::DuplicateKey { key } => Some(key),
            _ => None,
        }
    }
}

/// Errors raised while building or converting an owned [`crate::Tensor`].
#[derive(Error, Debug)]
pub enum TensorError {
    #[error("buffer of {actual} bytes does not fit shape {shape:?} of {dtype} ({expected} bytes)")]
    LengthMismatch { shape: Vec<usize>, dtype: String, expected: usize, actual: usize },

    #[error("element count of shape {shape:?} overflows")]
    Overflow { shape: Vec<usize> },

    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Why a single parameter could not be reconstructed.
#[derive(Error, Debug)]
pub enum ReconstructionCause {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("structural: {0}")]
    Structural(String),
}

/// Errors raised by the parameter reconstructor and the model forward pass.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to reconstruct `{layer}.{parameter}` from key `{key}`: {cause}")]
    Reconstruction {
        layer: String,
        parameter: String,
        key: String,
        #[source]
        cause: ReconstructionCause,
    },

    #[error("invalid model skeleton: {0}")]
    Skeleton(String),

    #[error("forward pass failed in layer `{layer}`: {reason}")]
    Forward { layer: String, reason: String },

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl ModelError {
    /// Archive key of the parameter that failed to reconstruct.
    pub fn failing_key(&self) -> Option<&str> {
        match self {
            Self::Reconstruction { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Failure of one representation exporter. Never fatal to its siblings.
#[derive(Error, Debug, Clone)]
pub enum ExportError {
    #[error("{stage} export failed: {cause}")]
    Failed { stage: RepresentationKind, cause: String },

    #[error("{stage} export timed out after {after:?}")]
    Timeout { stage: RepresentationKind, after: Duration },
}

impl ExportError {
    pub fn stage(&self) -> RepresentationKind {
        match self {
            Self::Failed { stage, .. } | Self::Timeout { stage, .. } => *stage,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported config extension for {} (expected .toml or .json)", .path.display())]
    UnsupportedExtension { path: PathBuf },

    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue { key: String, value: String, reason: String },

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Umbrella error for callers that drive the whole pipeline.
#[derive(Error, Debug)]
pub enum PortError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, PortError>;
