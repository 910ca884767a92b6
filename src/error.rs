//! Error types for the relaxometry pipeline

use thiserror::Error;

/// Errors surfaced by the pipeline. Per-pixel fit failures are not errors:
/// they are recovered inside `fitting` via sentinel parameters and never
/// propagate this far.
#[derive(Debug, Error)]
pub enum Error {
    /// Acquisition metadata does not match the expected sequence family
    /// and inversion-recovery flag for its track. Fatal before any
    /// computation is performed.
    #[error("acquisition validation failed: {0}")]
    Validation(String),

    /// Array dimensions violate a precondition (selection lengths, raw
    /// matrix divisibility, image dimensions disagreeing between tracks).
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A timepoint train (TI or TE values) was empty.
    #[error("empty {0} train: need at least one timepoint")]
    EmptyTrain(&'static str),

    /// A timepoint train entry could not be parsed as a number.
    #[error("bad train value {value:?}: {source}")]
    BadTrainValue {
        value: String,
        source: std::num::ParseFloatError,
    },

    /// The fit worker pool could not be built.
    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
}
