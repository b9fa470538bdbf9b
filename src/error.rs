use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported image format for {path:?}: {reason}")]
    UnsupportedImageFormat { path: PathBuf, reason: String },
    #[error("Feature extractor {model} is unavailable: {reason}")]
    ExtractorUnavailable { model: String, reason: String },
    #[error("Insufficient samples: need at least {needed}, found {found}")]
    InsufficientSamples { needed: usize, found: usize },
    #[error("Numerical instability in {context}; offending eigenvalues: {eigenvalues:?}")]
    NumericalInstability { context: String, eigenvalues: Vec<f64> },
    #[error("Degenerate probability distribution at row {row}: {reason}")]
    DegenerateDistribution { row: usize, reason: String },
    #[error("Dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("The path is not a directory: {0:?}")]
    NotADirectory(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Ort(#[from] ort::Error),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
}

impl Error
{
    /// Errors which abort the whole evaluation run rather than a single metric.
    pub fn is_fatal(&self) -> bool
    {
        matches!(self, Error::ExtractorUnavailable { .. })
    }
}
