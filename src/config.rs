use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_SPLITS: usize = 1;
// Rows of a class-probability matrix must sum to 1 within this tolerance.
pub const DEFAULT_DISTRIBUTION_TOLERANCE: f64 = 1e-3;
// Relative to the largest eigenvalue magnitude (or 1, whichever is greater).
pub const DEFAULT_EIGEN_TOLERANCE: f64 = 1e-6;
// exp(logit_scale) of the pretrained ViT-B/32 checkpoint.
pub const DEFAULT_CLIP_LOGIT_SCALE: f32 = 100.0;
pub const DEFAULT_INTRA_THREADS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Metric
{
    Fid,
    InceptionScore,
    ClipSimilarity,
}

/// Every tunable of an evaluation run.
/// Loaded from a JSON file; fields missing from the file take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig
{
    /// ONNX export of Inception-v3 with `FEATURES` and `LOGITS` outputs.
    pub inception_model: PathBuf,
    pub clip_visual_model: PathBuf,
    pub clip_text_model: PathBuf,
    pub batch_size: usize,
    /// Number of splits for the inception score.
    pub splits: usize,
    pub distribution_tolerance: f64,
    pub eigen_tolerance: f64,
    pub clip_logit_scale: f32,
    pub intra_threads: usize,
    pub metrics: Vec<Metric>,
}

impl Default for EvalConfig
{
    fn default() -> Self
    {
        let models = PathBuf::from("models");
        EvalConfig {
            inception_model: models.join("inception_v3.onnx"),
            clip_visual_model: models.join("clip_vit_b32_visual.onnx"),
            clip_text_model: models.join("clip_vit_b32_transformer.onnx"),
            batch_size: DEFAULT_BATCH_SIZE,
            splits: DEFAULT_SPLITS,
            distribution_tolerance: DEFAULT_DISTRIBUTION_TOLERANCE,
            eigen_tolerance: DEFAULT_EIGEN_TOLERANCE,
            clip_logit_scale: DEFAULT_CLIP_LOGIT_SCALE,
            intra_threads: DEFAULT_INTRA_THREADS,
            metrics: vec![Metric::Fid, Metric::InceptionScore, Metric::ClipSimilarity],
        }
    }
}

impl EvalConfig
{
    pub fn load(path: &Path) -> Result<Self>
    {
        let contents = std::fs::read_to_string(path)?;
        let config: EvalConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn wants(&self, metric: Metric) -> bool
    {
        self.metrics.contains(&metric)
    }

    /// Checked before any model is loaded.
    pub fn validate(&self) -> Result<()>
    {
        if self.batch_size == 0 {
            return Err(Error::InvalidParameter { name: "batch_size", reason: "must be at least 1".to_string() });
        }
        if self.splits == 0 {
            return Err(Error::InvalidParameter { name: "splits", reason: "must be at least 1".to_string() });
        }
        if self.intra_threads == 0 {
            return Err(Error::InvalidParameter { name: "intra_threads", reason: "must be at least 1".to_string() });
        }
        if !(self.distribution_tolerance > 0.0) {
            return Err(Error::InvalidParameter {
                name: "distribution_tolerance",
                reason: format!("must be positive, got {}", self.distribution_tolerance),
            });
        }
        if !(self.eigen_tolerance > 0.0) {
            return Err(Error::InvalidParameter {
                name: "eigen_tolerance",
                reason: format!("must be positive, got {}", self.eigen_tolerance),
            });
        }
        if !(self.clip_logit_scale.is_finite() && self.clip_logit_scale > 0.0) {
            return Err(Error::InvalidParameter {
                name: "clip_logit_scale",
                reason: format!("must be positive and finite, got {}", self.clip_logit_scale),
            });
        }
        if self.metrics.is_empty() {
            return Err(Error::InvalidParameter { name: "metrics", reason: "no metric selected".to_string() });
        }
        Ok(())
    }
}
