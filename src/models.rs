//! The seams between the metric pipeline and the pretrained networks.
//! The ONNX-backed implementations live in `inception` and `clip`;
//! anything else implementing these traits (for example a fixed, hand-written
//! extractor) can be evaluated the same way.

use std::path::Path;

use ndarray::{Array2, Array4, Axis};
use ort::{GraphOptimizationLevel, Session};

use crate::error::{Error, Result};
use crate::preprocessing::Normalization;

/// Outputs of one forward pass of an image classifier over a batch.
#[derive(Debug, Clone)]
pub struct Extraction
{
    /// (batch_size, feature_dims) penultimate-layer activations.
    pub features: Array2<f32>,
    /// (batch_size, num_classes) softmax class probabilities.
    pub probabilities: Array2<f32>,
}

pub trait FeatureExtractor: Send + Sync
{
    /// Side length of the square input the network expects.
    fn input_size(&self) -> u32;
    fn normalization(&self) -> Normalization;
    fn feature_dims(&self) -> usize;
    fn num_classes(&self) -> usize;
    /// `images` is a (batch, 3, input_size, input_size) normalized tensor.
    fn extract(&self, images: Array4<f32>) -> Result<Extraction>;
}

/// A dual encoder mapping text and images into one embedding space.
/// Both encoders return L2 normalized rows, so the dot product of an image
/// and a text embedding is their cosine similarity.
pub trait TextImageEncoder: Send + Sync
{
    fn input_size(&self) -> u32;
    fn normalization(&self) -> Normalization;
    /// Temperature of the pretrained model, fixed at load time.
    fn logit_scale(&self) -> f32;
    fn encode_images(&self, images: Array4<f32>) -> Result<Array2<f32>>;
    fn encode_texts(&self, texts: &[&str]) -> Result<Array2<f32>>;
}

/// Builds an ONNX session, mapping any failure to `ExtractorUnavailable`.
pub(crate) fn build_session(model_path: &Path, intra_threads: usize) -> Result<Session>
{
    let unavailable = |reason: String| Error::ExtractorUnavailable {
        model: model_path.display().to_string(),
        reason,
    };

    if !model_path.is_file() {
        return Err(unavailable("model file not found".to_string()));
    }

    let build = || -> std::result::Result<Session, ort::Error> {
        Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
    };

    build().map_err(|e| unavailable(e.to_string()))
}

/// Fails with `ExtractorUnavailable` unless `session` has every output in `required`.
/// Outputs are looked up by name on every run, so a mismatched export is refused at load.
pub(crate) fn require_outputs(session: &Session, model_path: &Path, required: &[&str]) -> Result<()>
{
    let available: Vec<&str> = session.outputs.iter().map(|output| output.name.as_str()).collect();
    check_output_names(model_path, &available, required)
}

fn check_output_names(model_path: &Path, available: &[&str], required: &[&str]) -> Result<()>
{
    match required.iter().find(|&&name| !available.contains(&name)) {
        Some(missing) => Err(Error::ExtractorUnavailable {
            model: model_path.display().to_string(),
            reason: format!("missing output {} (model has {:?})", missing, available),
        }),
        None => Ok(()),
    }
}

/// Normalizes each row to unit L2 length. Zero rows are left untouched.
pub(crate) fn normalize_rows(rows: &mut Array2<f32>)
{
    rows.axis_iter_mut(Axis(0)).for_each(|mut row| {
        let norm = row.dot(&row).sqrt();
        if norm == 0.0 {
            return;
        }
        row /= norm;
    });
}
