use std::path::Path;

use ndarray::{Array2, Array4, Axis};
use ort::{inputs, Session};

use crate::error::Result;
use crate::models::{build_session, require_outputs, Extraction, FeatureExtractor};
use crate::preprocessing::{Normalization, IMAGENET_NORMALIZATION};

pub const INCEPTION_INPUT_SIZE: u32 = 299;
pub const INCEPTION_FEATURE_DIMS: usize = 2048;
pub const INCEPTION_NUM_CLASSES: usize = 1000;

const FEATURES_OUTPUT: &str = "FEATURES";
const LOGITS_OUTPUT: &str = "LOGITS";

/// Inception-v3 pretrained on ImageNet.
/// The ONNX export must expose two outputs:
/// `FEATURES`, the 2048-dimensional average-pool activations feeding the classifier head,
/// and `LOGITS`, the 1000 ImageNet class logits.
/// Both come out of one forward pass, so the Fréchet distance and the inception score
/// of a batch share a single run of the network.
pub struct Inception
{
    session: Session,
}

impl Inception
{
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self>
    {
        let session = build_session(model_path, intra_threads)?;
        require_outputs(&session, model_path, &[FEATURES_OUTPUT, LOGITS_OUTPUT])?;
        Ok(Inception { session })
    }
}

impl FeatureExtractor for Inception
{
    fn input_size(&self) -> u32
    {
        INCEPTION_INPUT_SIZE
    }

    fn normalization(&self) -> Normalization
    {
        IMAGENET_NORMALIZATION
    }

    fn feature_dims(&self) -> usize
    {
        INCEPTION_FEATURE_DIMS
    }

    fn num_classes(&self) -> usize
    {
        INCEPTION_NUM_CLASSES
    }

    fn extract(&self, images: Array4<f32>) -> Result<Extraction>
    {
        let images_len = images.len_of(Axis(0));
        let outputs = self.session.run(inputs![images]?)?;

        let features = outputs[FEATURES_OUTPUT].try_extract_tensor::<f32>()?;
        // Some exports keep the trailing 1x1 spatial dimensions; the reshape drops them.
        let features = features.to_shape((images_len, INCEPTION_FEATURE_DIMS))?.to_owned();

        let logits = outputs[LOGITS_OUTPUT].try_extract_tensor::<f32>()?;
        let logits = logits.to_shape((images_len, INCEPTION_NUM_CLASSES))?.to_owned();

        Ok(Extraction { features, probabilities: softmax_rows(&logits) })
    }
}

/// Row-wise softmax, shifted by each row's maximum for stability.
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32>
{
    let mut probabilities = logits.clone();
    probabilities.axis_iter_mut(Axis(0)).for_each(|mut row| {
        let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row /= sum;
    });
    probabilities
}
