use std::path::Path;

use ndarray::{Array2, Array4, Axis};
use ort::{inputs, Session};

use crate::error::Result;
use crate::models::{build_session, normalize_rows, require_outputs, TextImageEncoder};
use crate::preprocessing::{self, Normalization, CLIP_NORMALIZATION};

pub const CLIP_INPUT_SIZE: u32 = 224;

const EMBEDDING_OUTPUT: &str = "FEATURES_EMBEDDED";

/// The CLIP dual encoder.
/// Supports the two encoder halves, `encode_images()` and `encode_texts()`,
/// each a separate ONNX graph with a `FEATURES_EMBEDDED` output.
/// See the [OpenAI CLIP paper](https://arxiv.org/abs/2103.00020) for more details.
///
/// Both encoders L2 normalize their output, so the similarity of an image and a text
/// is `logit_scale * dot(image, text)`, which is exactly the `logits_per_image`
/// entry the full CLIP forward pass would produce.
pub struct Clip
{
    visual_session: Session,
    text_session: Session,
    tokenizer: instant_clip_tokenizer::Tokenizer,
    logit_scale: f32,
}

impl Clip
{
    pub fn new(visual_model: &Path, text_model: &Path, logit_scale: f32, intra_threads: usize) -> Result<Self>
    {
        let visual_session = build_session(visual_model, intra_threads)?;
        let text_session = build_session(text_model, intra_threads)?;
        require_outputs(&visual_session, visual_model, &[EMBEDDING_OUTPUT])?;
        require_outputs(&text_session, text_model, &[EMBEDDING_OUTPUT])?;
        let tokenizer = instant_clip_tokenizer::Tokenizer::new();

        Ok(Clip { visual_session, text_session, tokenizer, logit_scale })
    }

    /// The embedding width differs between CLIP variants (512 for ViT-B/32, 768 for ViT-L/14),
    /// so it is read off the output rather than fixed.
    fn embeddings(view: ndarray::ArrayViewD<'_, f32>, batch_len: usize) -> Result<Array2<f32>>
    {
        let dims = if batch_len == 0 { 0 } else { view.len() / batch_len };
        let mut output = view.to_shape((batch_len, dims))?.to_owned();
        normalize_rows(&mut output);
        Ok(output)
    }
}

impl TextImageEncoder for Clip
{
    fn input_size(&self) -> u32
    {
        CLIP_INPUT_SIZE
    }

    fn normalization(&self) -> Normalization
    {
        CLIP_NORMALIZATION
    }

    fn logit_scale(&self) -> f32
    {
        self.logit_scale
    }

    /// Returns a 2D array of shape (batch_size, embedding_dims).
    fn encode_images(&self, images: Array4<f32>) -> Result<Array2<f32>>
    {
        let images_len = images.len_of(Axis(0));
        let outputs = self.visual_session.run(inputs![images]?)?;
        let output = outputs[EMBEDDING_OUTPUT].try_extract_tensor::<f32>()?;
        Self::embeddings(output, images_len)
    }

    /// Returns a 2D array of shape (batch_size, embedding_dims).
    fn encode_texts(&self, texts: &[&str]) -> Result<Array2<f32>>
    {
        let tokens = preprocessing::tokenize_batch(texts, &self.tokenizer);
        let outputs = self.text_session.run(inputs![tokens]?)?;
        let output = outputs[EMBEDDING_OUTPUT].try_extract_tensor::<f32>()?;
        Self::embeddings(output, texts.len())
    }
}
