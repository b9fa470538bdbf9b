use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use ndarray::{Array1, Axis};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::TextImageEncoder;
use crate::preprocessing;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairScore
{
    pub image: PathBuf,
    pub prompt: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult
{
    pub pairs: Vec<PairScore>,
    pub mean: f64,
}

/// Scores text-image alignment with a dual encoder.
/// Embeddings are memoised per unique prompt and per unique image path for the
/// lifetime of the scorer, which is one evaluation run.
pub struct SimilarityScorer
{
    encoder: Arc<dyn TextImageEncoder>,
    batch_size: usize,
    text_cache: FxHashMap<String, Array1<f32>>,
    image_cache: FxHashMap<PathBuf, Array1<f32>>,
}

impl SimilarityScorer
{
    pub fn new(encoder: Arc<dyn TextImageEncoder>, batch_size: usize) -> Self
    {
        SimilarityScorer {
            encoder,
            batch_size: batch_size.max(1),
            text_cache: FxHashMap::default(),
            image_cache: FxHashMap::default(),
        }
    }

    fn cache_texts(&mut self, prompts: &[String]) -> Result<()>
    {
        let mut missing: Vec<&str> = prompts.iter()
            .map(String::as_str)
            .filter(|p| !self.text_cache.contains_key(*p))
            .collect();
        missing.sort_unstable();
        missing.dedup();

        for chunk in missing.chunks(self.batch_size)
        {
            let embeddings = self.encoder.encode_texts(chunk)?;
            for (prompt, row) in chunk.iter().zip(embeddings.axis_iter(Axis(0)))
            {
                self.text_cache.insert(prompt.to_string(), row.to_owned());
            }
        }
        Ok(())
    }

    fn cache_images(&mut self, images: &[PathBuf]) -> Result<()>
    {
        let mut missing: Vec<PathBuf> = images.iter()
            .filter(|p| !self.image_cache.contains_key(*p))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();

        let size = self.encoder.input_size();
        let normalization = self.encoder.normalization();
        for chunk in missing.chunks(self.batch_size)
        {
            let batch = preprocessing::prepare_batch(chunk, size, &normalization)?;
            let embeddings = self.encoder.encode_images(batch)?;
            for (path, row) in chunk.iter().zip(embeddings.axis_iter(Axis(0)))
            {
                self.image_cache.insert(path.clone(), row.to_owned());
            }
        }
        Ok(())
    }

    fn similarity(&self, image: &Path, prompt: &str) -> Option<f64>
    {
        let image = self.image_cache.get(image)?;
        let text = self.text_cache.get(prompt)?;
        Some((self.encoder.logit_scale() * image.dot(text)) as f64)
    }

    /// Scaled cosine similarity between one image and one prompt.
    pub fn score(&mut self, image: &Path, prompt: &str) -> Result<f64>
    {
        let result = self.score_pairs(&[image.to_path_buf()], &[prompt.to_string()])?;
        Ok(result.mean)
    }

    /// Pairs `images[i]` with `prompts[i]` and scores each pair.
    /// Extra entries on either side are left unscored.
    pub fn score_pairs(&mut self, images: &[PathBuf], prompts: &[String]) -> Result<SimilarityResult>
    {
        if images.len() != prompts.len() {
            warn!(
                "{} images but {} prompts; scoring the first {} pairs",
                images.len(),
                prompts.len(),
                images.len().min(prompts.len())
            );
        }
        let count = images.len().min(prompts.len());
        if count == 0 {
            return Err(Error::InsufficientSamples { needed: 1, found: 0 });
        }
        let (images, prompts) = (&images[..count], &prompts[..count]);

        self.cache_texts(prompts)?;
        self.cache_images(images)?;

        let mut pairs = Vec::with_capacity(count);
        for (image, prompt) in images.iter().zip(prompts.iter())
        {
            let similarity = self.similarity(image, prompt).ok_or_else(|| Error::InvalidParameter {
                name: "similarity",
                reason: format!("missing embedding for {:?} / {:?}", image, prompt),
            })?;
            debug!("{:?}: {:.4}", image, similarity);
            pairs.push(PairScore { image: image.clone(), prompt: prompt.clone(), similarity });
        }

        let mean = pairs.iter().map(|p| p.similarity).sum::<f64>() / pairs.len() as f64;
        Ok(SimilarityResult { pairs, mean })
    }
}
