//! Deterministic stand-ins for the pretrained networks, plus image fixtures.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgb, RgbImage};
use ndarray::{Array2, Array4, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::Result;
use crate::inception::softmax_rows;
use crate::models::{normalize_rows, Extraction, FeatureExtractor, TextImageEncoder};
use crate::preprocessing::Normalization;

pub const IDENTITY_NORMALIZATION: Normalization = Normalization { mean: [0.0; 3], std: [1.0; 3] };

pub fn write_solid_image(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf
{
    let path = dir.join(name);
    RgbImage::from_pixel(16, 16, Rgb(color)).save(&path).unwrap();
    path
}

/// Writes `count` 16x16 images whose pixels are `base` plus uniform noise in `0..=noise`.
pub fn write_noisy_batch(dir: &Path, count: usize, base: u8, noise: u8, seed: u64) -> Vec<PathBuf>
{
    std::fs::create_dir_all(dir).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let img = RgbImage::from_fn(16, 16, |_, _| {
                let mut channel = || base.saturating_add(rng.gen_range(0..=noise));
                Rgb([channel(), channel(), channel()])
            });
            let path = dir.join(format!("{:03}.png", i));
            img.save(&path).unwrap();
            path
        })
        .collect()
}

/// Per-channel mean and standard deviation as features; a softmax over the
/// channel means (plus a constant "background" logit) as class probabilities.
pub struct ColorStatsExtractor;

impl FeatureExtractor for ColorStatsExtractor
{
    fn input_size(&self) -> u32
    {
        16
    }

    fn normalization(&self) -> Normalization
    {
        IDENTITY_NORMALIZATION
    }

    fn feature_dims(&self) -> usize
    {
        6
    }

    fn num_classes(&self) -> usize
    {
        4
    }

    fn extract(&self, images: Array4<f32>) -> Result<Extraction>
    {
        let n = images.len_of(Axis(0));
        let mut features = Array2::zeros((n, 6));
        let mut logits = Array2::zeros((n, 4));
        for (i, image) in images.axis_iter(Axis(0)).enumerate()
        {
            for (c, channel) in image.axis_iter(Axis(0)).enumerate()
            {
                let mean = channel.mean().unwrap_or(0.0);
                features[[i, c]] = mean;
                features[[i, 3 + c]] = channel.std(0.0);
                logits[[i, c]] = 5.0 * mean;
            }
            logits[[i, 3]] = 1.0;
        }
        Ok(Extraction { features, probabilities: softmax_rows(&logits) })
    }
}

/// Embeds images by their mean colour and text by the colour words it contains.
#[derive(Default)]
pub struct ColorEncoder
{
    pub texts_encoded: AtomicUsize,
    pub images_encoded: AtomicUsize,
}

impl TextImageEncoder for ColorEncoder
{
    fn input_size(&self) -> u32
    {
        8
    }

    fn normalization(&self) -> Normalization
    {
        IDENTITY_NORMALIZATION
    }

    fn logit_scale(&self) -> f32
    {
        100.0
    }

    fn encode_images(&self, images: Array4<f32>) -> Result<Array2<f32>>
    {
        let n = images.len_of(Axis(0));
        self.images_encoded.fetch_add(n, Ordering::SeqCst);
        let mut embeddings = Array2::zeros((n, 3));
        for (i, image) in images.axis_iter(Axis(0)).enumerate()
        {
            for (c, channel) in image.axis_iter(Axis(0)).enumerate()
            {
                embeddings[[i, c]] = channel.mean().unwrap_or(0.0);
            }
        }
        normalize_rows(&mut embeddings);
        Ok(embeddings)
    }

    fn encode_texts(&self, texts: &[&str]) -> Result<Array2<f32>>
    {
        self.texts_encoded.fetch_add(texts.len(), Ordering::SeqCst);
        let mut embeddings = Array2::zeros((texts.len(), 3));
        for (i, text) in texts.iter().enumerate()
        {
            for word in text.split_whitespace()
            {
                match word.to_lowercase().as_str() {
                    "red" => embeddings[[i, 0]] += 1.0,
                    "green" => embeddings[[i, 1]] += 1.0,
                    "blue" => embeddings[[i, 2]] += 1.0,
                    _ => {}
                }
            }
        }
        normalize_rows(&mut embeddings);
        Ok(embeddings)
    }
}
