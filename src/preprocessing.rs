//! Preprocessing of model inputs: images into normalized NCHW tensors,
//! and text into CLIP token arrays.
//! The image pipeline follows the torchvision transforms the pretrained
//! models were trained with: resize the shorter side, center-crop, scale to
//! [0, 1], then normalize each channel with the model's mean and std.

use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array2, Array4};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::{Error, Result};

pub const CONTEXT_LENGTH: usize = 77;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization
{
	pub mean: [f32; 3],
	pub std: [f32; 3],
}

pub const IMAGENET_NORMALIZATION: Normalization = Normalization {
	mean: [0.485, 0.456, 0.406],
	std: [0.229, 0.224, 0.225],
};

pub const CLIP_NORMALIZATION: Normalization = Normalization {
	mean: [0.48145466, 0.4578275, 0.40821073],
	std: [0.26862954, 0.26130258, 0.27577711],
};

pub fn load_image(path: &Path) -> Result<DynamicImage>
{
	let img = image::open(path).map_err(|e| Error::UnsupportedImageFormat {
		path: path.to_path_buf(),
		reason: e.to_string(),
	})?;

	let (width, height) = img.dimensions();
	if img.color().channel_count() == 0 || width == 0 || height == 0
	{
		return Err(Error::UnsupportedImageFormat {
			path: path.to_path_buf(),
			reason: format!("image has {} channels and size {}x{}", img.color().channel_count(), width, height),
		});
	}

	Ok(img)
}

pub fn load_image_batch(paths: &[PathBuf]) -> Vec<Result<DynamicImage>>
{
	// Load the images in parallel; output order matches the input order.
	paths.par_iter().map(|path| load_image(path)).collect()
}

/// Scales the shorter side to `size`, then crops the central `size` x `size` square.
pub fn resize_and_center_crop(img: &DynamicImage, size: u32) -> DynamicImage
{
	let (width, height) = img.dimensions();
	let (new_width, new_height) = if width < height {
		(size, scaled_side(height, size, width))
	} else {
		(scaled_side(width, size, height), size)
	};

	let resized = img.resize_exact(new_width, new_height, FilterType::CatmullRom);
	let x = (new_width - size) / 2;
	let y = (new_height - size) / 2;
	resized.crop_imm(x, y, size, size)
}

fn scaled_side(side: u32, target: u32, shorter: u32) -> u32
{
	let scaled = (side as f64 * target as f64 / shorter as f64).round() as u32;
	scaled.max(target)
}

/// Converts the images to a 4D (batch, channel, height, width) array.
/// Every image must already be `size` x `size`.
pub fn images_to_tensor(images: &[DynamicImage], size: u32, normalization: &Normalization) -> Array4<f32>
{
	let size = size as usize;
	let mut tensor = Array4::zeros((images.len(), 3, size, size));
	for (idx, img) in images.iter().enumerate()
	{
		let rgb = img.to_rgb8();
		for (x, y, pixel) in rgb.enumerate_pixels()
		{
			let (x, y) = (x as usize, y as usize);
			for channel in 0..3
			{
				let value = pixel.0[channel] as f32 / 255.;
				tensor[[idx, channel, y, x]] = (value - normalization.mean[channel]) / normalization.std[channel];
			}
		}
	}
	tensor
}

/// Loads, resizes and normalizes a batch of image files.
/// Fails on the first file that cannot be decoded.
pub fn prepare_batch(paths: &[PathBuf], size: u32, normalization: &Normalization) -> Result<Array4<f32>>
{
	let images = load_image_batch(paths).into_iter().collect::<Result<Vec<_>>>()?;

	let resized: Vec<DynamicImage> = images.par_iter()
		.map(|img| resize_and_center_crop(img, size))
		.collect();

	Ok(images_to_tensor(&resized, size, normalization))
}

pub fn tokenize_batch(texts: &[&str], tokenizer: &instant_clip_tokenizer::Tokenizer) -> Array2<i32>
{
	let tokens = tokenizer.tokenize_batch(texts.iter().copied(), CONTEXT_LENGTH);

	// Convert to i32 (for ONNX)
	tokens.mapv(|x| x as i32)
}
