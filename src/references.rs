//! Preparation of a reference image set for the Fréchet distance:
//! drawing a reproducible random sample from a larger pool (e.g. a COCO
//! validation split), and resizing a directory of images to one square size.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use log::{info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;

use crate::dataset;
use crate::error::{Error, Result};
use crate::preprocessing;

pub const DEFAULT_REFERENCE_COUNT: usize = 500;
pub const DEFAULT_REFERENCE_SIZE: u32 = 512;

/// Copies `count` images chosen at random (seeded) from `pool_dir` into `out_dir`.
/// Returns the paths of the copies, sorted.
pub fn sample_references(pool_dir: &Path, out_dir: &Path, count: usize, seed: u64) -> Result<Vec<PathBuf>>
{
    let pool = dataset::list_images(pool_dir)?;
    info!("Total images available: {}", pool.len());
    if pool.len() < count {
        return Err(Error::InsufficientSamples { needed: count, found: pool.len() });
    }

    std::fs::create_dir_all(out_dir)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut copied = Vec::with_capacity(count);
    for (i, source) in pool.choose_multiple(&mut rng, count).enumerate()
    {
        let file_name = source.file_name().ok_or_else(|| Error::InvalidParameter {
            name: "pool_dir",
            reason: format!("{:?} has no file name", source),
        })?;
        let destination = out_dir.join(file_name);
        std::fs::copy(source, &destination)?;
        copied.push(destination);
        if (i + 1) % 100 == 0 {
            info!("Copied {}/{} images...", i + 1, count);
        }
    }

    copied.sort();
    info!("Reference set ready at {:?}: {} images", out_dir, copied.len());
    Ok(copied)
}

/// Resizes every image in `in_dir` to exactly `size` x `size` and writes it under
/// the same file name in `out_dir`. Files that fail to load or save are logged and
/// skipped; returns the number written.
pub fn resize_references(in_dir: &Path, out_dir: &Path, size: u32) -> Result<usize>
{
    if size == 0 {
        return Err(Error::InvalidParameter { name: "size", reason: "must be at least 1".to_string() });
    }
    let images = dataset::list_images(in_dir)?;
    std::fs::create_dir_all(out_dir)?;
    info!("Resizing {} images to {}x{}", images.len(), size, size);

    let written = images.par_iter()
        .map(|path| -> Result<()> {
            let img = preprocessing::load_image(path)?;
            let resized = img.resize_exact(size, size, FilterType::Lanczos3);
            let file_name = path.file_name().ok_or_else(|| Error::InvalidParameter {
                name: "in_dir",
                reason: format!("{:?} has no file name", path),
            })?;
            resized.save(out_dir.join(file_name))?;
            Ok(())
        })
        .filter_map(|result| match result {
            Ok(()) => Some(()),
            Err(e) => {
                warn!("Skipping image: {}", e);
                None
            }
        })
        .count();

    info!("Resized {} images into {:?}", written, out_dir);
    Ok(written)
}

#[cfg(test)]
mod tests
{
    use image::GenericImageView;

    use super::*;
    use crate::test_support::write_noisy_batch;

    #[test]
    fn test_sampling_is_reproducible()
    {
        let dir = tempfile::tempdir().unwrap();
        let pool = dir.path().join("pool");
        write_noisy_batch(&pool, 10, 0, 20, 5);

        let first = sample_references(&pool, &dir.path().join("a"), 4, 42).unwrap();
        let second = sample_references(&pool, &dir.path().join("b"), 4, 42).unwrap();
        let names = |paths: &[PathBuf]| paths.iter().map(|p| p.file_name().unwrap().to_owned()).collect::<Vec<_>>();

        assert_eq!(first.len(), 4);
        assert_eq!(names(&first), names(&second));
        assert_eq!(dataset::list_images(&dir.path().join("a")).unwrap().len(), 4);
    }

    #[test]
    fn test_sampling_more_than_pool_fails()
    {
        let dir = tempfile::tempdir().unwrap();
        let pool = dir.path().join("pool");
        write_noisy_batch(&pool, 3, 0, 20, 5);
        assert!(matches!(
            sample_references(&pool, &dir.path().join("out"), 5, 0),
            Err(Error::InsufficientSamples { needed: 5, found: 3 })
        ));
    }

    #[test]
    fn test_resize_skips_broken_files()
    {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        write_noisy_batch(&input, 3, 0, 20, 9);
        std::fs::write(input.join("broken.jpg"), b"garbage").unwrap();

        let output = dir.path().join("out");
        let written = resize_references(&input, &output, 32).unwrap();
        assert_eq!(written, 3);

        let resized = image::open(output.join("000.png")).unwrap();
        assert_eq!(resized.dimensions(), (32, 32));
    }
}
