use log::warn;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{Error, Result};
use crate::linalg::symmetrize;

/// A multivariate Gaussian fitted to a batch of feature vectors.
#[derive(Debug, Clone)]
pub struct GaussianStats
{
    pub mean: Array1<f64>,
    /// Unbiased (n - 1) sample covariance; always symmetric.
    pub covariance: Array2<f64>,
    pub samples: usize,
}

impl GaussianStats
{
    /// Fits the statistics to an (n, d) feature matrix, one row per image.
    ///
    /// Needs at least two rows. With fewer than `2 * d` rows the covariance is
    /// rank deficient: the distance can still be computed, but it is dominated by
    /// estimation noise and should not be compared across runs of different sizes.
    pub fn from_features(features: ArrayView2<f64>) -> Result<Self>
    {
        let (samples, dims) = features.dim();
        if samples < 2 {
            return Err(Error::InsufficientSamples { needed: 2, found: samples });
        }
        if let Some(((row, col), value)) = features.indexed_iter().find(|(_, x)| !x.is_finite()) {
            return Err(Error::NumericalInstability {
                context: format!("non-finite feature value at row {}, column {}", row, col),
                eigenvalues: vec![*value],
            });
        }
        if samples < 2 * dims {
            warn!(
                "Only {} samples for {} feature dimensions; the covariance is rank deficient and the distance unreliable",
                samples, dims
            );
        }

        let mean = features.mean_axis(Axis(0)).ok_or(Error::InsufficientSamples { needed: 2, found: 0 })?;
        let centered = &features - &mean.view().insert_axis(Axis(0));
        let covariance = centered.t().dot(&centered) / (samples as f64 - 1.0);

        Ok(GaussianStats { mean, covariance: symmetrize(&covariance), samples })
    }

    pub fn dims(&self) -> usize
    {
        self.mean.len()
    }
}
