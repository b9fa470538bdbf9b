use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InceptionScore
{
    /// Mean of the per-split scores.
    pub mean: f64,
    /// Population standard deviation of the per-split scores; 0 with one split.
    pub std: f64,
    pub split_scores: Vec<f64>,
}

impl InceptionScore
{
    pub fn splits(&self) -> usize
    {
        self.split_scores.len()
    }
}

/// Checks that every row is a probability distribution: finite, non-negative,
/// and summing to 1 within `tolerance`.
pub fn validate_distributions(probabilities: ArrayView2<f64>, tolerance: f64) -> Result<()>
{
    for (row, p) in probabilities.axis_iter(Axis(0)).enumerate()
    {
        if let Some(x) = p.iter().find(|x| !x.is_finite() || **x < 0.0) {
            return Err(Error::DegenerateDistribution { row, reason: format!("entry {} is negative or not finite", x) });
        }
        let sum = p.sum();
        if (sum - 1.0).abs() > tolerance {
            return Err(Error::DegenerateDistribution {
                row,
                reason: format!("sums to {} (tolerance {})", sum, tolerance),
            });
        }
    }
    Ok(())
}

/// `KL(p ‖ q)`, with `0 · log(0 / x)` taken as 0.
pub fn kl_divergence(p: ArrayView1<f64>, q: ArrayView1<f64>) -> f64
{
    p.iter()
        .zip(q.iter())
        .filter(|(pj, _)| **pj > 0.0)
        .map(|(pj, qj)| pj * (pj.ln() - qj.ln()))
        .sum()
}

/// exp(mean over images of KL(p(y|x) ‖ p(y))) for one group of rows.
fn split_score(part: ArrayView2<f64>) -> f64
{
    let marginal: Array1<f64> = part.sum_axis(Axis(0)) / part.nrows() as f64;
    let mean_kl = part.axis_iter(Axis(0))
        .map(|p| kl_divergence(p, marginal.view()))
        .sum::<f64>() / part.nrows() as f64;
    mean_kl.exp()
}

/// The inception score of an (n, k) matrix of class probabilities, one row per image.
///
/// Rows are divided into `splits` contiguous groups whose sizes differ by at
/// most one; each group is scored on its own and the scores are summarized by
/// mean and standard deviation. Higher means the classifier is both confident
/// on each image and spread across classes over the batch.
pub fn inception_score(probabilities: ArrayView2<f64>, splits: usize, tolerance: f64) -> Result<InceptionScore>
{
    let n = probabilities.nrows();
    if n == 0 {
        return Err(Error::InsufficientSamples { needed: 1, found: 0 });
    }
    if splits == 0 || splits > n {
        return Err(Error::InvalidParameter {
            name: "splits",
            reason: format!("must be between 1 and the number of images ({}), got {}", n, splits),
        });
    }
    validate_distributions(probabilities, tolerance)?;

    let split_scores: Vec<f64> = (0..splits)
        .map(|k| {
            let start = k * n / splits;
            let end = (k + 1) * n / splits;
            split_score(probabilities.slice_axis(Axis(0), (start..end).into()))
        })
        .collect();

    let mean = split_scores.iter().sum::<f64>() / splits as f64;
    let variance = split_scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / splits as f64;
    debug!("Inception score over {} images in {} splits: {:?}", n, splits, split_scores);

    Ok(InceptionScore { mean, std: variance.sqrt(), split_scores })
}

#[cfg(test)]
mod tests
{
    use approx::assert_abs_diff_eq;
    use ndarray::{array, s, Array2};

    use super::*;

    fn confident_batch() -> Array2<f64>
    {
        array![
            [0.90, 0.05, 0.05],
            [0.05, 0.90, 0.05],
            [0.10, 0.10, 0.80],
            [0.70, 0.20, 0.10],
        ]
    }

    #[test]
    fn test_identical_rows_score_exactly_one()
    {
        let probabilities = array![[0.2, 0.3, 0.5], [0.2, 0.3, 0.5], [0.2, 0.3, 0.5]];
        let score = inception_score(probabilities.view(), 1, 1e-3).unwrap();
        assert_abs_diff_eq!(score.mean, 1.0, epsilon = 1e-12);
        assert_eq!(score.std, 0.0);
    }

    #[test]
    fn test_one_hot_rows_score_number_of_classes()
    {
        // Perfectly confident and uniformly spread over k classes gives k.
        let probabilities = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let score = inception_score(probabilities.view(), 1, 1e-3).unwrap();
        assert_abs_diff_eq!(score.mean, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_permutation_invariant()
    {
        let probabilities = confident_batch();
        let permuted = probabilities.select(Axis(0), &[2, 0, 3, 1]);
        let a = inception_score(probabilities.view(), 1, 1e-3).unwrap();
        let b = inception_score(permuted.view(), 1, 1e-3).unwrap();
        assert_abs_diff_eq!(a.mean, b.mean, epsilon = 1e-12);
        assert!(a.mean > 1.0);
    }

    #[test]
    fn test_multiple_splits_report_spread()
    {
        let probabilities = confident_batch();
        let score = inception_score(probabilities.view(), 2, 1e-3).unwrap();
        assert_eq!(score.splits(), 2);

        let first = inception_score(probabilities.slice(s![0..2, ..]), 1, 1e-3).unwrap().mean;
        let second = inception_score(probabilities.slice(s![2..4, ..]), 1, 1e-3).unwrap().mean;
        assert_abs_diff_eq!(score.mean, (first + second) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(score.std, (first - second).abs() / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_uneven_splits_cover_every_row()
    {
        let probabilities = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0], [0.5, 0.5]];
        let score = inception_score(probabilities.view(), 2, 1e-3).unwrap();
        // Groups are rows 0..2 and 2..5.
        let second = inception_score(probabilities.slice(s![2..5, ..]), 1, 1e-3).unwrap().mean;
        assert_abs_diff_eq!(score.split_scores[1], second, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_entry_is_degenerate()
    {
        let probabilities = array![[0.5, 0.5], [1.1, -0.1]];
        match inception_score(probabilities.view(), 1, 1e-3) {
            Err(Error::DegenerateDistribution { row, .. }) => assert_eq!(row, 1),
            other => panic!("expected DegenerateDistribution, got {:?}", other),
        }
    }

    #[test]
    fn test_row_not_summing_to_one_is_degenerate()
    {
        let probabilities = array![[0.5, 0.5], [0.3, 0.3], [0.5, 0.5]];
        assert!(matches!(
            inception_score(probabilities.view(), 1, 1e-3),
            Err(Error::DegenerateDistribution { row: 1, .. })
        ));
        // Within tolerance is accepted.
        let probabilities = array![[0.5, 0.5005], [0.5, 0.5]];
        assert!(inception_score(probabilities.view(), 1, 1e-3).is_ok());
    }

    #[test]
    fn test_invalid_splits()
    {
        let probabilities = array![[0.5, 0.5], [0.5, 0.5]];
        assert!(matches!(
            inception_score(probabilities.view(), 3, 1e-3),
            Err(Error::InvalidParameter { name: "splits", .. })
        ));
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(matches!(inception_score(empty.view(), 1, 1e-3), Err(Error::InsufficientSamples { .. })));
    }
}
