use log::{debug, warn};

use crate::error::{Error, Result};
use crate::linalg::{clamp_eigenvalues, sqrt_psd, symmetric_eigen, symmetrize};
use crate::statistics::GaussianStats;

/// Fréchet distance between two Gaussians:
/// `‖μa − μb‖² + Tr(Σa + Σb − 2 (Σa Σb)^½)`.
///
/// `Σa Σb` is not symmetric, so its square-root trace is taken from the
/// symmetric matrix `S Σb S` with `S = Σa^½`, which has the same spectrum.
/// Eigenvalues that are negative through rounding are clamped (and logged);
/// genuinely negative ones fail with `NumericalInstability`.
///
/// The result is 0 for identical statistics, symmetric in its arguments, and
/// unbounded above.
pub fn frechet_distance(a: &GaussianStats, b: &GaussianStats, tolerance: f64) -> Result<f64>
{
    if a.dims() != b.dims() {
        return Err(Error::DimensionMismatch { left: a.dims(), right: b.dims() });
    }

    let diff = &a.mean - &b.mean;
    let mean_term = diff.dot(&diff);

    let sqrt_a = sqrt_psd(a.covariance.view(), tolerance, "square root of the first covariance")?;
    let product = symmetrize(&sqrt_a.dot(&b.covariance).dot(&sqrt_a));
    let mut eigenvalues = symmetric_eigen(product.view())?.eigenvalues;
    clamp_eigenvalues(&mut eigenvalues, tolerance, "square root of the covariance product")?;
    let trace_sqrt_product: f64 = eigenvalues.iter().map(|x| x.sqrt()).sum();

    let trace_a = a.covariance.diag().sum();
    let trace_b = b.covariance.diag().sum();
    let distance = mean_term + trace_a + trace_b - 2.0 * trace_sqrt_product;
    debug!(
        "Fréchet distance terms: mean {:.6}, trace a {:.6}, trace b {:.6}, trace sqrt product {:.6}",
        mean_term, trace_a, trace_b, trace_sqrt_product
    );

    if !distance.is_finite() {
        return Err(Error::NumericalInstability {
            context: "Fréchet distance is not finite".to_string(),
            eigenvalues: eigenvalues.to_vec(),
        });
    }
    if distance < 0.0 {
        let bound = tolerance * (trace_a + trace_b).max(1.0);
        if -distance > bound {
            return Err(Error::NumericalInstability {
                context: format!("Fréchet distance {:e} is negative beyond tolerance {:e}", distance, bound),
                eigenvalues: eigenvalues.to_vec(),
            });
        }
        warn!("Clamped Fréchet distance {:e} to zero", distance);
        return Ok(0.0);
    }

    Ok(distance)
}
