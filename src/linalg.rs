//! Dense symmetric eigendecomposition and the guarded matrix square root
//! built on it. Only symmetric input is supported; callers symmetrize first.
//!
//! The matrix is reduced to tridiagonal form with Householder reflections,
//! then diagonalized with implicit-shift QL iterations. Both phases are O(n³).
//! Eigenvectors are accumulated as rows so every update walks contiguous
//! memory, and the reflections of the first phase are spread over rayon.

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::error::{Error, Result};

/// QL iterations allowed per eigenvalue; two or three is typical.
const MAX_ITERATIONS: usize = 60;

// Columns per rayon task when accumulating a reflection.
const COLUMN_CHUNK: usize = 64;

#[derive(Debug, Clone)]
pub struct SymmetricEigen
{
    /// Ascending.
    pub eigenvalues: Array1<f64>,
    /// Column `i` is the unit eigenvector of `eigenvalues[i]`.
    pub eigenvectors: Array2<f64>,
}

pub fn symmetric_eigen(matrix: ArrayView2<f64>) -> Result<SymmetricEigen>
{
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(Error::DimensionMismatch { left: matrix.nrows(), right: matrix.ncols() });
    }
    if matrix.iter().any(|x| !x.is_finite()) {
        return Err(Error::NumericalInstability {
            context: "eigendecomposition input contains non-finite values".to_string(),
            eigenvalues: Vec::new(),
        });
    }

    // Logical iteration order, so row-major whatever the layout of the view.
    let mut a: Vec<f64> = matrix.iter().copied().collect();
    let mut rows = vec![0.0; n * n];
    for i in 0..n
    {
        rows[i * n + i] = 1.0;
    }
    let mut off = vec![0.0; n];

    tridiagonalize(&mut a, &mut rows, &mut off, n);
    let mut diag: Vec<f64> = (0..n).map(|i| a[i * n + i]).collect();
    let iterations = tridiagonal_ql(&mut diag, &mut off, &mut rows, n)?;
    debug!("Eigendecomposition of {}x{} took {} QL iterations", n, n, iterations);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| diag[i].total_cmp(&diag[j]));
    let eigenvalues: Array1<f64> = order.iter().map(|&i| diag[i]).collect();
    let mut sorted = Vec::with_capacity(n * n);
    for &i in &order
    {
        sorted.extend_from_slice(&rows[i * n..(i + 1) * n]);
    }
    let eigenvectors = Array2::from_shape_vec((n, n), sorted)?.reversed_axes();

    Ok(SymmetricEigen { eigenvalues, eigenvectors })
}

/// Householder reduction of the row-major symmetric `a` to tridiagonal T.
///
/// On return the diagonal of `a` is the diagonal of T, `off[k]` is the entry
/// between rows `k` and `k + 1` (`off[n - 1]` is zero), and `q_t` holds Qᵀ
/// with A = Q T Qᵀ. Entries of `a` off the three central diagonals are left
/// stale.
fn tridiagonalize(a: &mut [f64], q_t: &mut [f64], off: &mut [f64], n: usize)
{
    let mut v_buf = vec![0.0; n];
    let mut p_buf = vec![0.0; n];
    let mut u = vec![0.0; n];

    for k in 0..n.saturating_sub(1)
    {
        let start = k + 1;
        let m = n - start;
        let v = &mut v_buf[..m];
        v.copy_from_slice(&a[k * n + start..(k + 1) * n]);

        let x0 = v[0];
        let tail: f64 = v[1..].iter().map(|x| x * x).sum();
        if tail == 0.0 {
            off[k] = x0;
            continue;
        }
        let norm = (x0 * x0 + tail).sqrt();
        let alpha = if x0 >= 0.0 { -norm } else { norm };
        off[k] = alpha;

        // H = I - beta v vᵀ maps the column below the diagonal onto alpha e₁.
        v[0] -= alpha;
        let beta = 2.0 / (v[0] * v[0] + tail);
        let v = &*v;

        // B <- H B H for the trailing block B, as B - v wᵀ - w vᵀ
        // with p = beta B v and w = p - (beta vᵀp / 2) v.
        let trailing = &mut a[start * n..];
        let p = &mut p_buf[..m];
        trailing.par_chunks(n).zip(p.par_iter_mut()).for_each(|(row, pi)| {
            *pi = beta * dot(&row[start..], v);
        });
        let half = 0.5 * beta * dot(v, p);
        p.iter_mut().zip(v).for_each(|(pi, vi)| *pi -= half * vi);
        let p = &*p;
        trailing.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
            let (vi, pi) = (v[i], p[i]);
            for ((x, vj), pj) in row[start..].iter_mut().zip(v).zip(p)
            {
                *x -= vi * pj + pi * vj;
            }
        });

        // Qᵀ <- H Qᵀ; only rows start.. change.
        let q_rows = &mut q_t[start * n..];
        {
            let q_rows = &*q_rows;
            u.par_chunks_mut(COLUMN_CHUNK).enumerate().for_each(|(chunk, u)| {
                let offset = chunk * COLUMN_CHUNK;
                u.iter_mut().for_each(|x| *x = 0.0);
                for (row, vi) in q_rows.chunks(n).zip(v)
                {
                    for (uj, x) in u.iter_mut().zip(&row[offset..]) {
                        *uj += vi * x;
                    }
                }
            });
        }
        let u = &u;
        q_rows.par_chunks_mut(n).zip(v.par_iter()).for_each(|(row, vi)| {
            let scale = beta * vi;
            for (x, uj) in row.iter_mut().zip(u) {
                *x -= scale * uj;
            }
        });
    }
}

/// Implicit-shift QL on the symmetric tridiagonal matrix (`diag`, `off`).
/// Every plane rotation is applied to two consecutive rows of `rows`, which
/// end up holding the eigenvectors. Returns the total number of iterations.
fn tridiagonal_ql(diag: &mut [f64], off: &mut [f64], rows: &mut [f64], n: usize) -> Result<usize>
{
    let mut total = 0;
    for l in 0..n
    {
        let mut iterations = 0;
        loop
        {
            // Find the first negligible off-diagonal entry at or after l.
            let mut m = l;
            while m + 1 < n {
                let scale = diag[m].abs() + diag[m + 1].abs();
                if off[m].abs() <= f64::EPSILON * scale {
                    break;
                }
                m += 1;
            }
            if m == l {
                break;
            }

            iterations += 1;
            if iterations > MAX_ITERATIONS {
                return Err(Error::NumericalInstability {
                    context: format!("QL iteration for eigenvalue {} did not converge after {} iterations", l, MAX_ITERATIONS),
                    eigenvalues: diag.to_vec(),
                });
            }

            // Wilkinson-style shift from the leading 2x2 block.
            let mut g = (diag[l + 1] - diag[l]) / (2.0 * off[l]);
            let mut r = g.hypot(1.0);
            g = diag[m] - diag[l] + off[l] / (g + r.copysign(g));
            let (mut s, mut c, mut p) = (1.0, 1.0, 0.0);
            let mut deflated = false;
            for i in (l..m).rev()
            {
                let f = s * off[i];
                let b = c * off[i];
                r = f.hypot(g);
                off[i + 1] = r;
                if r == 0.0 {
                    diag[i + 1] -= p;
                    off[m] = 0.0;
                    deflated = true;
                    break;
                }
                s = f / r;
                c = g / r;
                g = diag[i + 1] - p;
                r = (diag[i] - g) * s + 2.0 * c * b;
                p = s * r;
                diag[i + 1] = g + p;
                g = c * r - b;
                rotate_rows(rows, n, i, c, s);
            }
            if deflated {
                continue;
            }
            diag[l] -= p;
            off[l] = g;
            off[m] = 0.0;
        }
        total += iterations;
    }
    Ok(total)
}

// Rows i and i + 1 of `rows` <- the plane rotation (c, s).
fn rotate_rows(rows: &mut [f64], n: usize, i: usize, c: f64, s: f64)
{
    let (upper, lower) = rows[i * n..(i + 2) * n].split_at_mut(n);
    for (x, y) in upper.iter_mut().zip(lower.iter_mut())
    {
        let f = *y;
        *y = s * *x + c * f;
        *x = c * *x - s * f;
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64
{
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Clamps eigenvalues that are negative only through rounding error to zero.
///
/// An eigenvalue counts as rounding error when it lies within
/// `tolerance * max(1, largest magnitude)` below zero. Clamping is logged.
/// Anything more negative, or non-finite, is a genuine failure: the matrix is
/// not positive semi-definite and has no real square root.
pub fn clamp_eigenvalues(eigenvalues: &mut Array1<f64>, tolerance: f64, context: &str) -> Result<()>
{
    let scale = eigenvalues.iter().fold(1.0f64, |acc, x| acc.max(x.abs()));
    let bound = -tolerance * scale;

    let offending: Vec<f64> = eigenvalues.iter()
        .copied()
        .filter(|x| !x.is_finite() || *x < bound)
        .collect();
    if !offending.is_empty() {
        return Err(Error::NumericalInstability { context: context.to_string(), eigenvalues: offending });
    }

    let clamped: Vec<f64> = eigenvalues.iter().copied().filter(|x| *x < 0.0).collect();
    if !clamped.is_empty() {
        warn!(
            "{}: clamped {} slightly negative eigenvalue(s) to zero (most negative {:e}, bound {:e})",
            context,
            clamped.len(),
            clamped.iter().fold(0.0f64, |acc, x| acc.min(*x)),
            bound
        );
        eigenvalues.mapv_inplace(|x| x.max(0.0));
    }

    Ok(())
}

/// Square root of a symmetric positive semi-definite matrix: `V diag(sqrt λ) Vᵀ`.
pub fn sqrt_psd(matrix: ArrayView2<f64>, tolerance: f64, context: &str) -> Result<Array2<f64>>
{
    let SymmetricEigen { mut eigenvalues, eigenvectors } = symmetric_eigen(matrix)?;
    clamp_eigenvalues(&mut eigenvalues, tolerance, context)?;

    let roots = eigenvalues.mapv(f64::sqrt);
    let scaled = &eigenvectors * &roots.insert_axis(Axis(0));
    Ok(scaled.dot(&eigenvectors.t()))
}

/// `(m + mᵀ) / 2`, removing the asymmetry left by floating point products.
pub fn symmetrize(matrix: &Array2<f64>) -> Array2<f64>
{
    (matrix + &matrix.t()) * 0.5
}

#[cfg(test)]
mod tests
{
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn test_eigen_reconstructs_matrix()
    {
        let m = array![[4.0, 1.0, 0.5], [1.0, 3.0, -0.2], [0.5, -0.2, 2.0]];
        let SymmetricEigen { eigenvalues, eigenvectors } = symmetric_eigen(m.view()).unwrap();

        let scaled = &eigenvectors * &eigenvalues.clone().insert_axis(Axis(0));
        let rebuilt = scaled.dot(&eigenvectors.t());
        for (x, y) in rebuilt.iter().zip(m.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-10);
        }
        assert_abs_diff_eq!(eigenvalues.sum(), 9.0, epsilon = 1e-10);
    }

    #[test]
    fn test_eigen_of_diagonal_matrix()
    {
        let m = array![[2.0, 0.0], [0.0, 5.0]];
        let eigen = symmetric_eigen(m.view()).unwrap();
        assert_eq!(eigen.eigenvalues.to_vec(), vec![2.0, 5.0]);
    }

    #[test]
    fn test_eigen_of_second_difference_matrix()
    {
        // Tridiagonal (-1, 2, -1) has eigenvalues 2 - 2 cos(k pi / (n + 1)).
        let n = 50;
        let m = Array2::from_shape_fn((n, n), |(i, j)| match i.abs_diff(j) {
            0 => 2.0,
            1 => -1.0,
            _ => 0.0,
        });
        let eigen = symmetric_eigen(m.view()).unwrap();
        for (k, value) in eigen.eigenvalues.iter().enumerate() {
            let expected = 2.0 - 2.0 * ((k + 1) as f64 * std::f64::consts::PI / (n + 1) as f64).cos();
            assert_abs_diff_eq!(*value, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_eigen_of_dense_matrix()
    {
        let n = 120;
        let m = symmetrize(&Array2::from_shape_fn((n, n), |(i, j)| ((i * 7 + j * 13) % 17) as f64 / 17.0));
        let SymmetricEigen { eigenvalues, eigenvectors } = symmetric_eigen(m.view()).unwrap();

        for pair in eigenvalues.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        let gram = eigenvectors.t().dot(&eigenvectors);
        for ((i, j), x) in gram.indexed_iter() {
            assert_abs_diff_eq!(*x, if i == j { 1.0 } else { 0.0 }, epsilon = 1e-10);
        }
        let rebuilt = (&eigenvectors * &eigenvalues.insert_axis(Axis(0))).dot(&eigenvectors.t());
        for (x, y) in rebuilt.iter().zip(m.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_eigen_with_repeated_eigenvalues()
    {
        let m = Array2::<f64>::ones((5, 5));
        let eigen = symmetric_eigen(m.view()).unwrap();
        let expected = [0.0, 0.0, 0.0, 0.0, 5.0];
        for (value, expected) in eigen.eigenvalues.iter().zip(expected) {
            assert_abs_diff_eq!(*value, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_eigen_of_trivial_sizes()
    {
        let eigen = symmetric_eigen(array![[3.0]].view()).unwrap();
        assert_eq!(eigen.eigenvalues.to_vec(), vec![3.0]);
        assert_eq!(eigen.eigenvectors[[0, 0]], 1.0);

        let empty = Array2::<f64>::zeros((0, 0));
        assert!(symmetric_eigen(empty.view()).unwrap().eigenvalues.is_empty());
    }

    #[test]
    fn test_sqrt_psd_squares_back()
    {
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let root = sqrt_psd(m.view(), 1e-9, "test").unwrap();
        let squared = root.dot(&root);
        for (x, y) in squared.iter().zip(m.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_small_negative_eigenvalues_are_clamped()
    {
        let mut values = array![4.0, -1e-12, 0.0];
        clamp_eigenvalues(&mut values, 1e-6, "test").unwrap();
        assert_eq!(values.to_vec(), vec![4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_large_negative_eigenvalue_is_instability()
    {
        let m = array![[1.0, 0.0], [0.0, -0.5]];
        match sqrt_psd(m.view(), 1e-6, "indefinite") {
            Err(Error::NumericalInstability { context, eigenvalues }) => {
                assert_eq!(context, "indefinite");
                assert_eq!(eigenvalues, vec![-0.5]);
            }
            other => panic!("expected NumericalInstability, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_input_is_instability()
    {
        let m = array![[1.0, f64::NAN], [f64::NAN, 1.0]];
        assert!(matches!(symmetric_eigen(m.view()), Err(Error::NumericalInstability { .. })));
    }
}
