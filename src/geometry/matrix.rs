//! Metric validation and Cholesky-derived bases.
//!
//! This module provides the linear-algebra helpers behind the tiling
//! transform: validating a parameter-space metric and deriving the
//! lower-triangular bases that map integer lattice indices to physical
//! coordinates.

use nalgebra::{Cholesky, DMatrix};
use thiserror::Error;

/// Relative tolerance for the metric symmetry check.
///
/// This value is chosen to tolerate metrics assembled from floating-point
/// expressions (e.g. spindown metrics with factorially scaled entries) while
/// still rejecting genuinely asymmetric input.
pub const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Error type for metric validation and basis derivation.
///
/// Maps onto the `InvalidMetricError` failure domain: all variants indicate
/// that the supplied metric cannot define a mismatch distance.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MetricError {
    /// Metric matrix is not square.
    #[error("metric is not square: {rows}x{cols}")]
    NotSquare {
        /// Number of rows of the supplied matrix.
        rows: usize,
        /// Number of columns of the supplied matrix.
        cols: usize,
    },

    /// Metric dimension does not match the tiling dimension.
    #[error("metric dimension {actual} does not match tiling dimension {expected}")]
    WrongDimension {
        /// The tiling's number of dimensions.
        expected: usize,
        /// The metric's dimension.
        actual: usize,
    },

    /// Metric contains a non-finite entry.
    #[error("metric entry ({row}, {col}) is not finite")]
    NonFinite {
        /// Row of the offending entry.
        row: usize,
        /// Column of the offending entry.
        col: usize,
    },

    /// Metric is not symmetric within [`SYMMETRY_TOLERANCE`].
    #[error("metric is not symmetric: |g[{row},{col}] - g[{col},{row}]| = {asymmetry:e}")]
    NotSymmetric {
        /// Row of the worst asymmetric pair.
        row: usize,
        /// Column of the worst asymmetric pair.
        col: usize,
        /// Absolute asymmetry of that pair.
        asymmetry: f64,
    },

    /// Metric is not positive definite (Cholesky factorization failed).
    #[error("metric is not positive definite")]
    NotPositiveDefinite,
}

/// Validate a parameter-space metric.
///
/// Checks that `metric` is a square matrix of dimension `n` with finite
/// entries, symmetric within [`SYMMETRY_TOLERANCE`] relative to its largest
/// entry, and positive definite.
///
/// # Errors
///
/// Returns the first applicable [`MetricError`].
pub fn check_metric(metric: &DMatrix<f64>, n: usize) -> Result<(), MetricError> {
    let (rows, cols) = metric.shape();
    if rows != cols {
        return Err(MetricError::NotSquare { rows, cols });
    }
    if rows != n {
        return Err(MetricError::WrongDimension {
            expected: n,
            actual: rows,
        });
    }
    for i in 0..n {
        for j in 0..n {
            if !metric[(i, j)].is_finite() {
                return Err(MetricError::NonFinite { row: i, col: j });
            }
        }
    }
    let scale = metric.amax().max(1.0);
    for i in 0..n {
        for j in (i + 1)..n {
            let asymmetry = (metric[(i, j)] - metric[(j, i)]).abs();
            if asymmetry > SYMMETRY_TOLERANCE * scale {
                return Err(MetricError::NotSymmetric {
                    row: i,
                    col: j,
                    asymmetry,
                });
            }
        }
    }
    // Positive definiteness via Cholesky; a zero-dimensional metric is
    // trivially definite.
    if n > 0 && Cholesky::new(metric.clone()).is_none() {
        return Err(MetricError::NotPositiveDefinite);
    }
    Ok(())
}

/// Compute the lower-triangular whitening basis `B` of a metric `G`.
///
/// `B` satisfies `Bᵀ G B = I`: columns of `B` are orthonormal with respect to
/// the metric, so the map `y ↦ B y` carries the Euclidean mismatch of the
/// whitened coordinates to the metric mismatch of physical coordinates. `B`
/// is the Cholesky factor of `G⁻¹`, which keeps the whole
/// integer-to-physical transform lower triangular.
///
/// # Errors
///
/// Returns [`MetricError::NotPositiveDefinite`] if either Cholesky
/// factorization fails.
pub fn whitening_basis(metric: &DMatrix<f64>) -> Result<DMatrix<f64>, MetricError> {
    let chol = Cholesky::new(metric.clone()).ok_or(MetricError::NotPositiveDefinite)?;
    let mut inverse = chol.inverse();
    // Symmetrize before refactorizing; the computed inverse can carry
    // round-off asymmetry large enough to upset Cholesky.
    let inverse_t = inverse.transpose();
    inverse = (inverse + inverse_t) * 0.5;
    let chol_inv = Cholesky::new(inverse).ok_or(MetricError::NotPositiveDefinite)?;
    Ok(chol_inv.l())
}

/// Compute a lower-triangular lattice generator with the given Gram matrix.
///
/// Any two generator matrices with equal Gram matrices generate congruent
/// lattices, so the Cholesky factor of the Gram matrix is a valid
/// lower-triangular generator with the same covering radius.
///
/// # Errors
///
/// Returns [`MetricError::NotPositiveDefinite`] if the Gram matrix is not
/// positive definite (a degenerate lattice family construction).
pub fn lower_generator_from_gram(gram: &DMatrix<f64>) -> Result<DMatrix<f64>, MetricError> {
    let chol = Cholesky::new(gram.clone()).ok_or(MetricError::NotPositiveDefinite)?;
    Ok(chol.l())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lehmer(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| {
            let (ii, jj) = ((i + 1) as f64, (j + 1) as f64);
            if jj >= ii { ii / jj } else { jj / ii }
        })
    }

    #[test]
    fn check_metric_accepts_lehmer() {
        for n in 1..=6 {
            assert_eq!(check_metric(&lehmer(n), n), Ok(()));
        }
    }

    #[test]
    fn check_metric_rejects_zero_matrix() {
        let zero = DMatrix::zeros(3, 3);
        assert_eq!(
            check_metric(&zero, 3),
            Err(MetricError::NotPositiveDefinite)
        );
    }

    #[test]
    fn check_metric_rejects_wrong_shape() {
        let m = DMatrix::zeros(2, 3);
        assert!(matches!(
            check_metric(&m, 2),
            Err(MetricError::NotSquare { rows: 2, cols: 3 })
        ));
        let m = DMatrix::identity(3, 3);
        assert!(matches!(
            check_metric(&m, 2),
            Err(MetricError::WrongDimension {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn check_metric_rejects_asymmetry_and_nan() {
        let mut m = DMatrix::identity(2, 2);
        m[(0, 1)] = 0.5;
        assert!(matches!(
            check_metric(&m, 2),
            Err(MetricError::NotSymmetric { .. })
        ));
        m[(1, 0)] = f64::NAN;
        assert!(matches!(
            check_metric(&m, 2),
            Err(MetricError::NonFinite { row: 1, col: 0 })
        ));
    }

    #[test]
    fn whitening_basis_orthonormalizes_metric() {
        for n in 1..=5 {
            let g = lehmer(n);
            let b = whitening_basis(&g).unwrap();
            let gram = b.transpose() * &g * &b;
            for i in 0..n {
                for j in 0..n {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert_relative_eq!(gram[(i, j)], expected, epsilon = 1e-9);
                }
                // Lower triangular by construction.
                for j in (i + 1)..n {
                    assert_relative_eq!(b[(i, j)], 0.0);
                }
            }
        }
    }

    #[test]
    fn generator_from_gram_reproduces_gram() {
        let n = 4;
        let gram = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0 - 1.0 / (n as f64 + 1.0)
            } else {
                -1.0 / (n as f64 + 1.0)
            }
        });
        let lg = lower_generator_from_gram(&gram).unwrap();
        let recovered = &lg * lg.transpose();
        for i in 0..n {
            for j in 0..n {
                assert_relative_eq!(recovered[(i, j)], gram[(i, j)], epsilon = 1e-12);
            }
        }
    }
}
