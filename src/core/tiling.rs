//! Lattice tiling construction and the built tiling.
//!
//! A [`LatticeTilingBuilder`] collects one bound per dimension, then
//! [`build`](LatticeTilingBuilder::build) validates the metric, derives the
//! lattice transform, materializes the index trie and computes per-dimension
//! statistics. The resulting [`LatticeTiling`] is immutable; iterators and
//! locators borrow it, so they can never outlive the tiling they walk.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::bounds::{sky_patch_grid, BoundError, BoundKind};
use crate::core::iterator::LatticeTilingIterator;
use crate::core::lattice::Lattice;
use crate::core::locator::LatticeTilingLocator;
use crate::core::trie::{IndexTrie, Pass, TrieError};
use crate::geometry::matrix::{check_metric, whitening_basis, MetricError};

/// Error type for tiling construction.
///
/// All variants are fatal to the construction attempt: no partially usable
/// tiling is ever returned.
#[derive(Debug, Error)]
pub enum TilingConstructionError {
    /// A bound was malformed or missing.
    #[error(transparent)]
    Bound(#[from] BoundError),

    /// The metric failed validation.
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// The maximum mismatch is not a positive finite number.
    #[error("maximum mismatch must be positive and finite, got {max_mismatch}")]
    InvalidMaxMismatch {
        /// The rejected mismatch value.
        max_mismatch: f64,
    },

    /// A dimension's step size degenerated to a non-positive value.
    #[error("degenerate lattice: step size {step:e} in dimension {dim}")]
    DegenerateStep {
        /// The degenerate dimension.
        dim: usize,
        /// The computed step size.
        step: f64,
    },

    /// The index trie could not be materialized within available memory.
    #[error("out of memory while materializing {passes} tiling passes")]
    ResourceExhausted {
        /// Number of passes materialized before the failure.
        passes: usize,
    },
}

impl From<TrieError> for TilingConstructionError {
    fn from(err: TrieError) -> Self {
        match err {
            TrieError::ResourceExhausted { passes } => Self::ResourceExhausted { passes },
        }
    }
}

/// Per-dimension aggregate statistics of a built tiling.
///
/// `total_points` counts the lattice points of the tiling restricted to the
/// first `dim + 1` dimensions; the pass statistics summarize the lengths of
/// the index ranges ("passes") at that dimension level.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct TilingStats {
    /// Number of points up to and including this dimension.
    pub total_points: u64,
    /// Shortest pass at this dimension (0 when an empty branch exists).
    pub min_points_pass: u64,
    /// Longest pass at this dimension.
    pub max_points_pass: u64,
    /// Mean pass length at this dimension.
    pub avg_points_pass: f64,
}

/// Collects bounds for a lattice tiling prior to construction.
#[derive(Debug)]
pub struct LatticeTilingBuilder {
    bounds: Vec<Option<BoundKind>>,
}

impl LatticeTilingBuilder {
    /// Create a builder for an `dimensions`-dimensional tiling.
    ///
    /// # Panics
    ///
    /// Panics if `dimensions` is zero.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        assert!(dimensions > 0, "a tiling needs at least one dimension");
        Self {
            bounds: vec![None; dimensions],
        }
    }

    /// Number of dimensions of the tiling under construction.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.bounds.len()
    }

    fn check_dim(&self, dim: usize) -> Result<(), BoundError> {
        if dim < self.bounds.len() {
            Ok(())
        } else {
            Err(BoundError::DimensionOutOfRange {
                dim,
                dimensions: self.bounds.len(),
            })
        }
    }

    fn check_outer(&self, dim: usize, referenced: usize) -> Result<(), BoundError> {
        if referenced < dim {
            Ok(())
        } else {
            Err(BoundError::NotOuterDimension { dim, referenced })
        }
    }

    /// Bound dimension `dim` by the constant closed interval `[lower, upper]`.
    ///
    /// A zero-width interval (`lower == upper`) is valid and pins the
    /// dimension to a single point.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::InvalidInterval`] if `lower > upper` or either
    /// limit is non-finite, and [`BoundError::DimensionOutOfRange`] for a bad
    /// dimension index.
    pub fn constant_bound(
        &mut self,
        dim: usize,
        lower: f64,
        upper: f64,
    ) -> Result<&mut Self, BoundError> {
        self.check_dim(dim)?;
        if !(lower.is_finite() && upper.is_finite()) || lower > upper {
            return Err(BoundError::InvalidInterval { dim, lower, upper });
        }
        self.bounds[dim] = Some(BoundKind::Constant { lower, upper });
        Ok(self)
    }

    /// Bound the first-spindown dimension `dim` by the age–braking-index
    /// family: `f1 ∈ [-f0/((n_min-1) age), -f0/((n_max-1) age)]`, reading the
    /// frequency `f0` from the outer dimension `freq_dim`.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::InvalidAgeBraking`] unless `age > 0` and
    /// `1 < min_braking <= max_braking`, and [`BoundError::NotOuterDimension`]
    /// if `freq_dim` is not outer to `dim`.
    pub fn age_braking_bound(
        &mut self,
        dim: usize,
        freq_dim: usize,
        age: f64,
        min_braking: f64,
        max_braking: f64,
    ) -> Result<&mut Self, BoundError> {
        self.check_dim(dim)?;
        self.check_outer(dim, freq_dim)?;
        if !(age > 0.0 && age.is_finite() && 1.0 < min_braking && min_braking <= max_braking) {
            return Err(BoundError::InvalidAgeBraking {
                age,
                min_braking,
                max_braking,
            });
        }
        self.bounds[dim] = Some(BoundKind::AgeBraking {
            freq_dim,
            age,
            braking: (min_braking, max_braking),
        });
        Ok(self)
    }

    /// Bound the second-spindown dimension `dim` by the braking-index
    /// relation `f2 ∈ [n_min f1²/f0, n_max f1²/f0]`.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::InvalidBraking`] for a bad braking-index range
    /// and [`BoundError::NotOuterDimension`] if either referenced dimension
    /// is not outer to `dim`.
    pub fn braking_bound(
        &mut self,
        dim: usize,
        freq_dim: usize,
        f1dot_dim: usize,
        min_braking: f64,
        max_braking: f64,
    ) -> Result<&mut Self, BoundError> {
        self.check_dim(dim)?;
        self.check_outer(dim, freq_dim)?;
        self.check_outer(dim, f1dot_dim)?;
        if !(1.0 < min_braking && min_braking <= max_braking) {
            return Err(BoundError::InvalidBraking {
                min_braking,
                max_braking,
            });
        }
        self.bounds[dim] = Some(BoundKind::Braking {
            freq_dim,
            f1dot_dim,
            braking: (min_braking, max_braking),
        });
        Ok(self)
    }

    /// Bound the sky dimensions `x_dim` and `y_dim` to one physical sky
    /// patch of `patch_count` near-equal patches of the reduced-sky unit
    /// disc.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::InvalidSkyPatch`] if `patch_count` is zero or
    /// `patch_index >= patch_count`, and [`BoundError::NotOuterDimension`]
    /// unless `x_dim < y_dim`.
    pub fn sky_patch_bounds(
        &mut self,
        x_dim: usize,
        y_dim: usize,
        patch_count: usize,
        patch_index: usize,
    ) -> Result<&mut Self, BoundError> {
        self.check_dim(x_dim)?;
        self.check_dim(y_dim)?;
        self.check_outer(y_dim, x_dim)?;
        if patch_count == 0 || patch_index >= patch_count {
            return Err(BoundError::InvalidSkyPatch {
                patch_count,
                patch_index,
            });
        }
        let (x_count, y_count) = sky_patch_grid(patch_count);
        self.bounds[x_dim] = Some(BoundKind::SkyPatchX {
            x_count,
            x_index: patch_index / y_count,
        });
        self.bounds[y_dim] = Some(BoundKind::SkyPatchY {
            x_dim,
            y_count,
            y_index: patch_index % y_count,
        });
        Ok(self)
    }

    /// Bound dimension `dim` by an arbitrary pure function of the outer
    /// physical coordinates.
    ///
    /// The function receives the coordinates of dimensions `0..dim` and
    /// returns the closed interval for `dim`; returning `upper < lower`
    /// yields an empty branch of the tiling, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::DimensionOutOfRange`] for a bad dimension index.
    pub fn custom_bound<F>(&mut self, dim: usize, bound: F) -> Result<&mut Self, BoundError>
    where
        F: Fn(&[f64]) -> (f64, f64) + Send + Sync + 'static,
    {
        self.check_dim(dim)?;
        self.bounds[dim] = Some(BoundKind::Custom(std::sync::Arc::new(bound)));
        Ok(self)
    }

    /// Validate the metric, derive the lattice transform and build the
    /// index trie, consuming the builder.
    ///
    /// The metric must be square of the builder's dimension, symmetric and
    /// positive definite; `max_mismatch` is the covering-radius budget in
    /// metric-mismatch units. Bounds are honored as exact closed intervals
    /// with no boundary padding: a constant bound `[0, 10]` at step size 1
    /// yields exactly the 11 points `0, 1, ..., 10`.
    ///
    /// # Errors
    ///
    /// Returns [`TilingConstructionError`] if any dimension lacks a bound,
    /// the metric is invalid, the mismatch budget is not positive, a step
    /// size degenerates, or the trie exhausts memory. Construction is
    /// all-or-nothing.
    pub fn build(
        self,
        lattice: Lattice,
        metric: &DMatrix<f64>,
        max_mismatch: f64,
    ) -> Result<LatticeTiling, TilingConstructionError> {
        let n = self.bounds.len();
        let mut bounds = Vec::with_capacity(n);
        for (dim, bound) in self.bounds.into_iter().enumerate() {
            bounds.push(bound.ok_or(BoundError::MissingBound { dim })?);
        }

        if !(max_mismatch.is_finite() && max_mismatch > 0.0) {
            return Err(TilingConstructionError::InvalidMaxMismatch { max_mismatch });
        }
        check_metric(metric, n)?;

        // Dimensions whose bound pins a single value are not tiled: they
        // follow the bound exactly instead of a lattice grid, and report a
        // step size of 0.
        let tiled: Vec<bool> = bounds.iter().map(BoundKind::is_tiled).collect();

        // Whitened lattice generator, scaled so the covering radius equals
        // the mismatch budget, then carried to physical coordinates. All
        // factors are lower triangular, so physical coordinate k depends
        // only on integer indices 0..=k.
        let basis = whitening_basis(metric)?;
        let generator = lattice.generator(n)?;
        let scale = max_mismatch.sqrt() / lattice.covering_radius(n);
        let mut transform = basis * generator * scale;

        // A generator column may be negated freely; fix diagonal signs so
        // every step size is positive.
        for k in 0..n {
            if transform[(k, k)] < 0.0 {
                for row in k..n {
                    transform[(row, k)] = -transform[(row, k)];
                }
            }
        }
        for dim in 0..n {
            let step = transform[(dim, dim)];
            if tiled[dim] && !(step.is_finite() && step > 0.0) {
                return Err(TilingConstructionError::DegenerateStep { dim, step });
            }
        }
        let steps: Vec<f64> = (0..n)
            .map(|k| if tiled[k] { transform[(k, k)] } else { 0.0 })
            .collect();

        let trie = IndexTrie::build(&bounds, &transform, &tiled)?;
        let stats = trie
            .level_stats()
            .iter()
            .map(|level| {
                #[expect(clippy::cast_precision_loss, reason = "statistics are approximate")]
                let avg_points_pass = if level.passes == 0 {
                    0.0
                } else {
                    level.points as f64 / level.passes as f64
                };
                TilingStats {
                    total_points: level.points,
                    min_points_pass: level.min_len,
                    max_points_pass: level.max_len,
                    avg_points_pass,
                }
            })
            .collect();

        Ok(LatticeTiling {
            bounds,
            tiled,
            lattice,
            max_mismatch,
            metric: metric.clone(),
            transform,
            steps,
            trie,
            stats,
        })
    }
}

/// A built lattice tiling: bounds, metric, lattice transform, index trie and
/// statistics. Immutable; shared freely across reader threads.
#[derive(Debug)]
pub struct LatticeTiling {
    bounds: Vec<BoundKind>,
    /// Whether each dimension carries a lattice grid; pinned dimensions do
    /// not.
    tiled: Vec<bool>,
    lattice: Lattice,
    max_mismatch: f64,
    metric: DMatrix<f64>,
    /// Lower-triangular map from integer lattice indices to physical
    /// coordinates.
    transform: DMatrix<f64>,
    steps: Vec<f64>,
    trie: IndexTrie,
    stats: Vec<TilingStats>,
}

impl LatticeTiling {
    /// Number of dimensions.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.steps.len()
    }

    /// The lattice family of this tiling.
    #[must_use]
    pub fn lattice(&self) -> Lattice {
        self.lattice
    }

    /// The maximum-mismatch budget the tiling was built with.
    #[must_use]
    pub fn max_mismatch(&self) -> f64 {
        self.max_mismatch
    }

    /// The parameter-space metric the tiling was built with.
    #[must_use]
    pub fn metric(&self) -> &DMatrix<f64> {
        &self.metric
    }

    /// The registered bound of each dimension.
    #[must_use]
    pub fn bounds(&self) -> &[BoundKind] {
        &self.bounds
    }

    /// Physical step size of each dimension, derived from the lattice basis;
    /// 0 for dimensions that are not tiled.
    #[must_use]
    pub fn step_sizes(&self) -> &[f64] {
        &self.steps
    }

    /// Whether dimension `dim` is tiled. A dimension whose bound collapses
    /// to a single value is not tiled: its coordinate follows the bound
    /// exactly rather than a lattice grid.
    ///
    /// # Panics
    ///
    /// Panics if `dim >= self.dimensions()`.
    #[must_use]
    pub fn is_tiled(&self, dim: usize) -> bool {
        self.tiled[dim]
    }

    /// Total number of lattice points in the full-dimensional tiling.
    #[must_use]
    pub fn total_points(&self) -> u64 {
        self.trie.total_points()
    }

    /// Statistics of dimension `dim`.
    ///
    /// # Panics
    ///
    /// Panics if `dim >= self.dimensions()`.
    #[must_use]
    pub fn statistics(&self, dim: usize) -> &TilingStats {
        &self.stats[dim]
    }

    /// Create an iterator over the first `depth` dimensions.
    ///
    /// # Panics
    ///
    /// Panics unless `1 <= depth <= self.dimensions()`.
    #[must_use]
    pub fn iterator(&self, depth: usize) -> LatticeTilingIterator<'_> {
        assert!(
            depth >= 1 && depth <= self.dimensions(),
            "iteration depth {depth} out of range 1..={}",
            self.dimensions()
        );
        LatticeTilingIterator::new(self, depth)
    }

    /// Create a nearest-point locator over this tiling.
    #[must_use]
    pub fn locator(&self) -> LatticeTilingLocator<'_> {
        LatticeTilingLocator::new(self)
    }

    pub(crate) fn trie(&self) -> &IndexTrie {
        &self.trie
    }

    /// The root pass of the index trie; empty placeholder when every level
    /// belongs to the uniform tail.
    pub(crate) fn root_pass(&self) -> Pass {
        self.trie.root().copied().unwrap_or_else(Pass::placeholder)
    }

    pub(crate) fn transform(&self) -> &DMatrix<f64> {
        &self.transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn build_rejects_missing_bound() {
        let mut builder = LatticeTilingBuilder::new(2);
        builder.constant_bound(0, 0.0, 1.0).unwrap();
        let err = builder
            .build(Lattice::Cubic, &DMatrix::identity(2, 2), 0.5)
            .unwrap_err();
        assert!(matches!(
            err,
            TilingConstructionError::Bound(BoundError::MissingBound { dim: 1 })
        ));
    }

    #[test]
    fn build_rejects_non_positive_definite_metric() {
        let mut builder = LatticeTilingBuilder::new(2);
        builder.constant_bound(0, 0.0, 1.0).unwrap();
        builder.constant_bound(1, 0.0, 1.0).unwrap();
        let err = builder
            .build(Lattice::Cubic, &DMatrix::zeros(2, 2), 0.5)
            .unwrap_err();
        assert!(matches!(
            err,
            TilingConstructionError::Metric(MetricError::NotPositiveDefinite)
        ));
    }

    #[test]
    fn build_rejects_bad_mismatch() {
        let mut builder = LatticeTilingBuilder::new(1);
        builder.constant_bound(0, 0.0, 1.0).unwrap();
        let err = builder
            .build(Lattice::Cubic, &DMatrix::identity(1, 1), 0.0)
            .unwrap_err();
        assert!(matches!(
            err,
            TilingConstructionError::InvalidMaxMismatch { .. }
        ));
    }

    #[test]
    fn cubic_identity_metric_has_expected_step() {
        // Z¹ with unit metric: covering radius 1/2, so step = 2√μ.
        let mut builder = LatticeTilingBuilder::new(1);
        builder.constant_bound(0, 0.0, 10.0).unwrap();
        let tiling = builder
            .build(Lattice::Cubic, &DMatrix::identity(1, 1), 0.25)
            .unwrap();
        assert_relative_eq!(tiling.step_sizes()[0], 1.0, epsilon = 1e-12);
        assert_eq!(tiling.total_points(), 11);
        let stats = tiling.statistics(0);
        assert_eq!(stats.total_points, 11);
        assert_eq!(stats.min_points_pass, 11);
        assert_eq!(stats.max_points_pass, 11);
        assert_relative_eq!(stats.avg_points_pass, 11.0);
    }

    #[test]
    fn zero_width_bound_pins_a_single_point() {
        let mut builder = LatticeTilingBuilder::new(2);
        builder.constant_bound(0, 5.0, 5.0).unwrap();
        builder.constant_bound(1, -1.0, -1.0).unwrap();
        let tiling = builder
            .build(Lattice::AnStar, &DMatrix::identity(2, 2), 0.3)
            .unwrap();
        assert_eq!(tiling.total_points(), 1);
        assert!(!tiling.is_tiled(0) && !tiling.is_tiled(1));
        assert_eq!(tiling.step_sizes(), &[0.0, 0.0][..]);
        let mut itr = tiling.iterator(2);
        assert_eq!(itr.next_point(), Some(&[5.0, -1.0][..]));
        assert!(itr.next_point().is_none());
    }

    #[test]
    fn builder_rejects_backwards_interval() {
        let mut builder = LatticeTilingBuilder::new(1);
        let err = builder.constant_bound(0, 1.0, 0.0).unwrap_err();
        assert!(matches!(err, BoundError::InvalidInterval { dim: 0, .. }));
    }

    #[test]
    fn sky_patch_assigns_both_dimensions() {
        let mut builder = LatticeTilingBuilder::new(3);
        builder.sky_patch_bounds(0, 1, 4, 2).unwrap();
        builder.constant_bound(2, 100.0, 100.0).unwrap();
        let tiling = builder
            .build(Lattice::AnStar, &DMatrix::identity(3, 3), 0.3)
            .unwrap();
        assert!(tiling.total_points() > 0);
    }
}
