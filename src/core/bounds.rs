//! Parameter-space bound functions.
//!
//! Each tiling dimension carries one bound: either a constant interval or a
//! parametric function of the physical coordinates already fixed in outer
//! dimensions. Bounds are pure and are evaluated both while building the
//! index trie and while snapping nearest-point queries, always with the same
//! boundary tolerance [`BOUND_TOL`] so that the two agree on inclusion.
//!
//! The supported bound families form a closed sum type ([`BoundKind`]) with
//! an escape hatch for arbitrary user closures.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Shared relative tolerance for boundary-inclusion tests.
///
/// Bounds are closed intervals; a coordinate landing within this tolerance of
/// a limit (relative to the limit's magnitude) is included. Trie construction
/// and nearest-point snapping must use this same constant, otherwise a point
/// enumerated by the iterator could be rejected by the locator.
pub const BOUND_TOL: f64 = 1e-10;

/// Closed-interval membership test with the shared tolerance.
#[must_use]
pub(crate) fn in_interval(x: f64, lower: f64, upper: f64) -> bool {
    let tol = BOUND_TOL * lower.abs().max(upper.abs()).max(1.0);
    x >= lower - tol && x <= upper + tol
}

/// Signature of a user-defined bound function.
///
/// Receives the physical coordinates of all outer (already fixed) dimensions
/// and returns the closed interval `(lower, upper)` for its own dimension.
/// Returning `upper < lower` marks the branch empty, which is a valid
/// outcome, not an error.
pub type BoundFn = dyn Fn(&[f64]) -> (f64, f64) + Send + Sync;

/// Error type for bound registration.
///
/// All variants indicate malformed registration input (`InvalidBoundError`
/// failure domain); empty intervals produced at evaluation time are not
/// errors.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BoundError {
    /// Dimension index is outside the tiling.
    #[error("dimension {dim} is out of range for a {dimensions}-dimensional tiling")]
    DimensionOutOfRange {
        /// The offending dimension index.
        dim: usize,
        /// The tiling's number of dimensions.
        dimensions: usize,
    },

    /// Constant interval with `lower > upper` or non-finite limits.
    #[error("invalid interval [{lower}, {upper}] for dimension {dim}")]
    InvalidInterval {
        /// Dimension the interval was registered on.
        dim: usize,
        /// Lower limit.
        lower: f64,
        /// Upper limit.
        upper: f64,
    },

    /// A parametric bound referenced a dimension that is not outer to it.
    #[error("bound on dimension {dim} may only reference outer dimensions, got {referenced}")]
    NotOuterDimension {
        /// Dimension the bound was registered on.
        dim: usize,
        /// The referenced (non-outer) dimension.
        referenced: usize,
    },

    /// Age–braking-index parameters outside their physical domain.
    #[error("invalid age-braking parameters: age {age}, braking index range [{min_braking}, {max_braking}]")]
    InvalidAgeBraking {
        /// Characteristic age (must be positive).
        age: f64,
        /// Minimum braking index (must exceed 1).
        min_braking: f64,
        /// Maximum braking index (must be >= the minimum).
        max_braking: f64,
    },

    /// Braking-index range outside its physical domain.
    #[error("invalid braking index range [{min_braking}, {max_braking}]")]
    InvalidBraking {
        /// Minimum braking index (must exceed 1).
        min_braking: f64,
        /// Maximum braking index (must be >= the minimum).
        max_braking: f64,
    },

    /// Sky patch index outside the patch count, or zero patches.
    #[error("invalid sky patch {patch_index} of {patch_count}")]
    InvalidSkyPatch {
        /// Total number of patches.
        patch_count: usize,
        /// Requested patch index.
        patch_index: usize,
    },

    /// A dimension was left without a bound when the tiling was built.
    #[error("no bound registered for dimension {dim}")]
    MissingBound {
        /// The unbounded dimension.
        dim: usize,
    },
}

/// A bound on one tiling dimension.
///
/// Variants other than [`BoundKind::Custom`] are the built-in parametric
/// families; they carry their parameter payload and are dispatched by
/// pattern matching in [`BoundKind::range`].
#[derive(Clone)]
pub enum BoundKind {
    /// Fixed closed interval.
    Constant {
        /// Lower limit.
        lower: f64,
        /// Upper limit.
        upper: f64,
    },

    /// First-spindown bound of a spinning-down source of characteristic age
    /// `age` and braking index within `braking`:
    /// `f1 ∈ [-f0/((n_min - 1) age), -f0/((n_max - 1) age)]`,
    /// with `f0` read from dimension `freq_dim`.
    AgeBraking {
        /// Dimension carrying the frequency coordinate.
        freq_dim: usize,
        /// Characteristic age in the same time units as the metric.
        age: f64,
        /// Braking index range `(n_min, n_max)`, both above 1.
        braking: (f64, f64),
    },

    /// Second-spindown bound from the braking-index relation
    /// `f2 ∈ [n_min f1² / f0, n_max f1² / f0]`.
    Braking {
        /// Dimension carrying the frequency coordinate.
        freq_dim: usize,
        /// Dimension carrying the first-spindown coordinate.
        f1dot_dim: usize,
        /// Braking index range `(n_min, n_max)`.
        braking: (f64, f64),
    },

    /// Constant x-extent of a physical sky patch on the reduced-sky unit
    /// disc: strip `x_index` of `x_count` equal-width strips of `[-1, 1]`.
    SkyPatchX {
        /// Number of strips along x.
        x_count: usize,
        /// Strip index.
        x_index: usize,
    },

    /// Parametric y-extent of a physical sky patch: sub-interval `y_index` of
    /// `y_count` equal slices of `[-√(1-x²), +√(1-x²)]`, with `x` read from
    /// dimension `x_dim`.
    SkyPatchY {
        /// Dimension carrying the sky x coordinate.
        x_dim: usize,
        /// Number of slices along y.
        y_count: usize,
        /// Slice index.
        y_index: usize,
    },

    /// User-defined bound function of the outer physical coordinates.
    Custom(Arc<BoundFn>),
}

impl fmt::Debug for BoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { lower, upper } => f
                .debug_struct("Constant")
                .field("lower", lower)
                .field("upper", upper)
                .finish(),
            Self::AgeBraking {
                freq_dim,
                age,
                braking,
            } => f
                .debug_struct("AgeBraking")
                .field("freq_dim", freq_dim)
                .field("age", age)
                .field("braking", braking)
                .finish(),
            Self::Braking {
                freq_dim,
                f1dot_dim,
                braking,
            } => f
                .debug_struct("Braking")
                .field("freq_dim", freq_dim)
                .field("f1dot_dim", f1dot_dim)
                .field("braking", braking)
                .finish(),
            Self::SkyPatchX { x_count, x_index } => f
                .debug_struct("SkyPatchX")
                .field("x_count", x_count)
                .field("x_index", x_index)
                .finish(),
            Self::SkyPatchY {
                x_dim,
                y_count,
                y_index,
            } => f
                .debug_struct("SkyPatchY")
                .field("x_dim", x_dim)
                .field("y_count", y_count)
                .field("y_index", y_index)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl BoundKind {
    /// Evaluate the bound given the outer physical coordinates.
    ///
    /// Only entries of `outer` at indices strictly below this bound's own
    /// dimension are read. A returned interval with `upper < lower` denotes
    /// an empty branch.
    #[must_use]
    pub fn range(&self, outer: &[f64]) -> (f64, f64) {
        match self {
            Self::Constant { lower, upper } => (*lower, *upper),
            Self::AgeBraking {
                freq_dim,
                age,
                braking: (min_braking, max_braking),
            } => {
                let f0 = outer[*freq_dim];
                (
                    -f0 / ((min_braking - 1.0) * age),
                    -f0 / ((max_braking - 1.0) * age),
                )
            }
            Self::Braking {
                freq_dim,
                f1dot_dim,
                braking: (min_braking, max_braking),
            } => {
                let f0 = outer[*freq_dim];
                let f1 = outer[*f1dot_dim];
                let f2_per_index = f1 * f1 / f0;
                if f2_per_index >= 0.0 {
                    (min_braking * f2_per_index, max_braking * f2_per_index)
                } else {
                    (max_braking * f2_per_index, min_braking * f2_per_index)
                }
            }
            Self::SkyPatchX { x_count, x_index } => {
                let width = 2.0 / (*x_count as f64);
                let lower = (*x_index as f64).mul_add(width, -1.0);
                (lower, lower + width)
            }
            Self::SkyPatchY {
                x_dim,
                y_count,
                y_index,
            } => {
                let x = outer[*x_dim];
                let y_max = (1.0 - x * x).max(0.0).sqrt();
                let width = 2.0 * y_max / (*y_count as f64);
                let lower = (*y_index as f64).mul_add(width, -y_max);
                (lower, lower + width)
            }
            Self::Custom(f) => f(outer),
        }
    }

    /// Whether this bound's interval is independent of the outer coordinates.
    #[must_use]
    pub(crate) fn is_constant(&self) -> bool {
        matches!(self, Self::Constant { .. } | Self::SkyPatchX { .. })
    }

    /// Whether this bound tiles its dimension with lattice points, as
    /// opposed to pinning it to a single value per outer path.
    #[must_use]
    pub(crate) fn is_tiled(&self) -> bool {
        match self {
            Self::Constant { lower, upper } => lower < upper,
            Self::AgeBraking { braking, .. } | Self::Braking { braking, .. } => {
                braking.0 < braking.1
            }
            Self::SkyPatchX { .. } | Self::SkyPatchY { .. } | Self::Custom(_) => true,
        }
    }
}

/// Split `patch_count` sky patches into a near-square `(x_count, y_count)`
/// grid, `x_count * y_count == patch_count`.
#[must_use]
pub(crate) fn sky_patch_grid(patch_count: usize) -> (usize, usize) {
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss,
        reason = "patch counts are small"
    )]
    let mut x_count = (patch_count as f64).sqrt().floor() as usize;
    x_count = x_count.max(1);
    while patch_count % x_count != 0 {
        x_count -= 1;
    }
    (x_count, patch_count / x_count)
}
