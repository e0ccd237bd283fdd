//! Lattice families for template-bank tilings.
//!
//! A lattice family fixes the arrangement of template points in the whitened
//! (mismatch-orthonormal) coordinates. The cubic lattice `Zⁿ` is the trivial
//! choice; the `Aₙ*` family (Conway & Sloane) covers the same space with
//! fewer points for n > 1 and is the usual production choice.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::geometry::matrix::{lower_generator_from_gram, MetricError};

/// The lattice families supported by the tiling.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Lattice {
    /// Axis-aligned integer lattice `Zⁿ`.
    Cubic,
    /// `Aₙ*` dual root lattice, the thinnest known covering for n ≤ 23.
    AnStar,
}

impl Lattice {
    /// Covering radius of the unscaled lattice in `n` dimensions.
    ///
    /// The generator returned by [`Lattice::generator`] produces a lattice
    /// whose covering spheres have exactly this radius; the tiling scales the
    /// generator by `√μ_max / R` so that the covering radius equals the
    /// maximum-mismatch budget.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "dimension counts are small")]
    pub fn covering_radius(self, n: usize) -> f64 {
        let nf = n as f64;
        match self {
            Self::Cubic => 0.5 * nf.sqrt(),
            // Conway & Sloane, ch. 4: R² = n(n+2) / (12(n+1)).
            Self::AnStar => (nf * (nf + 2.0) / (12.0 * (nf + 1.0))).sqrt(),
        }
    }

    /// Gram matrix of the lattice generator in `n` dimensions.
    ///
    /// `Aₙ*` is generated by the vectors `wⱼ = eⱼ - 𝟙/(n+1)` in the
    /// zero-sum hyperplane of `Rⁿ⁺¹` (the glue-vector construction), whose
    /// Gram matrix is `I - J/(n+1)`.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "dimension counts are small")]
    pub fn gram(self, n: usize) -> DMatrix<f64> {
        match self {
            Self::Cubic => DMatrix::identity(n, n),
            Self::AnStar => {
                let off = -1.0 / (n as f64 + 1.0);
                DMatrix::from_fn(n, n, |i, j| if i == j { 1.0 + off } else { off })
            }
        }
    }

    /// Lower-triangular generator matrix of the unscaled lattice.
    ///
    /// Columns are lattice basis vectors; any orthogonal rotation of the
    /// family is acceptable for covering, so the generator is fixed to the
    /// unique lower-triangular representative with positive diagonal.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::NotPositiveDefinite`] if the Gram matrix cannot
    /// be factorized, which indicates a degenerate family construction.
    pub fn generator(self, n: usize) -> Result<DMatrix<f64>, MetricError> {
        match self {
            Self::Cubic => Ok(DMatrix::identity(n, n)),
            Self::AnStar => lower_generator_from_gram(&self.gram(n)),
        }
    }
}
