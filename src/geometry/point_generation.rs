//! Random parameter-space point generation.
//!
//! Draws points from the bounded region of a tiling, dimension by dimension
//! from the outside in, so parametric bounds see the outer coordinates they
//! depend on. An optional scale factor widens (or shrinks) every interval
//! about its midpoint, which is how injection studies produce points
//! deliberately outside the region. Randomness comes from a caller-owned
//! generator, so runs are reproducible by seeding.

use nalgebra::DMatrix;
use rand::Rng;

use crate::core::tiling::LatticeTiling;

/// Fill the columns of `out` with random points of the tiling's bounded
/// region.
///
/// Each coordinate is drawn uniformly from its bound interval, evaluated at
/// the outer coordinates already drawn for that column. `scale` rescales
/// every interval about its midpoint by `1 + 2 * scale`: zero samples the
/// region itself, positive values spill outside it, negative values
/// concentrate toward the middle. Intervals of empty branches are treated as
/// their degenerate midpoint.
///
/// # Panics
///
/// Panics if `out.nrows()` differs from the tiling dimension or `scale` is
/// not finite.
pub fn random_tiling_points<R: Rng + ?Sized>(
    tiling: &LatticeTiling,
    scale: f64,
    rng: &mut R,
    out: &mut DMatrix<f64>,
) {
    let n = tiling.dimensions();
    assert_eq!(out.nrows(), n, "point rows must match the tiling dimension");
    assert!(scale.is_finite(), "scale must be finite");

    let mut outer = vec![0.0f64; n];
    for col in 0..out.ncols() {
        for level in 0..n {
            let (lower, upper) = tiling.bounds()[level].range(&outer[..level]);
            let width = (upper - lower).max(0.0);
            let u: f64 = rng.random();
            let coord = width.mul_add(u.mul_add(2.0f64.mul_add(scale, 1.0), -scale), lower);
            outer[level] = coord;
            out[(level, col)] = coord;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lattice::Lattice;
    use crate::core::tiling::LatticeTilingBuilder;
    use nalgebra::DMatrix;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn triangle_tiling() -> LatticeTiling {
        let mut builder = LatticeTilingBuilder::new(2);
        builder.constant_bound(0, 0.0, 10.0).unwrap();
        builder.custom_bound(1, |outer| (0.0, outer[0])).unwrap();
        builder
            .build(Lattice::Cubic, &DMatrix::identity(2, 2), 0.5)
            .unwrap()
    }

    #[test]
    fn unscaled_points_stay_inside_the_region() {
        let tiling = triangle_tiling();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut points = DMatrix::zeros(2, 200);
        random_tiling_points(&tiling, 0.0, &mut rng, &mut points);
        for col in 0..points.ncols() {
            let (x, y) = (points[(0, col)], points[(1, col)]);
            assert!((0.0..=10.0).contains(&x));
            assert!(y >= 0.0 && y <= x);
        }
    }

    #[test]
    fn scaled_points_leave_the_region() {
        let tiling = triangle_tiling();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut points = DMatrix::zeros(2, 200);
        random_tiling_points(&tiling, 5.0, &mut rng, &mut points);
        let outside = (0..points.ncols())
            .filter(|&col| {
                let (x, y) = (points[(0, col)], points[(1, col)]);
                !(0.0..=10.0).contains(&x) || y < 0.0 || y > x
            })
            .count();
        assert!(outside > 100, "only {outside} of 200 points fell outside");
    }

    #[test]
    fn generation_is_reproducible_from_the_seed() {
        let tiling = triangle_tiling();
        let mut first = DMatrix::zeros(2, 16);
        let mut second = DMatrix::zeros(2, 16);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        random_tiling_points(&tiling, 0.0, &mut rng, &mut first);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        random_tiling_points(&tiling, 0.0, &mut rng, &mut second);
        assert_eq!(first, second);
    }
}
