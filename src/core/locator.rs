//! Nearest-point queries against a lattice tiling.
//!
//! The locator maps an arbitrary physical point to the nearest lattice point
//! of the tiling, one dimension at a time. Because the integer-to-physical
//! transform is lower triangular, rounding dimension `k` after fixing
//! dimensions `0..k` is the nearest-plane step of Babai's algorithm; the
//! trie then clamps each rounded index into the bounded region and steers it
//! past empty branches, so the result is always a point of the tiling.

use nalgebra::DVector;
use smallvec::SmallVec;
use thiserror::Error;

use crate::core::tiling::LatticeTiling;
use crate::core::trie::Pass;

/// Error type for nearest-point queries.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum LocateError {
    /// The tiling contains no points, so no nearest point exists.
    #[error("the tiling contains no points")]
    EmptyTiling,

    /// The query point has the wrong number of coordinates.
    #[error("query point has {actual} coordinates, tiling has {expected} dimensions")]
    WrongDimension {
        /// The tiling's number of dimensions.
        expected: usize,
        /// The query point's number of coordinates.
        actual: usize,
    },
}

/// The nearest lattice point to a query, with its position in the tiling.
///
/// The bookkeeping fields all have one entry per dimension `k`:
/// `sequence_indices[k]` is the lexicographic flat index of the point among
/// all points of the tiling restricted to dimensions `0..=k`, and equals the
/// index a depth-`k + 1` [iterator](crate::core::iterator::LatticeTilingIterator)
/// would report at this point; `pass_indices[k]` is the point's position
/// within its pass and is always less than `pass_lengths[k]`.
#[derive(Clone, Debug, PartialEq)]
pub struct NearestPoint {
    /// Physical coordinates of the nearest lattice point.
    pub point: DVector<f64>,
    /// Integer lattice indices of the point.
    pub lattice_indices: Vec<i64>,
    /// Per-dimension lexicographic flat indices.
    pub sequence_indices: Vec<u64>,
    /// Per-dimension position within the containing pass.
    pub pass_indices: Vec<u64>,
    /// Per-dimension length of the containing pass.
    pub pass_lengths: Vec<u64>,
}

/// Locates nearest lattice points in a tiling.
///
/// Produced by [`LatticeTiling::locator`]; borrows the tiling. Queries
/// outside the bounded region are clamped onto it, so every query against a
/// non-empty tiling succeeds.
#[derive(Clone, Copy, Debug)]
pub struct LatticeTilingLocator<'a> {
    tiling: &'a LatticeTiling,
}

impl<'a> LatticeTilingLocator<'a> {
    pub(crate) fn new(tiling: &'a LatticeTiling) -> Self {
        Self { tiling }
    }

    /// The tiling this locator queries.
    #[must_use]
    pub fn tiling(&self) -> &'a LatticeTiling {
        self.tiling
    }

    /// Find the lattice point of the tiling nearest to `target`.
    ///
    /// Round-trip guarantee: querying a point previously produced by an
    /// iterator returns that exact point, with `sequence_indices` matching
    /// the iterator's flat indices at every depth.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::EmptyTiling`] if the tiling has no points and
    /// [`LocateError::WrongDimension`] for a query of the wrong dimension.
    pub fn nearest_point(&self, target: &[f64]) -> Result<NearestPoint, LocateError> {
        let n = self.tiling.dimensions();
        if target.len() != n {
            return Err(LocateError::WrongDimension {
                expected: n,
                actual: target.len(),
            });
        }
        if self.tiling.total_points() == 0 {
            return Err(LocateError::EmptyTiling);
        }

        let trie = self.tiling.trie();
        let transform = self.tiling.transform();

        let mut indices: SmallVec<[i64; 8]> = SmallVec::with_capacity(n);
        let mut point = DVector::zeros(n);
        let mut sequence_indices = Vec::with_capacity(n);
        let mut pass_indices = Vec::with_capacity(n);
        let mut pass_lengths = Vec::with_capacity(n);

        // The materialized pass containing the indices chosen so far. Points
        // exist under it by the emptiness check above and the steering below.
        let mut pass = self.tiling.root_pass();
        let mut seq = 0u64;

        for level in 0..n {
            let materialized = level < trie.uniform_from();
            let (lo, hi) = if materialized {
                (pass.lo, pass.hi)
            } else {
                trie.tail_range(level)
            };

            let (index, coord) = if self.tiling.is_tiled(level) {
                let mut offset = 0.0;
                for i in 0..level {
                    #[expect(clippy::cast_precision_loss, reason = "indices are far below 2^53")]
                    let int_i = indices[i] as f64;
                    offset = transform[(level, i)].mul_add(int_i, offset);
                }
                let step = transform[(level, level)];

                let scaled = (target[level] - offset) / step;
                #[expect(clippy::cast_possible_truncation, reason = "saturating float-to-int cast")]
                let rounded = scaled.round() as i64;
                let mut index = rounded.clamp(lo, hi);

                // Only branching levels can hide empty subtrees; steer the
                // index to the nearest one that holds points.
                if materialized && trie.has_children(&pass) {
                    index = nearest_occupied(trie, &pass, index, scaled);
                }
                #[expect(clippy::cast_precision_loss, reason = "indices are far below 2^53")]
                let coord = (index as f64).mul_add(step, offset);
                (index, coord)
            } else {
                // Pinned dimension: the single index 0, at the bound's value.
                let (lower, _) = self.tiling.bounds()[level].range(&point.as_slice()[..level]);
                (0, lower)
            };

            #[expect(clippy::cast_sign_loss, reason = "index is clamped to a non-empty range")]
            let pass_index = (index - lo) as u64;
            #[expect(clippy::cast_sign_loss, reason = "range is non-empty")]
            let pass_length = (hi - lo + 1) as u64;
            seq = if materialized {
                pass.seq_offset + pass_index
            } else {
                seq.saturating_mul(pass_length).saturating_add(pass_index)
            };

            indices.push(index);
            point[level] = coord;
            sequence_indices.push(seq);
            pass_indices.push(pass_index);
            pass_lengths.push(pass_length);

            if materialized && trie.has_children(&pass) {
                pass = *trie.child(&pass, index);
            }
        }

        Ok(NearestPoint {
            point,
            lattice_indices: indices.into_vec(),
            sequence_indices,
            pass_indices,
            pass_lengths,
        })
    }
}

/// The index within `pass` whose child subtree holds points, nearest to the
/// already-clamped candidate `index` as measured against the unrounded
/// coordinate `scaled`; the lower index wins exact ties.
fn nearest_occupied(
    trie: &crate::core::trie::IndexTrie,
    pass: &Pass,
    index: i64,
    scaled: f64,
) -> i64 {
    let occupied = |i: i64| trie.child(pass, i).subtree_points > 0;
    if occupied(index) {
        return index;
    }
    #[expect(clippy::cast_precision_loss, reason = "indices are far below 2^53")]
    let distance = |i: i64| (i as f64 - scaled).abs();
    let mut delta = 1i64;
    loop {
        let below = index - delta;
        let above = index + delta;
        let below_ok = below >= pass.lo && occupied(below);
        let above_ok = above <= pass.hi && occupied(above);
        match (below_ok, above_ok) {
            (true, true) => {
                return if distance(below) <= distance(above) {
                    below
                } else {
                    above
                };
            }
            (true, false) => return below,
            (false, true) => return above,
            (false, false) => {
                debug_assert!(
                    below >= pass.lo || above <= pass.hi,
                    "pass with points exhausted without finding them"
                );
                delta += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lattice::Lattice;
    use crate::core::tiling::LatticeTilingBuilder;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn triangle_tiling() -> LatticeTiling {
        let mut builder = LatticeTilingBuilder::new(2);
        builder.constant_bound(0, 0.0, 10.0).unwrap();
        builder.custom_bound(1, |outer| (0.0, outer[0])).unwrap();
        builder
            .build(Lattice::Cubic, &DMatrix::identity(2, 2), 0.5)
            .unwrap()
    }

    #[test]
    fn lattice_points_round_trip_exactly() {
        let tiling = triangle_tiling();
        let locator = tiling.locator();
        let mut itr = tiling.iterator(2);
        let mut flat = 0u64;
        while let Some(point) = itr.next_point() {
            let target = point.to_vec();
            let nearest = locator.nearest_point(&target).unwrap();
            assert_relative_eq!(nearest.point[0], target[0], epsilon = 1e-9);
            assert_relative_eq!(nearest.point[1], target[1], epsilon = 1e-9);
            assert_eq!(nearest.sequence_indices[1], flat);
            for dim in 0..2 {
                assert!(nearest.pass_indices[dim] < nearest.pass_lengths[dim]);
            }
            flat += 1;
        }
    }

    #[test]
    fn far_outside_queries_clamp_onto_the_tiling() {
        let tiling = triangle_tiling();
        let locator = tiling.locator();
        let nearest = locator.nearest_point(&[100.0, 50.0]).unwrap();
        assert_relative_eq!(nearest.point[0], 10.0, epsilon = 1e-9);
        assert_relative_eq!(nearest.point[1], 10.0, epsilon = 1e-9);
        let nearest = locator.nearest_point(&[-100.0, -50.0]).unwrap();
        assert_relative_eq!(nearest.point[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(nearest.point[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn steering_skips_empty_branches() {
        // dim1 is empty whenever dim0 > 5; a query deep in the empty region
        // must land on the nearest populated pass.
        let mut builder = LatticeTilingBuilder::new(2);
        builder.constant_bound(0, 0.0, 10.0).unwrap();
        builder
            .custom_bound(1, |outer| {
                if outer[0] > 5.0 {
                    (1.0, 0.0)
                } else {
                    (0.0, 0.0)
                }
            })
            .unwrap();
        let tiling = builder
            .build(Lattice::Cubic, &DMatrix::identity(2, 2), 0.5)
            .unwrap();
        let nearest = tiling.locator().nearest_point(&[10.0, 0.0]).unwrap();
        assert_relative_eq!(nearest.point[0], 5.0, epsilon = 1e-9);
        assert_relative_eq!(nearest.point[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn pinned_dimensions_follow_their_bound() {
        let mut builder = LatticeTilingBuilder::new(2);
        builder.constant_bound(0, 5.3, 5.3).unwrap();
        builder.constant_bound(1, 0.0, 4.0).unwrap();
        let tiling = builder
            .build(Lattice::Cubic, &DMatrix::identity(2, 2), 0.5)
            .unwrap();
        assert!(!tiling.is_tiled(0));
        assert_eq!(tiling.total_points(), 5);
        let nearest = tiling.locator().nearest_point(&[9.9, 2.2]).unwrap();
        assert_eq!(nearest.point[0], 5.3);
        assert_relative_eq!(nearest.point[1], 2.0, epsilon = 1e-9);
        assert_eq!(nearest.pass_indices[0], 0);
        assert_eq!(nearest.pass_lengths[0], 1);
    }

    #[test]
    fn empty_tiling_reports_no_nearest_point() {
        let mut builder = LatticeTilingBuilder::new(2);
        builder.constant_bound(0, 0.0, 10.0).unwrap();
        builder.custom_bound(1, |_| (1.0, 0.0)).unwrap();
        let tiling = builder
            .build(Lattice::Cubic, &DMatrix::identity(2, 2), 0.5)
            .unwrap();
        assert_eq!(tiling.total_points(), 0);
        assert_eq!(
            tiling.locator().nearest_point(&[0.0, 0.0]),
            Err(LocateError::EmptyTiling)
        );
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let tiling = triangle_tiling();
        assert_eq!(
            tiling.locator().nearest_point(&[0.0]),
            Err(LocateError::WrongDimension {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn sequence_indices_are_consistent_across_depths() {
        let tiling = triangle_tiling();
        let locator = tiling.locator();
        for depth in 1..=2 {
            let mut itr = tiling.iterator(depth);
            let mut flat = 0u64;
            while let Some(point) = itr.next_point() {
                let mut target = point.to_vec();
                target.resize(2, 0.0);
                let nearest = locator.nearest_point(&target).unwrap();
                assert_eq!(nearest.sequence_indices[depth - 1], flat);
                flat += 1;
            }
        }
    }
}
