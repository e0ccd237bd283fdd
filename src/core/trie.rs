//! The tiling index trie.
//!
//! A compact, per-dimension representation of the bounded region intersected
//! with the lattice: for every combination of fixed outer-dimension lattice
//! indices, one [`Pass`] records the contiguous range of valid indices in the
//! next dimension. Passes live in a flat arena and reference their children
//! by index, so the whole structure is freed in one deallocation and can be
//! traversed without chasing heap pointers.
//!
//! Levels whose bound is constant and whose transform row is diagonal admit
//! no branching; the trie stops materializing passes at the first such
//! suffix (the "uniform tail") and stores a single index range per tail
//! level instead. Memory therefore scales with the branching structure, not
//! the point count.

use nalgebra::DMatrix;
use thiserror::Error;

use crate::core::bounds::{in_interval, BoundKind};

/// Sentinel child index for leaf and empty passes.
const NO_CHILD: u32 = u32::MAX;

/// One pass: the valid lattice-index range at some dimension level, given
/// the path of indices fixed in outer dimensions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Pass {
    /// Lowest valid lattice index.
    pub lo: i64,
    /// Highest valid lattice index; `hi < lo` marks an empty pass.
    pub hi: i64,
    /// Arena index of the child pass for lattice index `lo`; children for
    /// subsequent indices are contiguous. `NO_CHILD` for leaves and empties.
    first_child: u32,
    /// Number of points at this pass's own depth that precede it in
    /// lexicographic iteration order.
    pub seq_offset: u64,
    /// Number of full-depth lattice points under this pass.
    pub subtree_points: u64,
}

impl Pass {
    /// An empty pass, usable as an initializer for traversal state.
    pub fn placeholder() -> Self {
        Self {
            lo: 0,
            hi: -1,
            first_child: NO_CHILD,
            seq_offset: 0,
            subtree_points: 0,
        }
    }

    /// Number of lattice indices in this pass.
    #[expect(clippy::cast_sign_loss, reason = "guarded by the emptiness check")]
    pub fn len(&self) -> u64 {
        if self.hi < self.lo {
            0
        } else {
            (self.hi - self.lo + 1) as u64
        }
    }
}

/// Construction-time failure of the index trie.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub(crate) enum TrieError {
    /// The pass arena could not be grown.
    #[error("out of memory while materializing {passes} tiling passes")]
    ResourceExhausted {
        /// Number of passes materialized before the failure.
        passes: usize,
    },
}

/// Per-dimension aggregate counters, accumulated during construction.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LevelStats {
    /// Number of passes at this level.
    pub passes: u64,
    /// Total points over all passes at this level.
    pub points: u64,
    /// Shortest pass (0 if an empty pass exists).
    pub min_len: u64,
    /// Longest pass.
    pub max_len: u64,
}

/// The built index trie. Immutable after construction.
#[derive(Clone, Debug)]
pub(crate) struct IndexTrie {
    arena: Vec<Pass>,
    /// First level of the uniform tail; levels below this are materialized.
    uniform_from: usize,
    /// Index ranges for tail levels `uniform_from..n`.
    tail: Vec<(i64, i64)>,
    stats: Vec<LevelStats>,
}

impl IndexTrie {
    /// Build the trie for the given bounds and lower-triangular
    /// integer-to-physical transform.
    ///
    /// `transform` must be `n`-square lower triangular with positive
    /// diagonal on tiled dimensions; `bounds` must hold one bound per
    /// dimension. Non-tiled dimensions (`tiled[k] == false`) contribute the
    /// single index 0, whose physical coordinate follows the bound's lower
    /// limit instead of the lattice.
    pub fn build(
        bounds: &[BoundKind],
        transform: &DMatrix<f64>,
        tiled: &[bool],
    ) -> Result<Self, TrieError> {
        let n = bounds.len();
        let uniform_from = uniform_suffix_start(bounds, transform, tiled);

        // Tail ranges are path-independent by construction of the suffix.
        let mut tail = Vec::with_capacity(n - uniform_from);
        for level in uniform_from..n {
            let (lower, upper) = bounds[level].range(&[]);
            tail.push(if tiled[level] {
                index_range(lower, upper, 0.0, transform[(level, level)])
            } else if !(lower.is_finite() && upper.is_finite()) || upper < lower {
                (0, -1)
            } else {
                (0, 0)
            });
        }
        let tail_block = tail
            .iter()
            .map(|&(lo, hi)| range_len(lo, hi))
            .fold(1u64, u64::saturating_mul);

        let mut builder = TrieBuilder {
            bounds,
            transform,
            tiled,
            uniform_from,
            tail_block,
            arena: Vec::new(),
            stats: vec![LevelStats::default(); n],
            level_counts: vec![0u64; n],
            ints: vec![0i64; n],
            phys: vec![0.0f64; n],
        };

        if uniform_from > 0 {
            builder.reserve(1)?;
            builder.arena.push(Pass {
                lo: 0,
                hi: -1,
                first_child: NO_CHILD,
                seq_offset: 0,
                subtree_points: 0,
            });
            builder.build_pass(0, 0)?;
        }

        let mut stats = builder.stats;
        // Tail levels: every pass has the same length, and passes at level j
        // are in one-to-one correspondence with points at level j - 1.
        let mut passes_above = if uniform_from == 0 {
            1
        } else {
            stats[uniform_from - 1].points
        };
        for (t, &(lo, hi)) in tail.iter().enumerate() {
            let level = uniform_from + t;
            let len = range_len(lo, hi);
            stats[level] = LevelStats {
                passes: passes_above,
                points: passes_above.saturating_mul(len),
                min_len: if passes_above > 0 { len } else { 0 },
                max_len: if passes_above > 0 { len } else { 0 },
            };
            passes_above = stats[level].points;
        }

        Ok(Self {
            arena: builder.arena,
            uniform_from,
            tail,
            stats,
        })
    }

    /// First level of the uniform tail.
    pub fn uniform_from(&self) -> usize {
        self.uniform_from
    }

    /// The root pass (level 0), if level 0 is materialized.
    pub fn root(&self) -> Option<&Pass> {
        self.arena.first()
    }

    /// The constant index range of a tail level.
    ///
    /// # Panics
    ///
    /// Panics if `level < self.uniform_from()`.
    pub fn tail_range(&self, level: usize) -> (i64, i64) {
        self.tail[level - self.uniform_from]
    }

    /// The child pass of `pass` for lattice index `index`.
    ///
    /// # Panics
    ///
    /// Panics if `pass` is a leaf or `index` is outside `pass`'s range.
    #[expect(clippy::cast_sign_loss, reason = "index is within the pass range")]
    pub fn child(&self, pass: &Pass, index: i64) -> &Pass {
        debug_assert!(pass.lo <= index && index <= pass.hi);
        debug_assert_ne!(pass.first_child, NO_CHILD);
        &self.arena[pass.first_child as usize + (index - pass.lo) as usize]
    }

    /// Whether `pass` has materialized children.
    pub fn has_children(&self, pass: &Pass) -> bool {
        pass.first_child != NO_CHILD
    }

    /// Per-level statistics accumulated during construction.
    pub fn level_stats(&self) -> &[LevelStats] {
        &self.stats
    }

    /// Full-depth point count of the whole tiling.
    pub fn total_points(&self) -> u64 {
        self.stats.last().map_or(0, |s| s.points)
    }
}

/// Smallest level `k` such that every bound at levels `k..n` is constant and
/// every tiled transform row at those levels is diagonal. Ranges at such
/// levels cannot depend on the path of outer indices. Non-tiled levels follow
/// their bound directly, so their transform row is irrelevant.
#[expect(clippy::float_cmp, reason = "only exactly-zero rows admit tail sharing")]
fn uniform_suffix_start(bounds: &[BoundKind], transform: &DMatrix<f64>, tiled: &[bool]) -> usize {
    let n = bounds.len();
    let mut k = n;
    while k > 0 {
        let j = k - 1;
        if !bounds[j].is_constant() {
            break;
        }
        if tiled[j] && (0..j).any(|i| transform[(j, i)] != 0.0) {
            break;
        }
        k = j;
    }
    k
}

/// Convert a physical interval to a conservative inclusive index range, then
/// trim boundary indices whose real coordinate falls outside the closed
/// interval. The trim uses the same [`in_interval`] tolerance as the
/// locator's snapping, keeping inclusion decisions consistent. A non-finite
/// limit marks the pass empty.
#[expect(clippy::cast_possible_truncation, reason = "saturating float-to-int cast")]
pub(crate) fn index_range(lower: f64, upper: f64, offset: f64, step: f64) -> (i64, i64) {
    if !(lower.is_finite() && upper.is_finite()) || upper < lower {
        return (0, -1);
    }
    let mut lo = ((lower - offset) / step).floor() as i64;
    let mut hi = ((upper - offset) / step).ceil() as i64;
    #[expect(clippy::cast_precision_loss, reason = "indices are far below 2^53")]
    let coord = |i: i64| (i as f64).mul_add(step, offset);
    while lo <= hi && !in_interval(coord(lo), lower, upper) {
        lo += 1;
    }
    while hi >= lo && !in_interval(coord(hi), lower, upper) {
        hi -= 1;
    }
    (lo, hi)
}

#[expect(clippy::cast_sign_loss, reason = "guarded by the emptiness check")]
fn range_len(lo: i64, hi: i64) -> u64 {
    if hi < lo {
        0
    } else {
        (hi - lo + 1) as u64
    }
}

struct TrieBuilder<'a> {
    bounds: &'a [BoundKind],
    transform: &'a DMatrix<f64>,
    tiled: &'a [bool],
    uniform_from: usize,
    /// Full-depth points under a single index at level `uniform_from - 1`.
    tail_block: u64,
    arena: Vec<Pass>,
    stats: Vec<LevelStats>,
    /// Running lexicographic point counters per level.
    level_counts: Vec<u64>,
    /// Scratch: the path of integer indices and physical coordinates.
    ints: Vec<i64>,
    phys: Vec<f64>,
}

impl TrieBuilder<'_> {
    fn reserve(&mut self, additional: usize) -> Result<(), TrieError> {
        if self.arena.len() + additional >= NO_CHILD as usize {
            return Err(TrieError::ResourceExhausted {
                passes: self.arena.len(),
            });
        }
        self.arena
            .try_reserve(additional)
            .map_err(|_| TrieError::ResourceExhausted {
                passes: self.arena.len(),
            })
    }

    /// Fill in the pass at arena `slot` for dimension `level`, recursing into
    /// its children. The outer path is in `self.ints` / `self.phys`.
    fn build_pass(&mut self, slot: usize, level: usize) -> Result<(), TrieError> {
        let (lower, upper) = self.bounds[level].range(&self.phys[..level]);
        let mut offset = 0.0;
        for i in 0..level {
            #[expect(clippy::cast_precision_loss, reason = "indices are far below 2^53")]
            let int_i = self.ints[i] as f64;
            offset = self.transform[(level, i)].mul_add(int_i, offset);
        }
        let step = self.transform[(level, level)];
        let tiled = self.tiled[level];
        let (lo, hi) = if tiled {
            index_range(lower, upper, offset, step)
        } else if !(lower.is_finite() && upper.is_finite()) || upper < lower {
            (0, -1)
        } else {
            (0, 0)
        };

        self.arena[slot].lo = lo;
        self.arena[slot].hi = hi;
        let len = self.arena[slot].len();
        self.arena[slot].seq_offset = self.level_counts[level];
        self.level_counts[level] = self.level_counts[level].saturating_add(len);

        let stat = &mut self.stats[level];
        stat.min_len = if stat.passes == 0 {
            len
        } else {
            stat.min_len.min(len)
        };
        stat.max_len = stat.max_len.max(len);
        stat.passes += 1;
        stat.points = stat.points.saturating_add(len);

        if len == 0 {
            return Ok(());
        }

        if level + 1 >= self.uniform_from {
            // Deepest materialized level: everything below is the uniform
            // tail, whose per-index point count is path-independent.
            self.arena[slot].subtree_points = len.saturating_mul(self.tail_block);
            return Ok(());
        }

        #[expect(clippy::cast_possible_truncation, reason = "arena size checked in reserve")]
        let first_child = {
            let first = self.arena.len();
            self.reserve(len as usize)?;
            for _ in 0..len {
                self.arena.push(Pass {
                    lo: 0,
                    hi: -1,
                    first_child: NO_CHILD,
                    seq_offset: 0,
                    subtree_points: 0,
                });
            }
            first as u32
        };
        self.arena[slot].first_child = first_child;

        let mut subtree_points = 0u64;
        for index in lo..=hi {
            self.ints[level] = index;
            #[expect(clippy::cast_precision_loss, reason = "indices are far below 2^53")]
            {
                self.phys[level] = if tiled {
                    (index as f64).mul_add(step, offset)
                } else {
                    lower
                };
            }
            #[expect(clippy::cast_sign_loss, reason = "index - lo is non-negative")]
            let child_slot = first_child as usize + (index - lo) as usize;
            self.build_pass(child_slot, level + 1)?;
            subtree_points = subtree_points.saturating_add(self.arena[child_slot].subtree_points);
        }
        self.arena[slot].subtree_points = subtree_points;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn identity(n: usize) -> DMatrix<f64> {
        DMatrix::identity(n, n)
    }

    #[test]
    fn constant_bound_collapses_to_tail() {
        let bounds = vec![BoundKind::Constant {
            lower: 0.0,
            upper: 10.0,
        }];
        let trie = IndexTrie::build(&bounds, &identity(1), &[true]).unwrap();
        assert_eq!(trie.uniform_from(), 0);
        assert!(trie.root().is_none());
        assert_eq!(trie.tail_range(0), (0, 10));
        assert_eq!(trie.total_points(), 11);
        let stats = trie.level_stats();
        assert_eq!(stats[0].passes, 1);
        assert_eq!(stats[0].min_len, 11);
        assert_eq!(stats[0].max_len, 11);
    }

    #[test]
    fn parametric_bound_materializes_triangle() {
        // dim1 in [0, dim0]: sum_{k=0}^{10} (k+1) = 66 points.
        let bounds = vec![
            BoundKind::Constant {
                lower: 0.0,
                upper: 10.0,
            },
            BoundKind::Custom(Arc::new(|outer: &[f64]| (0.0, outer[0]))),
        ];
        let trie = IndexTrie::build(&bounds, &identity(2), &[true, true]).unwrap();
        assert_eq!(trie.uniform_from(), 2);
        let root = trie.root().unwrap();
        assert_eq!((root.lo, root.hi), (0, 10));
        assert_eq!(root.subtree_points, 66);
        let stats = trie.level_stats();
        assert_eq!(stats[0].points, 11);
        assert_eq!(stats[1].points, 66);
        assert_eq!(stats[1].passes, 11);
        assert_eq!(stats[1].min_len, 1);
        assert_eq!(stats[1].max_len, 11);
        // Pass for dim0 index k holds k + 1 indices, offset by the triangle
        // number of preceding passes.
        for k in 0..=10 {
            let child = trie.child(root, k);
            assert_eq!((child.lo, child.hi), (0, k));
            assert_eq!(child.seq_offset, (k * (k + 1) / 2) as u64);
        }
    }

    #[test]
    fn empty_branch_is_valid_and_counts_zero() {
        // dim1 is empty whenever dim0 > 5.
        let bounds = vec![
            BoundKind::Constant {
                lower: 0.0,
                upper: 10.0,
            },
            BoundKind::Custom(Arc::new(|outer: &[f64]| {
                if outer[0] > 5.0 {
                    (1.0, 0.0)
                } else {
                    (0.0, 0.0)
                }
            })),
        ];
        let trie = IndexTrie::build(&bounds, &identity(2), &[true, true]).unwrap();
        let stats = trie.level_stats();
        assert_eq!(stats[0].points, 11);
        assert_eq!(stats[1].points, 6);
        assert_eq!(stats[1].min_len, 0);
        assert_eq!(stats[1].max_len, 1);
        assert_eq!(trie.total_points(), 6);
    }

    #[test]
    fn boundary_indices_are_included_not_duplicated() {
        // Interval [0, 1] at step 0.5: indices 0, 1, 2 exactly.
        let (lo, hi) = index_range(0.0, 1.0, 0.0, 0.5);
        assert_eq!((lo, hi), (0, 2));
        // Interval narrower than a step still captures the enclosed index.
        let (lo, hi) = index_range(0.9, 1.1, 0.0, 1.0);
        assert_eq!((lo, hi), (1, 1));
        // Interval enclosing no index is empty.
        let (lo, hi) = index_range(0.4, 0.6, 0.0, 1.0);
        assert!(hi < lo);
    }

    #[test]
    fn non_finite_intervals_are_empty() {
        let (lo, hi) = index_range(0.0, f64::INFINITY, 0.0, 1.0);
        assert!(hi < lo);
        let (lo, hi) = index_range(f64::NAN, 1.0, 0.0, 1.0);
        assert!(hi < lo);
        let (lo, hi) = index_range(f64::NEG_INFINITY, f64::INFINITY, 0.0, 1.0);
        assert!(hi < lo);
    }

    #[test]
    fn non_tiled_dimension_pins_the_bound_value() {
        // A pinned dimension contributes index 0 regardless of how its value
        // relates to the lattice grid.
        let bounds = vec![
            BoundKind::Constant {
                lower: 5.3,
                upper: 5.3,
            },
            BoundKind::Constant {
                lower: 0.0,
                upper: 2.0,
            },
        ];
        let trie = IndexTrie::build(&bounds, &identity(2), &[false, true]).unwrap();
        assert_eq!(trie.uniform_from(), 0);
        assert_eq!(trie.tail_range(0), (0, 0));
        assert_eq!(trie.tail_range(1), (0, 2));
        assert_eq!(trie.total_points(), 3);
    }

    #[test]
    fn off_diagonal_transform_defeats_tail_sharing() {
        let bounds = vec![
            BoundKind::Constant {
                lower: 0.0,
                upper: 2.0,
            },
            BoundKind::Constant {
                lower: 0.0,
                upper: 2.0,
            },
        ];
        let mut transform = identity(2);
        transform[(1, 0)] = 0.25;
        let trie = IndexTrie::build(&bounds, &transform, &[true, true]).unwrap();
        // Level 1 ranges depend on the level-0 index, so level 1 cannot join
        // the uniform tail; only level 0 remains tail-free here.
        assert_eq!(trie.uniform_from(), 2);
        let root = trie.root().unwrap();
        let shifted = trie.child(root, 2);
        // Offset 0.5 leaves indices 0..=1 inside [0, 2].
        assert_eq!((shifted.lo, shifted.hi), (0, 1));
    }
}
