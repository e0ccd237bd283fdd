//! Depth-limited iteration over the points of a lattice tiling.
//!
//! The iterator walks the index trie in lexicographic order, maintaining one
//! stack frame per dimension up to the requested depth. Each frame caches the
//! pass range and the physical offset contributed by outer dimensions, so
//! advancing the innermost dimension costs a single multiply-add.

use nalgebra::DMatrix;
use smallvec::{smallvec, SmallVec};

use crate::core::tiling::LatticeTiling;
use crate::core::trie::Pass;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum IterState {
    NotStarted,
    InProgress,
    Exhausted,
}

/// Iterates the lattice points of a tiling over its first `depth` dimensions.
///
/// Produced by [`LatticeTiling::iterator`]; borrows the tiling, so it cannot
/// outlive it. Points are visited in lexicographic order of their lattice
/// indices; [`set_alternating`](Self::set_alternating) switches the traversal
/// to boustrophedon order, which visits the same point set with smaller
/// physical jumps between consecutive points.
#[derive(Debug)]
pub struct LatticeTilingIterator<'a> {
    tiling: &'a LatticeTiling,
    depth: usize,
    alternating: bool,
    state: IterState,
    /// Lexicographic flat index of the current point.
    flat: u64,
    /// Materialized pass per frame; placeholder at tail levels.
    passes: SmallVec<[Pass; 8]>,
    /// Cached index range per frame.
    ranges: SmallVec<[(i64, i64); 8]>,
    /// Current lattice index per frame.
    indices: SmallVec<[i64; 8]>,
    /// Traversal direction per frame; toggled on pass entry when alternating.
    reversed: SmallVec<[bool; 8]>,
    /// Physical offset contributed by outer dimensions, per frame.
    offsets: SmallVec<[f64; 8]>,
    /// Physical coordinates of the current point.
    phys: SmallVec<[f64; 8]>,
}

impl<'a> LatticeTilingIterator<'a> {
    pub(crate) fn new(tiling: &'a LatticeTiling, depth: usize) -> Self {
        Self {
            tiling,
            depth,
            alternating: false,
            state: IterState::NotStarted,
            flat: 0,
            passes: smallvec![Pass::placeholder(); depth],
            ranges: smallvec![(0, -1); depth],
            indices: smallvec![0; depth],
            reversed: smallvec![true; depth],
            offsets: smallvec![0.0; depth],
            phys: smallvec![0.0; depth],
        }
    }

    /// The tiling this iterator walks.
    #[must_use]
    pub fn tiling(&self) -> &'a LatticeTiling {
        self.tiling
    }

    /// Number of leading dimensions being iterated.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Total number of points this iterator will visit, from the tiling's
    /// per-dimension statistics.
    #[must_use]
    pub fn total_points(&self) -> u64 {
        self.tiling.statistics(self.depth - 1).total_points
    }

    /// Switch between lexicographic and boustrophedon traversal.
    ///
    /// Both orders visit exactly the same points; only the order differs.
    ///
    /// # Panics
    ///
    /// Panics if iteration has already started; call
    /// [`reset`](Self::reset) first to change the order of a used iterator.
    pub fn set_alternating(&mut self, alternating: bool) {
        assert!(
            self.state == IterState::NotStarted,
            "traversal order cannot change mid-iteration"
        );
        self.alternating = alternating;
    }

    /// Lexicographic flat index of the current point, or `None` before the
    /// first point and after exhaustion.
    ///
    /// Equals the number of successful [`next_point`](Self::next_point) calls
    /// minus one, in both traversal orders.
    #[must_use]
    pub fn current_index(&self) -> Option<u64> {
        match self.state {
            IterState::InProgress => Some(self.flat),
            IterState::NotStarted | IterState::Exhausted => None,
        }
    }

    /// Advance to the next point and return its physical coordinates, or
    /// `None` once every point has been visited.
    pub fn next_point(&mut self) -> Option<&[f64]> {
        match self.state {
            IterState::Exhausted => return None,
            IterState::NotStarted => {
                self.flat = 0;
                if !self.descend(0) {
                    self.state = IterState::Exhausted;
                    return None;
                }
                self.state = IterState::InProgress;
            }
            IterState::InProgress => {
                let resumed = match self.backtrack(self.depth) {
                    Some(level) => self.descend(level),
                    None => false,
                };
                if !resumed {
                    self.state = IterState::Exhausted;
                    return None;
                }
                self.flat += 1;
            }
        }
        Some(&self.phys[..self.depth])
    }

    /// Fill the columns of `out` with consecutive points and return how many
    /// were produced; fewer than `out.ncols()` only at exhaustion.
    ///
    /// # Panics
    ///
    /// Panics if `out.nrows()` differs from the iteration depth.
    pub fn next_batch(&mut self, out: &mut DMatrix<f64>) -> usize {
        assert_eq!(
            out.nrows(),
            self.depth,
            "batch rows must match iteration depth"
        );
        let mut produced = 0;
        while produced < out.ncols() {
            let depth = self.depth;
            match self.next_point() {
                Some(point) => {
                    for row in 0..depth {
                        out[(row, produced)] = point[row];
                    }
                    produced += 1;
                }
                None => break,
            }
        }
        produced
    }

    /// Rewind to the beginning; the next call to
    /// [`next_point`](Self::next_point) yields the first point again.
    pub fn reset(&mut self) {
        self.state = IterState::NotStarted;
        self.flat = 0;
        self.reversed.fill(true);
    }

    /// Enter the current pass at `level`: resolve its index range from the
    /// trie, cache the physical offset of outer dimensions, and pick the
    /// traversal direction.
    fn enter(&mut self, level: usize) -> (i64, i64) {
        let trie = self.tiling.trie();
        let range = if level < trie.uniform_from() {
            let pass = if level == 0 {
                self.tiling.root_pass()
            } else {
                *trie.child(&self.passes[level - 1], self.indices[level - 1])
            };
            self.passes[level] = pass;
            (pass.lo, pass.hi)
        } else {
            trie.tail_range(level)
        };
        self.ranges[level] = range;

        // Non-tiled levels follow their bound's value directly; their single
        // index 0 then lands on the offset itself.
        self.offsets[level] = if self.tiling.is_tiled(level) {
            let transform = self.tiling.transform();
            let mut offset = 0.0;
            for i in 0..level {
                #[expect(clippy::cast_precision_loss, reason = "indices are far below 2^53")]
                let int_i = self.indices[i] as f64;
                offset = transform[(level, i)].mul_add(int_i, offset);
            }
            offset
        } else {
            self.tiling.bounds()[level].range(&self.phys[..level]).0
        };
        self.reversed[level] = self.alternating && !self.reversed[level];
        range
    }

    fn set_index(&mut self, level: usize, index: i64) {
        self.indices[level] = index;
        #[expect(clippy::cast_precision_loss, reason = "indices are far below 2^53")]
        {
            self.phys[level] =
                (index as f64).mul_add(self.tiling.step_sizes()[level], self.offsets[level]);
        }
    }

    /// Enter passes from `level` inward until a full point is materialized.
    /// Empty passes are skipped by stepping the deepest steppable outer
    /// frame. Returns false when no point remains.
    fn descend(&mut self, mut level: usize) -> bool {
        while level < self.depth {
            let (lo, hi) = self.enter(level);
            if lo > hi {
                match self.backtrack(level) {
                    Some(next) => level = next,
                    None => return false,
                }
            } else {
                let start = if self.reversed[level] { hi } else { lo };
                self.set_index(level, start);
                level += 1;
            }
        }
        true
    }

    /// Step the deepest frame outside `level` that has indices left in its
    /// traversal direction, and return the level to re-enter from.
    fn backtrack(&mut self, level: usize) -> Option<usize> {
        for j in (0..level).rev() {
            let (lo, hi) = self.ranges[j];
            let index = self.indices[j];
            let stepped = if self.reversed[j] {
                (index > lo).then(|| index - 1)
            } else {
                (index < hi).then(|| index + 1)
            };
            if let Some(next) = stepped {
                self.set_index(j, next);
                return Some(j + 1);
            }
        }
        None
    }
}
