//! # lattice-tiling
//!
//! This is a library for covering bounded n-dimensional parameter spaces
//! with lattice template banks, as used in wide-parameter searches for
//! continuous gravitational-wave signals.
//!
//! A *tiling* places points of a scaled lattice (`Zⁿ` or the thinner `Aₙ*`
//! covering lattice) inside a bounded region, such that every location in
//! the region lies within a maximum *mismatch* `μ_max` of some template,
//! where mismatch is the quadratic distance `dxᵀ G dx` defined by a
//! parameter-space metric `G`.
//!
//! # Features
//!
//! - `Zⁿ` and `Aₙ*` lattice families over arbitrary positive-definite metrics
//! - Constant, parametric and user-defined bounds per dimension, including
//!   age–braking-index spindown ranges and sky patches
//! - A compact index trie whose memory scales with the branching structure
//!   of the region, not with the number of templates
//! - Depth-limited, optionally boustrophedon iteration with flat indexing
//! - Nearest-template queries with full positional bookkeeping
//! - Reproducible random point generation for injection studies
//!
//! # Basic Usage
//!
//! Tile the triangle `{ (x, y) : 0 <= y <= x <= 10 }` with a unit-step cubic
//! lattice, enumerate it, and snap an arbitrary point to its nearest
//! template:
//!
//! ```rust
//! use lattice_tiling::prelude::*;
//! use nalgebra::DMatrix;
//!
//! let mut builder = LatticeTilingBuilder::new(2);
//! builder.constant_bound(0, 0.0, 10.0).unwrap();
//! builder.custom_bound(1, |outer| (0.0, outer[0])).unwrap();
//!
//! // With the identity metric and μ_max = 1/2, the cubic step size is
//! // exactly 1 in two dimensions.
//! let tiling = builder
//!     .build(Lattice::Cubic, &DMatrix::identity(2, 2), 0.5)
//!     .unwrap();
//! assert_eq!(tiling.total_points(), 66);
//!
//! let mut count = 0;
//! let mut itr = tiling.iterator(2);
//! while itr.next_point().is_some() {
//!     count += 1;
//! }
//! assert_eq!(count, 66);
//!
//! let nearest = tiling.locator().nearest_point(&[3.4, 1.7]).unwrap();
//! assert_eq!(nearest.point[0], 3.0);
//! assert_eq!(nearest.point[1], 2.0);
//! ```
//!
//! # Tiling Invariants
//!
//! A successfully built [`LatticeTiling`](core::tiling::LatticeTiling)
//! guarantees:
//!
//! - **Covering** – every point of the region lying at least half a lattice
//!   step inside each bound is within `μ_max` of some template, in the
//!   metric distance. Bounds are honored exactly rather than padded, so a
//!   point hugging a boundary instead snaps to the nearest boundary
//!   template, which can be slightly farther.
//! - **Exact bounds** – bounds are closed intervals honored without padding;
//!   boundary templates are included using the shared tolerance
//!   [`BOUND_TOL`](core::bounds::BOUND_TOL).
//! - **Round trip** – locating a template previously produced by an
//!   iterator returns that exact template, with sequence indices matching
//!   the iterator's flat indices at every depth.
//! - **Order independence** – lexicographic and boustrophedon iteration
//!   visit exactly the same point set.
//! - **All-or-nothing construction** – a tiling that fails to build (invalid
//!   metric, missing bound, degenerate step, exhausted memory) returns an
//!   error and no partial state.
//!
//! Iterators and locators borrow the tiling they walk, so a tiling can never
//! be freed while a traversal of it is still live; sharing a tiling across
//! reader threads needs no locking because every query path is `&self`.

#![forbid(unsafe_code)]

/// Primary data structures and algorithms: bounds, lattices, tiling
/// construction, iteration and nearest-point location.
pub mod core {
    pub mod bounds;
    pub mod iterator;
    pub mod lattice;
    pub mod locator;
    pub mod tiling;
    pub(crate) mod trie;
    // Re-export the `core` modules.
    pub use bounds::*;
    pub use iterator::*;
    pub use lattice::*;
    pub use locator::*;
    pub use tiling::*;
}

/// Linear-algebra helpers and random point generation.
pub mod geometry {
    pub mod matrix;
    pub mod point_generation;
    pub use matrix::*;
    pub use point_generation::*;
}

/// A prelude module that re-exports the commonly used types.
pub mod prelude {
    pub use crate::core::{
        bounds::{BoundError, BoundFn, BoundKind, BOUND_TOL},
        iterator::LatticeTilingIterator,
        lattice::Lattice,
        locator::{LatticeTilingLocator, LocateError, NearestPoint},
        tiling::{LatticeTiling, LatticeTilingBuilder, TilingConstructionError, TilingStats},
    };
    pub use crate::geometry::{
        matrix::{check_metric, whitening_basis, MetricError},
        point_generation::random_tiling_points,
    };
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}
