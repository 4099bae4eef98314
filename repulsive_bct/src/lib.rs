/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API for the block cluster tree (BCT) crate.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Block Cluster Trees
//!
//! This crate builds the hierarchical acceleration structures used to evaluate
//! pairwise interactions between the discrete elements of a surface in near
//! O(n log n) time.
//!
//! Each primitive (typically a triangle) is described by its area, centroid and
//! unit normal. A [`ClusterTree`] recursively bisects the primitives and aggregates
//! these descriptors bottom-up. A [`BlockClusterTree`] pairs a cluster tree with
//! itself (or with a second tree) and splits the pairs of clusters into:
//!
//! - a **far field** of well separated cluster pairs, which interact through their
//!   aggregate descriptors, and
//! - a **near field** of leaf cluster pairs, whose primitive pairs are summed exactly.
//!
//! Separation is decided by the theta criterion: two clusters are admissible when
//! the larger of their bounding box diagonals is at most `theta` times the distance
//! between their bounding box centres. Smaller values of theta are more accurate and
//! slower.
//!
//! The crate is kernel independent. Kernels implementing [`PairKernel`] can be
//! applied as a non-local operator with [`hierarchical_multiply`].
//!
//! # Features:
//! - Midpoint bisection along the longest axis with a fallback for coincident geometry
//! - Symmetric self pairing that visits every unordered primitive pair exactly once
//! - Parallel near-field and far-field products balanced by interaction count
//! - Multiple right-hand sides
//!
//! # Example: Hierarchical operator product
//!
//! ```
//! use repulsive_bct::{
//!     hierarchical_multiply, BlockClusterTree, ClusterTree, Descriptor, PairKernel,
//!     PrimitiveData,
//! };
//! use faer::Mat;
//! use rand::{Rng, SeedableRng};
//! use rand::rngs::StdRng;
//!
//! // A kernel decaying with the inverse square distance between centroids
//! pub struct InverseSquare;
//!
//! impl PairKernel for InverseSquare {
//!     fn evaluate(&self, target: &Descriptor, source: &Descriptor) -> f64 {
//!         let mut r2 = 0.0;
//!         for k in 0..3 {
//!             let d = source.centroid[k] - target.centroid[k];
//!             r2 += d * d;
//!         }
//!         if r2 == 0.0 { 0.0 } else { 1.0 / r2 }
//!     }
//! }
//!
//! // Random unit-area primitives in a cube: [area, cx, cy, cz, nx, ny, nz]
//! let num_primitives = 5000;
//! let mut rng = StdRng::seed_from_u64(42);
//! let data = Mat::from_fn(num_primitives, 7, |_, j| match j {
//!     0 => 1.0,
//!     1..=3 => rng.random_range(-10.0..10.0),
//!     6 => 1.0,
//!     _ => 0.0,
//! });
//!
//! let primitives = PrimitiveData::new(data, None, None).unwrap();
//!
//! // Leaves hold at most 8 primitives
//! let tree = ClusterTree::new(&primitives, 8).unwrap();
//!
//! // Pair the tree with itself
//! let theta = 0.5;
//! let bct = BlockClusterTree::new(tree, theta).unwrap();
//!
//! println!(
//!     "{} near pairs, {} far blocks",
//!     bct.near_pair_count(),
//!     bct.far_field().len()
//! );
//!
//! let u = Mat::from_fn(num_primitives, 1, |i, _| (i % 7) as f64);
//! let lu = hierarchical_multiply(&bct, &InverseSquare, u.as_ref()).unwrap();
//! assert_eq!(lu.nrows(), num_primitives);
//! ```
//!
//! # References
//!
//! 1. Yu, C., Brakensiek, C., Schumacher, H., & Crane, K. (2021).
//!    *[Repulsive Surfaces.](https://arxiv.org/abs/2107.01664)*
//!    *ACM Transactions on Graphics*, **40**(6).
//!
//! 2. Hackbusch, W. (2015).
//!    *Hierarchical Matrices: Algorithms and Analysis.* Springer.

mod block_cluster_tree;
mod cluster_tree;
mod hierarchical;
mod primitives;
mod traits;
pub mod utils;

#[doc(inline)]
pub use {
    block_cluster_tree::{is_admissible, BctError, BlockClusterTree},
    cluster_tree::{Cluster, ClusterTree},
    hierarchical::hierarchical_multiply,
    primitives::{Descriptor, PrimitiveData, AMBIENT_DIM, DATA_DIM},
    traits::PairKernel,
};
