/////////////////////////////////////////////////////////////////////////////////////////////
//
// Pairs cluster trees into near-field and far-field interaction lists using the theta criterion.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    cluster_tree::{Cluster, ClusterTree},
    utils,
};
use itertools::iproduct;
use std::fmt;

/// Errors raised while building or using cluster trees.
#[derive(Debug, Clone, PartialEq)]
pub enum BctError {
    /// The descriptor matrix does not have the expected number of columns.
    DescriptorWidth { expected: usize, found: usize },

    /// The hull matrix width is not a positive multiple of three.
    HullWidth { found: usize },

    /// The hull matrix does not have one row per primitive.
    HullRows { expected: usize, found: usize },

    /// The supplied ordering is not a permutation of the primitive indices.
    InvalidOrdering,

    /// A descriptor or hull row contains NaN or infinite values.
    NonFiniteDescriptor { row: usize },

    /// A primitive has a negative area.
    NegativeArea { row: usize },

    /// No primitives were supplied.
    NoPrimitives,

    /// The split threshold must be at least one primitive.
    InvalidSplitThreshold,

    /// Theta must lie strictly between zero and one.
    InvalidTheta { found: f64 },

    /// A vector does not have one row per primitive.
    VectorLength { expected: usize, found: usize },

    /// Operator products require a block tree paired with itself.
    AsymmetricOperator,
}

impl fmt::Display for BctError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BctError::DescriptorWidth { expected, found } => write!(
                f,
                "Descriptor matrix must have {} columns, found {}",
                expected, found
            ),
            BctError::HullWidth { found } => write!(
                f,
                "Hull matrix width must be a positive multiple of 3, found {}",
                found
            ),
            BctError::HullRows { expected, found } => write!(
                f,
                "Hull matrix must have {} rows (one per primitive), found {}",
                expected, found
            ),
            BctError::InvalidOrdering => {
                write!(f, "Ordering must be a permutation of the primitive indices")
            }
            BctError::NonFiniteDescriptor { row } => {
                write!(f, "Primitive at row {} contains non-finite values", row)
            }
            BctError::NegativeArea { row } => {
                write!(f, "Primitive at row {} has a negative area", row)
            }
            BctError::NoPrimitives => write!(f, "At least one primitive is required"),
            BctError::InvalidSplitThreshold => {
                write!(f, "Split threshold must be greater than zero")
            }
            BctError::InvalidTheta { found } => {
                write!(f, "Theta must lie in the open interval (0, 1), found {}", found)
            }
            BctError::VectorLength { expected, found } => write!(
                f,
                "Vector must have {} rows (one per primitive), found {}",
                expected, found
            ),
            BctError::AsymmetricOperator => write!(
                f,
                "Operator products are only defined for a block tree paired with itself"
            ),
        }
    }
}

impl std::error::Error for BctError {}

/// Returns true when two clusters are far enough apart to interact through their
/// aggregate descriptors.
///
/// The pair is admissible when the distance `d` between bounding box centres is
/// positive and `max(diam(a), diam(b)) <= theta * d`, with `diam` the bounding box
/// diagonal.
#[inline(always)]
pub fn is_admissible(a: &Cluster, b: &Cluster, theta: f64) -> bool {
    let distance = utils::norm(&utils::sub(
        &a.bounding_box.center(),
        &b.bounding_box.center(),
    ));
    if distance <= 0.0 {
        return false;
    }
    let diameter = a.bounding_box.diameter().max(b.bounding_box.diameter());
    diameter <= theta * distance
}

/// Pairing of a source cluster tree with a target cluster tree (or with itself).
///
/// Blocks are stored as `(source cluster, target cluster)` index pairs.
///
/// * `far_field`: admissible pairs that interact through aggregates.
/// * `near_field`: pairs of leaf clusters whose primitive pairs are summed exactly.
///
/// When the tree is paired with itself every unordered pair of distinct primitives
/// is covered exactly once: a diagonal leaf block `(c, c)` stands for the pairs
/// `p < q` inside `c`, and no block ever appears together with its transpose.
#[derive(Debug, Clone)]
pub struct BlockClusterTree {
    source: ClusterTree,
    target: Option<ClusterTree>,
    theta: f64,
    near_field: Vec<(usize, usize)>,
    far_field: Vec<(usize, usize)>,
    near_pair_count: usize,
}

impl BlockClusterTree {
    /// Pairs a cluster tree with itself.
    pub fn new(tree: ClusterTree, theta: f64) -> Result<Self, BctError> {
        Self::build(tree, None, theta)
    }

    /// Pairs two distinct cluster trees. Every ordered pair `(i, j)` with `i` in
    /// `source` and `j` in `target` is covered exactly once.
    pub fn new_pair(source: ClusterTree, target: ClusterTree, theta: f64) -> Result<Self, BctError> {
        Self::build(source, Some(target), theta)
    }

    fn build(
        source: ClusterTree,
        target: Option<ClusterTree>,
        theta: f64,
    ) -> Result<Self, BctError> {
        if !(theta > 0.0 && theta < 1.0) {
            return Err(BctError::InvalidTheta { found: theta });
        }

        let symmetric = target.is_none();
        let (near_field, far_field) = {
            let target_tree = target.as_ref().unwrap_or(&source);
            split_blocks(&source, target_tree, theta, symmetric)
        };

        let mut bct = Self {
            source,
            target,
            theta,
            near_field,
            far_field,
            near_pair_count: 0,
        };
        let near_pair_count: usize = bct
            .near_field
            .iter()
            .map(|&(a, b)| bct.block_cost(a, b))
            .sum();
        bct.near_pair_count = near_pair_count;

        log::debug!(
            "block cluster tree built: theta {}, {} near blocks ({} primitive pairs), {} far blocks",
            theta,
            bct.near_field.len(),
            bct.near_pair_count,
            bct.far_field.len()
        );

        Ok(bct)
    }

    /// True when the tree is paired with itself.
    #[inline(always)]
    pub fn is_symmetric(&self) -> bool {
        self.target.is_none()
    }

    #[inline(always)]
    pub fn theta(&self) -> f64 {
        self.theta
    }

    #[inline(always)]
    pub fn source_tree(&self) -> &ClusterTree {
        &self.source
    }

    /// The target tree, which is the source tree itself for a self pairing.
    #[inline(always)]
    pub fn target_tree(&self) -> &ClusterTree {
        self.target.as_ref().unwrap_or(&self.source)
    }

    #[inline(always)]
    pub fn near_field(&self) -> &[(usize, usize)] {
        &self.near_field
    }

    #[inline(always)]
    pub fn far_field(&self) -> &[(usize, usize)] {
        &self.far_field
    }

    /// Number of primitive pairs summed exactly.
    #[inline(always)]
    pub fn near_pair_count(&self) -> usize {
        self.near_pair_count
    }

    /// Total number of kernel evaluations: near primitive pairs plus far blocks.
    #[inline(always)]
    pub fn interaction_count(&self) -> usize {
        self.near_pair_count + self.far_field.len()
    }

    /// Number of primitive pairs covered by a near-field block.
    #[inline(always)]
    pub fn block_cost(&self, source: usize, target: usize) -> usize {
        let a = self.source.cluster(source).len();
        if self.is_symmetric() && source == target {
            a * a.saturating_sub(1) / 2
        } else {
            a * self.target_tree().cluster(target).len()
        }
    }

    /// Primitive pairs of one near-field block, as tree positions `(source, target)`.
    pub fn block_pairs(
        &self,
        source: usize,
        target: usize,
    ) -> impl Iterator<Item = (usize, usize)> + '_ {
        let a = self.source.cluster(source).range();
        let b = self.target_tree().cluster(target).range();
        let diagonal = self.is_symmetric() && source == target;

        a.flat_map(move |p| {
            let start = if diagonal { p + 1 } else { b.start };
            (start.max(b.start)..b.end).map(move |q| (p, q))
        })
    }

    /// Every primitive pair of the near field, as tree positions `(source, target)`.
    pub fn near_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.near_field
            .iter()
            .flat_map(move |&(a, b)| self.block_pairs(a, b))
    }
}

/// Classifies cluster pairs by depth-first traversal from the pair of roots.
fn split_blocks(
    source: &ClusterTree,
    target: &ClusterTree,
    theta: f64,
    symmetric: bool,
) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let mut near_field = Vec::new();
    let mut far_field = Vec::new();
    let mut stack = vec![(0usize, 0usize)];

    while let Some((a, b)) = stack.pop() {
        let ca = source.cluster(a);
        let cb = target.cluster(b);

        if symmetric && a == b {
            match ca.children {
                None => near_field.push((a, a)),
                Some([left, right]) => {
                    stack.push((left, left));
                    stack.push((right, right));
                    stack.push((left, right));
                }
            }
            continue;
        }

        if is_admissible(ca, cb, theta) {
            far_field.push((a, b));
            continue;
        }

        match (ca.children, cb.children) {
            (None, None) => near_field.push((a, b)),
            (Some(children), None) => stack.extend(children.iter().map(|&c| (c, b))),
            (None, Some(children)) => stack.extend(children.iter().map(|&c| (a, c))),
            (Some(ac), Some(bc)) => stack.extend(iproduct!(ac, bc)),
        }
    }

    (near_field, far_field)
}
