/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds a binary spatial cluster tree over primitives and aggregates cluster descriptors.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    block_cluster_tree::BctError,
    primitives::{Descriptor, PrimitiveData},
    utils::BoundingBox,
};
use faer::{Mat, MatRef};

/// A node of the cluster tree.
///
/// Every cluster owns the contiguous range `begin..end` of primitives in tree order.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub begin: usize,
    pub end: usize,

    /// Indices of the two children in `ClusterTree::clusters`, or `None` for a leaf.
    pub children: Option<[usize; 2]>,
    pub depth: usize,

    /// Bounding box of every hull point of every member primitive.
    pub bounding_box: BoundingBox,

    /// Aggregated area, area weighted centroid and area weighted mean normal.
    pub descriptor: Descriptor,
}

impl Cluster {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.end == self.begin
    }

    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline(always)]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.begin..self.end
    }
}

/// Recursive bisection of a set of primitives.
///
/// Clusters are split along the longest axis of the bounding box of their member
/// centroids, at the spatial midpoint of that axis. A cluster with at most
/// `split_threshold` primitives becomes a leaf. When the midpoint fails to separate
/// the centroids (coincident geometry) the index range is bisected instead.
///
/// Primitive descriptors are stored permuted into tree order so that each cluster
/// addresses a contiguous block of rows. Parents always precede their children in
/// `clusters`, and the root is cluster 0.
#[derive(Debug, Clone)]
pub struct ClusterTree {
    split_threshold: usize,
    ordering: Vec<usize>,
    inverse_ordering: Vec<usize>,
    clusters: Vec<Cluster>,
    leaves: Vec<usize>,
    primitives: Vec<Descriptor>,
    depth: usize,
}

impl ClusterTree {
    pub fn new(primitives: &PrimitiveData, split_threshold: usize) -> Result<Self, BctError> {
        if split_threshold == 0 {
            return Err(BctError::InvalidSplitThreshold);
        }
        if primitives.is_empty() {
            return Err(BctError::NoPrimitives);
        }

        let n = primitives.len();
        let mut ordering = primitives.ordering().to_vec();
        let centroids: Vec<[f64; 3]> = (0..n).map(|i| primitives.descriptor(i).centroid).collect();

        let mut clusters = vec![Cluster {
            begin: 0,
            end: n,
            children: None,
            depth: 0,
            bounding_box: BoundingBox::empty(),
            descriptor: Descriptor::default(),
        }];

        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let (begin, end, depth) = {
                let c = &clusters[index];
                (c.begin, c.end, c.depth)
            };

            if end - begin <= split_threshold {
                continue;
            }

            let split = partition(&mut ordering[begin..end], &centroids) + begin;

            let left = clusters.len();
            let right = left + 1;
            for (b, e) in [(begin, split), (split, end)] {
                clusters.push(Cluster {
                    begin: b,
                    end: e,
                    children: None,
                    depth: depth + 1,
                    bounding_box: BoundingBox::empty(),
                    descriptor: Descriptor::default(),
                });
            }
            clusters[index].children = Some([left, right]);

            stack.push(right);
            stack.push(left);
        }

        let mut inverse_ordering = vec![0; n];
        for (position, &original) in ordering.iter().enumerate() {
            inverse_ordering[original] = position;
        }

        let tree_primitives: Vec<Descriptor> =
            ordering.iter().map(|&i| primitives.descriptor(i)).collect();

        let leaves: Vec<usize> = clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_leaf())
            .map(|(i, _)| i)
            .collect();

        let depth = clusters.iter().map(|c| c.depth).max().unwrap_or(0);

        let mut tree = Self {
            split_threshold,
            ordering,
            inverse_ordering,
            clusters,
            leaves,
            primitives: tree_primitives,
            depth,
        };

        tree.aggregate(primitives);

        log::debug!(
            "cluster tree built: {} primitives, {} clusters, {} leaves, depth {}",
            n,
            tree.clusters.len(),
            tree.leaves.len(),
            tree.depth
        );

        Ok(tree)
    }

    /// Bottom-up pass computing aggregate descriptors and bounding boxes.
    fn aggregate(&mut self, primitives: &PrimitiveData) {
        let hull_points = primitives.hull_points();

        // Weighted sums of the centroid and normal, kept so parents add their
        // children exactly.
        let mut moments = vec![([0.0f64; 3], [0.0f64; 3]); self.clusters.len()];

        for index in (0..self.clusters.len()).rev() {
            let (area, bounding_box, weighted_centroid, weighted_normal) =
                match self.clusters[index].children {
                    None => {
                        let mut area = 0.0;
                        let mut bbox = BoundingBox::empty();
                        let mut wc = [0.0; 3];
                        let mut wn = [0.0; 3];

                        for position in self.clusters[index].range() {
                            let d = &self.primitives[position];
                            area += d.area;
                            for k in 0..3 {
                                wc[k] += d.area * d.centroid[k];
                                wn[k] += d.area * d.normal[k];
                            }

                            let original = self.ordering[position];
                            for h in 0..hull_points {
                                bbox.grow_point(&primitives.hull_point(original, h));
                            }
                        }
                        (area, bbox, wc, wn)
                    }
                    Some([left, right]) => {
                        let l = &self.clusters[left];
                        let r = &self.clusters[right];
                        let mut bbox = l.bounding_box;
                        bbox.grow(&r.bounding_box);

                        let mut wc = [0.0; 3];
                        let mut wn = [0.0; 3];
                        for k in 0..3 {
                            wc[k] = moments[left].0[k] + moments[right].0[k];
                            wn[k] = moments[left].1[k] + moments[right].1[k];
                        }
                        (l.descriptor.area + r.descriptor.area, bbox, wc, wn)
                    }
                };

            let (centroid, normal) = if area > 0.0 {
                (
                    weighted_centroid.map(|x| x / area),
                    weighted_normal.map(|x| x / area),
                )
            } else {
                (bounding_box.center(), [0.0; 3])
            };

            moments[index] = (weighted_centroid, weighted_normal);

            let cluster = &mut self.clusters[index];
            cluster.bounding_box = bounding_box;
            cluster.descriptor = Descriptor {
                area,
                centroid,
                normal,
            };
        }
    }

    /// Number of primitives in the tree.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    #[inline(always)]
    pub fn split_threshold(&self) -> usize {
        self.split_threshold
    }

    /// Maximum depth of any cluster, the root being depth 0.
    #[inline(always)]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline(always)]
    pub fn root(&self) -> &Cluster {
        &self.clusters[0]
    }

    #[inline(always)]
    pub fn cluster(&self, index: usize) -> &Cluster {
        &self.clusters[index]
    }

    #[inline(always)]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Indices of the leaf clusters, in increasing order of cluster index.
    #[inline(always)]
    pub fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    /// `ordering[position]` is the original index of the primitive stored at `position`.
    #[inline(always)]
    pub fn ordering(&self) -> &[usize] {
        &self.ordering
    }

    /// `inverse_ordering[original]` is the tree position of an original primitive index.
    #[inline(always)]
    pub fn inverse_ordering(&self) -> &[usize] {
        &self.inverse_ordering
    }

    /// Primitive descriptor at a tree position.
    #[inline(always)]
    pub fn primitive(&self, position: usize) -> &Descriptor {
        &self.primitives[position]
    }

    /// Primitive descriptors in tree order.
    #[inline(always)]
    pub fn primitives(&self) -> &[Descriptor] {
        &self.primitives
    }

    /// Permutes the rows of `values` from original order into tree order.
    pub fn to_tree_order(&self, values: MatRef<f64>) -> Result<Mat<f64>, BctError> {
        self.check_rows(values.nrows())?;
        Ok(Mat::from_fn(values.nrows(), values.ncols(), |i, j| {
            values[(self.ordering[i], j)]
        }))
    }

    /// Permutes the rows of `values` from tree order back into original order.
    pub fn from_tree_order(&self, values: MatRef<f64>) -> Result<Mat<f64>, BctError> {
        self.check_rows(values.nrows())?;
        Ok(Mat::from_fn(values.nrows(), values.ncols(), |i, j| {
            values[(self.inverse_ordering[i], j)]
        }))
    }

    fn check_rows(&self, rows: usize) -> Result<(), BctError> {
        if rows != self.len() {
            return Err(BctError::VectorLength {
                expected: self.len(),
                found: rows,
            });
        }
        Ok(())
    }
}

/// Reorders `indices` in place so that centroids below the midpoint of the longest
/// axis come first, and returns the size of the lower half.
///
/// Always returns a value strictly between 0 and `indices.len()` for two or more
/// indices.
fn partition(indices: &mut [usize], centroids: &[[f64; 3]]) -> usize {
    let count = indices.len();

    let mut bbox = BoundingBox::empty();
    for &i in indices.iter() {
        bbox.grow_point(&centroids[i]);
    }
    let (axis, extent) = bbox.longest_axis();

    if extent > 0.0 {
        let midpoint = bbox.center()[axis];
        let mut lower = 0;
        let mut upper = count;

        while lower < upper {
            if centroids[indices[lower]][axis] < midpoint {
                lower += 1;
            } else {
                upper -= 1;
                indices.swap(lower, upper);
            }
        }

        if lower > 0 && lower < count {
            return lower;
        }
    }

    count / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::DATA_DIM;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_primitives(n: usize, seed: u64) -> PrimitiveData {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = Mat::from_fn(n, DATA_DIM, |_, j| match j {
            0 => rng.random_range(0.1..1.0),
            1..=3 => rng.random_range(-1.0..1.0),
            _ => rng.random_range(-1.0..1.0),
        });
        PrimitiveData::new(data, None, None).unwrap()
    }

    #[test]
    fn leaves_partition_every_primitive_once() {
        let primitives = random_primitives(1000, 7);
        let tree = ClusterTree::new(&primitives, 8).unwrap();

        let mut ranges: Vec<(usize, usize)> = tree
            .leaves()
            .iter()
            .map(|&l| (tree.cluster(l).begin, tree.cluster(l).end))
            .collect();
        ranges.sort();

        let mut next = 0;
        for (begin, end) in ranges {
            assert_eq!(begin, next);
            assert!(end > begin);
            assert!(end - begin <= 8);
            next = end;
        }
        assert_eq!(next, 1000);

        let mut seen = vec![false; 1000];
        for &i in tree.ordering() {
            assert!(!seen[i]);
            seen[i] = true;
        }
        for (original, &position) in tree.inverse_ordering().iter().enumerate() {
            assert_eq!(tree.ordering()[position], original);
        }
    }

    #[test]
    fn aggregate_areas_are_additive() {
        let primitives = random_primitives(500, 11);
        let tree = ClusterTree::new(&primitives, 4).unwrap();

        let total: f64 = (0..500).map(|i| primitives.descriptor(i).area).sum();
        assert!((tree.root().descriptor.area - total).abs() < 1e-12 * total);

        for cluster in tree.clusters() {
            if let Some([l, r]) = cluster.children {
                let left = tree.cluster(l);
                let right = tree.cluster(r);
                assert_eq!(
                    cluster.descriptor.area,
                    left.descriptor.area + right.descriptor.area
                );
                assert_eq!(left.begin, cluster.begin);
                assert_eq!(left.end, right.begin);
                assert_eq!(right.end, cluster.end);
                assert!(l > 0 && r > 0);
            }
        }
    }

    #[test]
    fn aggregate_centroid_is_area_weighted() {
        let primitives = random_primitives(64, 3);
        let tree = ClusterTree::new(&primitives, 4).unwrap();

        for cluster in tree.clusters() {
            let area: f64 = cluster.range().map(|p| tree.primitive(p).area).sum();
            for k in 0..3 {
                let weighted: f64 = cluster
                    .range()
                    .map(|p| tree.primitive(p).area * tree.primitive(p).centroid[k])
                    .sum();
                assert!((cluster.descriptor.centroid[k] - weighted / area).abs() < 1e-12);

                let normal: f64 = cluster
                    .range()
                    .map(|p| tree.primitive(p).area * tree.primitive(p).normal[k])
                    .sum();
                assert!((cluster.descriptor.normal[k] - normal / area).abs() < 1e-12);
            }

            for p in cluster.range() {
                assert!(cluster.bounding_box.contains(&tree.primitive(p).centroid));
            }
        }
    }

    #[test]
    fn single_primitive_is_one_leaf() {
        let primitives = random_primitives(1, 5);
        let tree = ClusterTree::new(&primitives, 1).unwrap();
        assert_eq!(tree.clusters().len(), 1);
        assert_eq!(tree.leaves(), &[0]);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn coincident_centroids_fall_back_to_bisection() {
        let data = Mat::from_fn(37, DATA_DIM, |_, j| if j == 0 { 1.0 } else { 0.25 });
        let primitives = PrimitiveData::new(data, None, None).unwrap();
        let tree = ClusterTree::new(&primitives, 2).unwrap();

        for &leaf in tree.leaves() {
            assert!(tree.cluster(leaf).len() <= 2);
            assert!(!tree.cluster(leaf).is_empty());
        }
        assert!(tree.depth() <= 6);
        assert_eq!(tree.root().descriptor.area, 37.0);
    }

    #[test]
    fn tree_order_round_trips_values() {
        let primitives = random_primitives(50, 19);
        let tree = ClusterTree::new(&primitives, 3).unwrap();

        let values = Mat::from_fn(50, 2, |i, j| (i * 10 + j) as f64);
        let permuted = tree.to_tree_order(values.as_ref()).unwrap();
        for position in 0..50 {
            assert_eq!(permuted[(position, 1)], values[(tree.ordering()[position], 1)]);
        }
        let restored = tree.from_tree_order(permuted.as_ref()).unwrap();
        assert_eq!(restored, values);

        let wrong = Mat::<f64>::zeros(49, 1);
        assert!(matches!(
            tree.to_tree_order(wrong.as_ref()),
            Err(BctError::VectorLength { expected: 50, found: 49 })
        ));
    }

    #[test]
    fn rejects_zero_split_threshold() {
        let primitives = random_primitives(10, 1);
        assert!(matches!(
            ClusterTree::new(&primitives, 0),
            Err(BctError::InvalidSplitThreshold)
        ));
    }
}
