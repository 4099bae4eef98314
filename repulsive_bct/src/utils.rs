/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides bounding boxes, small vector helpers and balanced work partitioning.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;
use std::ops::Range;

/// Axis aligned bounding box (AABB) in three dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// An inverted box that any point will grow.
    #[inline(always)]
    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }

    #[inline(always)]
    pub fn grow_point(&mut self, point: &[f64; 3]) {
        for k in 0..3 {
            self.min[k] = self.min[k].min(point[k]);
            self.max[k] = self.max[k].max(point[k]);
        }
    }

    #[inline(always)]
    pub fn grow(&mut self, other: &BoundingBox) {
        for k in 0..3 {
            self.min[k] = self.min[k].min(other.min[k]);
            self.max[k] = self.max[k].max(other.max[k]);
        }
    }

    #[inline(always)]
    pub fn center(&self) -> [f64; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    /// Length of the box diagonal. Zero for an empty box.
    #[inline(always)]
    pub fn diameter(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        norm(&sub(&self.max, &self.min))
    }

    /// Returns the axis with the largest extent together with that extent.
    #[inline(always)]
    pub fn longest_axis(&self) -> (usize, f64) {
        let extents = sub(&self.max, &self.min);
        let mut axis = 0;
        for k in 1..3 {
            if extents[k] > extents[axis] {
                axis = k;
            }
        }
        (axis, extents[axis])
    }

    #[inline(always)]
    pub fn contains(&self, point: &[f64; 3]) -> bool {
        (0..3).all(|k| self.min[k] <= point[k] && point[k] <= self.max[k])
    }
}

#[inline(always)]
pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline(always)]
pub fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline(always)]
pub fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline(always)]
pub fn norm(a: &[f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Splits a list of work items into at most `parts` contiguous ranges whose summed
/// costs are roughly equal.
///
/// Every index of `costs` lands in exactly one range and the ranges are returned in
/// increasing order. An empty cost list gives no ranges.
pub fn balanced_ranges(costs: &[usize], parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1);
    let total: usize = costs.iter().sum();
    let target = total.div_ceil(parts).max(1);

    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0usize;
    let mut accumulated = 0usize;

    for (i, cost) in costs.iter().enumerate() {
        accumulated += cost;
        if accumulated >= target && ranges.len() + 1 < parts {
            ranges.push(start..i + 1);
            start = i + 1;
            accumulated = 0;
        }
    }

    if start < costs.len() {
        ranges.push(start..costs.len());
    }

    ranges
}

/// Adds `source` into `target` element-wise. Both matrices must have the same shape.
#[inline(always)]
pub fn add_assign(target: &mut Mat<f64>, source: &Mat<f64>) {
    debug_assert_eq!(target.nrows(), source.nrows());
    debug_assert_eq!(target.ncols(), source.ncols());

    for j in 0..target.ncols() {
        for i in 0..target.nrows() {
            target[(i, j)] += source[(i, j)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_ranges_cover_every_item_once() {
        let costs = vec![5, 1, 1, 1, 9, 2, 2, 2, 0, 4, 3];
        for parts in 1..8 {
            let ranges = balanced_ranges(&costs, parts);
            assert!(ranges.len() <= parts);

            let mut next = 0;
            for range in &ranges {
                assert_eq!(range.start, next);
                assert!(range.end > range.start);
                next = range.end;
            }
            assert_eq!(next, costs.len());
        }
    }

    #[test]
    fn balanced_ranges_of_nothing_is_empty() {
        assert!(balanced_ranges(&[], 4).is_empty());
    }

    #[test]
    fn zero_cost_items_still_get_a_range() {
        let ranges = balanced_ranges(&[0, 0, 0], 2);
        let covered: usize = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(covered, 3);
    }

    #[test]
    fn bounding_box_grows_and_measures() {
        let mut bbox = BoundingBox::empty();
        assert!(bbox.is_empty());
        assert_eq!(bbox.diameter(), 0.0);

        bbox.grow_point(&[0.0, 0.0, 0.0]);
        bbox.grow_point(&[1.0, 2.0, 2.0]);

        assert_eq!(bbox.center(), [0.5, 1.0, 1.0]);
        assert!((bbox.diameter() - 3.0).abs() < 1e-15);
        assert_eq!(bbox.longest_axis().0, 1);
        assert!(bbox.contains(&[0.5, 0.5, 0.5]));
        assert!(!bbox.contains(&[1.5, 0.5, 0.5]));

        let mut other = BoundingBox::empty();
        other.grow_point(&[-1.0, 0.0, 5.0]);
        bbox.grow(&other);
        assert_eq!(bbox.min, [-1.0, 0.0, 0.0]);
        assert_eq!(bbox.max, [1.0, 2.0, 5.0]);
    }

    #[test]
    fn cross_product_is_right_handed() {
        assert_eq!(cross(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
    }
}
