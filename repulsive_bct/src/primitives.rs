/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines validated per-primitive descriptor storage (area, centroid, normal, hull points).
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::block_cluster_tree::BctError;
use faer::{Mat, MatRef, RowRef};

/// Number of values stored per primitive: area, centroid (x, y, z), normal (x, y, z).
pub const DATA_DIM: usize = 7;

/// Dimension of the ambient space.
pub const AMBIENT_DIM: usize = 3;

/// Area, centroid and normal of a primitive, or the aggregate of a cluster.
///
/// For clusters the centroid is area weighted and the normal is the area weighted
/// mean of the member normals, so it is generally shorter than unit length.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Descriptor {
    pub area: f64,
    pub centroid: [f64; 3],
    pub normal: [f64; 3],
}

impl Descriptor {
    #[inline(always)]
    pub fn from_row(row: RowRef<f64>) -> Self {
        Self {
            area: row[0],
            centroid: [row[1], row[2], row[3]],
            normal: [row[4], row[5], row[6]],
        }
    }

    /// Writes the descriptor into a `DATA_DIM` wide array in storage order.
    #[inline(always)]
    pub fn to_array(&self) -> [f64; DATA_DIM] {
        [
            self.area,
            self.centroid[0],
            self.centroid[1],
            self.centroid[2],
            self.normal[0],
            self.normal[1],
            self.normal[2],
        ]
    }
}

/// Validated primitive descriptors ready to be clustered.
///
/// * `data`: shape (N, 7), one row `[area, cx, cy, cz, nx, ny, nz]` per primitive.
/// * `hull`: shape (N, 3 * H), the H convex hull points of each primitive
///   (3 for triangles). Used only for bounding boxes.
/// * `ordering`: the initial permutation of primitives handed to the tree builder.
#[derive(Debug, Clone)]
pub struct PrimitiveData {
    data: Mat<f64>,
    hull: Mat<f64>,
    ordering: Vec<usize>,
}

impl PrimitiveData {
    /// Validates and wraps a descriptor matrix.
    ///
    /// When `hull` is `None` the centroids act as single point hulls. When `ordering`
    /// is `None` the identity permutation is used.
    pub fn new(
        data: Mat<f64>,
        hull: Option<Mat<f64>>,
        ordering: Option<Vec<usize>>,
    ) -> Result<Self, BctError> {
        let n = data.nrows();

        if data.ncols() != DATA_DIM {
            return Err(BctError::DescriptorWidth {
                expected: DATA_DIM,
                found: data.ncols(),
            });
        }

        if n == 0 {
            return Err(BctError::NoPrimitives);
        }

        for i in 0..n {
            if (0..DATA_DIM).any(|k| !data[(i, k)].is_finite()) {
                return Err(BctError::NonFiniteDescriptor { row: i });
            }
            if data[(i, 0)] < 0.0 {
                return Err(BctError::NegativeArea { row: i });
            }
        }

        let hull = match hull {
            Some(hull) => {
                if hull.ncols() == 0 || hull.ncols() % AMBIENT_DIM != 0 {
                    return Err(BctError::HullWidth { found: hull.ncols() });
                }
                if hull.nrows() != n {
                    return Err(BctError::HullRows {
                        expected: n,
                        found: hull.nrows(),
                    });
                }
                for i in 0..n {
                    if (0..hull.ncols()).any(|k| !hull[(i, k)].is_finite()) {
                        return Err(BctError::NonFiniteDescriptor { row: i });
                    }
                }
                hull
            }
            None => Mat::from_fn(n, AMBIENT_DIM, |i, k| data[(i, k + 1)]),
        };

        let ordering = match ordering {
            Some(ordering) => {
                validate_permutation(&ordering, n)?;
                ordering
            }
            None => (0..n).collect(),
        };

        Ok(Self {
            data,
            hull,
            ordering,
        })
    }

    /// Number of primitives.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    #[inline(always)]
    pub fn data(&self) -> MatRef<'_, f64> {
        self.data.as_ref()
    }

    #[inline(always)]
    pub fn hull(&self) -> MatRef<'_, f64> {
        self.hull.as_ref()
    }

    /// Number of hull points per primitive.
    #[inline(always)]
    pub fn hull_points(&self) -> usize {
        self.hull.ncols() / AMBIENT_DIM
    }

    #[inline(always)]
    pub fn ordering(&self) -> &[usize] {
        &self.ordering
    }

    #[inline(always)]
    pub fn descriptor(&self, index: usize) -> Descriptor {
        Descriptor::from_row(self.data.row(index))
    }

    #[inline(always)]
    pub fn hull_point(&self, index: usize, point: usize) -> [f64; 3] {
        let offset = AMBIENT_DIM * point;
        [
            self.hull[(index, offset)],
            self.hull[(index, offset + 1)],
            self.hull[(index, offset + 2)],
        ]
    }
}

fn validate_permutation(ordering: &[usize], n: usize) -> Result<(), BctError> {
    if ordering.len() != n {
        return Err(BctError::InvalidOrdering);
    }
    let mut seen = vec![false; n];
    for &i in ordering {
        if i >= n || seen[i] {
            return Err(BctError::InvalidOrdering);
        }
        seen[i] = true;
    }
    Ok(())
}
