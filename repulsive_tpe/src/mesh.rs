/////////////////////////////////////////////////////////////////////////////////////////////
//
// Triangle mesh storage, per-face descriptors and the chain rule back to vertex positions.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::energy::TpeError;
use faer::{Mat, MatRef};
use repulsive_bct::{utils, Descriptor, PrimitiveData, DATA_DIM};

/// Geometry of a single triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGeometry {
    pub area: f64,
    pub centroid: [f64; 3],

    /// Unit normal, or zero for a degenerate triangle.
    pub normal: [f64; 3],
}

/// An indexed triangle mesh.
///
/// * `vertices`: shape (V, 3).
/// * `faces`: vertex indices of each triangle, counter-clockwise around the normal.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    vertices: Mat<f64>,
    faces: Vec<[usize; 3]>,
}

impl TriangleMesh {
    pub fn new(vertices: Mat<f64>, faces: Vec<[usize; 3]>) -> Result<Self, TpeError> {
        validate_vertices(vertices.as_ref())?;

        for (f, face) in faces.iter().enumerate() {
            for &index in face {
                if index >= vertices.nrows() {
                    return Err(TpeError::FaceIndex {
                        face: f,
                        index,
                        num_vertices: vertices.nrows(),
                    });
                }
            }
        }

        Ok(Self { vertices, faces })
    }

    /// Wraps geometry that is valid by construction.
    pub(crate) fn from_parts(vertices: Mat<f64>, faces: Vec<[usize; 3]>) -> Self {
        debug_assert!(validate_vertices(vertices.as_ref()).is_ok());
        debug_assert!(faces.iter().flatten().all(|&i| i < vertices.nrows()));
        Self { vertices, faces }
    }

    /// Replaces the vertex positions, keeping the connectivity.
    pub fn set_vertices(&mut self, vertices: Mat<f64>) -> Result<(), TpeError> {
        if vertices.nrows() != self.vertices.nrows() {
            return Err(TpeError::VertexCount {
                expected: self.vertices.nrows(),
                found: vertices.nrows(),
            });
        }
        validate_vertices(vertices.as_ref())?;
        self.vertices = vertices;
        Ok(())
    }

    #[inline]
    pub fn vertices(&self) -> MatRef<'_, f64> {
        self.vertices.as_ref()
    }

    #[inline]
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.nrows()
    }

    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    #[inline]
    pub fn vertex(&self, index: usize) -> [f64; 3] {
        [
            self.vertices[(index, 0)],
            self.vertices[(index, 1)],
            self.vertices[(index, 2)],
        ]
    }

    #[inline]
    fn corners(&self, face: usize) -> [[f64; 3]; 3] {
        let [i, j, k] = self.faces[face];
        [self.vertex(i), self.vertex(j), self.vertex(k)]
    }

    /// Area vector `0.5 * (p1 - p0) x (p2 - p0)`, whose length is the face area.
    #[inline]
    fn area_vector(corners: &[[f64; 3]; 3]) -> [f64; 3] {
        let e1 = utils::sub(&corners[1], &corners[0]);
        let e2 = utils::sub(&corners[2], &corners[0]);
        utils::cross(&e1, &e2).map(|x| 0.5 * x)
    }

    pub fn face_geometry(&self, face: usize) -> FaceGeometry {
        let corners = self.corners(face);
        let area_vector = Self::area_vector(&corners);
        let area = utils::norm(&area_vector);

        let mut centroid = [0.0; 3];
        for k in 0..3 {
            centroid[k] = (corners[0][k] + corners[1][k] + corners[2][k]) / 3.0;
        }

        let normal = if area > 0.0 {
            area_vector.map(|x| x / area)
        } else {
            [0.0; 3]
        };

        FaceGeometry {
            area,
            centroid,
            normal,
        }
    }

    /// Per-face descriptors in face order.
    pub fn descriptors(&self) -> Vec<Descriptor> {
        (0..self.num_faces())
            .map(|f| {
                let g = self.face_geometry(f);
                Descriptor {
                    area: g.area,
                    centroid: g.centroid,
                    normal: g.normal,
                }
            })
            .collect()
    }

    /// Descriptor matrix with the triangle corners as hulls, ready for clustering.
    pub fn primitive_data(&self) -> Result<PrimitiveData, TpeError> {
        let descriptors = self.descriptors();
        let data = Mat::from_fn(self.num_faces(), DATA_DIM, |f, k| descriptors[f].to_array()[k]);
        let hull = Mat::from_fn(self.num_faces(), 9, |f, k| {
            self.vertices[(self.faces[f][k / 3], k % 3)]
        });

        Ok(PrimitiveData::new(data, Some(hull), None)?)
    }

    /// Total surface area.
    pub fn area(&self) -> f64 {
        (0..self.num_faces()).map(|f| self.face_geometry(f).area).sum()
    }

    /// Maps per-face derivatives with respect to `(area, area * centroid, area * normal)`
    /// to derivatives with respect to the vertex positions, scaled by `weight`.
    ///
    /// `derivatives` has shape (F, 7) in face order. The result has shape (V, 3).
    pub fn assemble_vertex_gradient(
        &self,
        derivatives: MatRef<f64>,
        weight: f64,
    ) -> Result<Mat<f64>, TpeError> {
        if derivatives.nrows() != self.num_faces() || derivatives.ncols() != DATA_DIM {
            return Err(TpeError::DerivativeShape {
                expected: (self.num_faces(), DATA_DIM),
                found: (derivatives.nrows(), derivatives.ncols()),
            });
        }

        let mut gradient = Mat::<f64>::zeros(self.num_vertices(), 3);

        for (f, face) in self.faces.iter().enumerate() {
            let corners = self.corners(f);
            let g = self.face_geometry(f);

            let d_area = derivatives[(f, 0)];
            let d_centroid = [derivatives[(f, 1)], derivatives[(f, 2)], derivatives[(f, 3)]];
            let d_normal = [derivatives[(f, 4)], derivatives[(f, 5)], derivatives[(f, 6)]];

            // Derivative with respect to the area vector.
            let along_normal = d_area + utils::dot(&g.centroid, &d_centroid);
            let mut w = d_normal;
            for k in 0..3 {
                w[k] += along_normal * g.normal[k];
            }

            for corner in 0..3 {
                let opposite = utils::sub(&corners[(corner + 2) % 3], &corners[(corner + 1) % 3]);
                let from_area = utils::cross(&w, &opposite);
                let vertex = face[corner];
                for k in 0..3 {
                    gradient[(vertex, k)] +=
                        weight * (0.5 * from_area[k] + g.area / 3.0 * d_centroid[k]);
                }
            }
        }

        Ok(gradient)
    }
}

fn validate_vertices(vertices: MatRef<f64>) -> Result<(), TpeError> {
    if vertices.ncols() != 3 {
        return Err(TpeError::VertexWidth {
            found: vertices.ncols(),
        });
    }
    for i in 0..vertices.nrows() {
        if (0..3).any(|k| !vertices[(i, k)].is_finite()) {
            return Err(TpeError::NonFiniteVertex { row: i });
        }
    }
    Ok(())
}
