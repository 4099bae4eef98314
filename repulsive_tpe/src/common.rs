/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines shared helpers generating deterministic test meshes.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{energy::TpeError, mesh::TriangleMesh};
use core::f64;
use faer::Mat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use repulsive_bct::utils;

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Uniformly distributed point on the unit sphere.
fn random_unit_vector(rng: &mut StdRng) -> [f64; 3] {
    let z: f64 = rng.random_range(-1.0..1.0);
    let phi = rng.random_range(0.0..2.0 * f64::consts::PI);
    let rho = (1.0 - z * z).max(0.0).sqrt();
    [rho * phi.cos(), rho * phi.sin(), z]
}

/// Generate a "soup" of `n` disconnected unit-area equilateral triangles with random
/// orientations, whose centroids lie on a sphere.
///
/// The sphere radius is `sqrt(n / (4 pi))`, so the surface density stays at about one
/// triangle per unit area as `n` grows.
///
/// # Parameters
/// - `n`: Number of triangles.
/// - `seed`: Optional random seed.
///   - If `Some(seed)` is provided, the same mesh is generated deterministically.
///   - If `None`, the generator is seeded from the operating system's randomness source.
///
/// # Example
/// ```
/// use repulsive_tpe::generate_sphere_soup;
///
/// let soup = generate_sphere_soup(100, Some(42));
/// assert_eq!(soup.num_faces(), 100);
/// assert_eq!(soup.num_vertices(), 300);
/// ```
pub fn generate_sphere_soup(n: usize, seed: Option<u64>) -> TriangleMesh {
    let mut rng = rng_from_seed(seed);
    let radius = (n as f64 / (4.0 * f64::consts::PI)).sqrt();

    // Circumradius of an equilateral triangle of unit area.
    let side = (4.0 / 3f64.sqrt()).sqrt();
    let circumradius = side / 3f64.sqrt();

    let mut vertices = Mat::<f64>::zeros(3 * n, 3);
    let mut faces = Vec::with_capacity(n);

    for f in 0..n {
        let centre = random_unit_vector(&mut rng).map(|x| radius * x);
        let normal = random_unit_vector(&mut rng);

        // Orthonormal frame (e1, e2) of the triangle plane.
        let helper = if normal[0].abs() < 0.9 {
            [1.0, 0.0, 0.0]
        } else {
            [0.0, 1.0, 0.0]
        };
        let mut e1 = utils::cross(&normal, &helper);
        let length = utils::norm(&e1);
        e1 = e1.map(|x| x / length);
        let e2 = utils::cross(&normal, &e1);

        let spin = rng.random_range(0.0..2.0 * f64::consts::PI);
        for corner in 0..3 {
            let angle = spin + corner as f64 * 2.0 * f64::consts::PI / 3.0;
            let (s, c) = angle.sin_cos();
            for k in 0..3 {
                vertices[(3 * f + corner, k)] =
                    centre[k] + circumradius * (c * e1[k] + s * e2[k]);
            }
        }
        faces.push([3 * f, 3 * f + 1, 3 * f + 2]);
    }

    TriangleMesh::from_parts(vertices, faces)
}

/// Generate a closed latitude/longitude sphere with outward facing triangles.
///
/// # Parameters
/// - `num_rings`: Number of latitude bands, at least 2.
/// - `num_segments`: Number of longitude segments, at least 3.
/// - `radius`: Sphere radius.
///
/// The mesh has `num_segments * (num_rings - 1) + 2` vertices and
/// `2 * num_segments * (num_rings - 1)` faces.
pub fn generate_uv_sphere(
    num_rings: usize,
    num_segments: usize,
    radius: f64,
) -> Result<TriangleMesh, TpeError> {
    if num_rings < 2 {
        return Err(TpeError::InvalidParameter {
            name: "num_rings",
            value: num_rings as f64,
        });
    }
    if num_segments < 3 {
        return Err(TpeError::InvalidParameter {
            name: "num_segments",
            value: num_segments as f64,
        });
    }

    let num_vertices = num_segments * (num_rings - 1) + 2;
    let north = 0;
    let south = num_vertices - 1;
    let ring_vertex =
        |ring: usize, segment: usize| 1 + (ring - 1) * num_segments + segment % num_segments;

    let vertices = Mat::from_fn(num_vertices, 3, |i, k| {
        let (polar, azimuth) = if i == north {
            (0.0, 0.0)
        } else if i == south {
            (f64::consts::PI, 0.0)
        } else {
            let ring = (i - 1) / num_segments + 1;
            let segment = (i - 1) % num_segments;
            (
                f64::consts::PI * ring as f64 / num_rings as f64,
                2.0 * f64::consts::PI * segment as f64 / num_segments as f64,
            )
        };
        match k {
            0 => radius * polar.sin() * azimuth.cos(),
            1 => radius * polar.sin() * azimuth.sin(),
            _ => radius * polar.cos(),
        }
    });

    let mut faces = Vec::with_capacity(2 * num_segments * (num_rings - 1));
    for segment in 0..num_segments {
        faces.push([north, ring_vertex(1, segment), ring_vertex(1, segment + 1)]);
    }
    for ring in 1..(num_rings - 1) {
        for segment in 0..num_segments {
            let a = ring_vertex(ring, segment);
            let b = ring_vertex(ring + 1, segment);
            let c = ring_vertex(ring + 1, segment + 1);
            let d = ring_vertex(ring, segment + 1);
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }
    for segment in 0..num_segments {
        faces.push([
            south,
            ring_vertex(num_rings - 1, segment + 1),
            ring_vertex(num_rings - 1, segment),
        ]);
    }

    TriangleMesh::new(vertices, faces)
}

/// Randomly displaces every vertex of `mesh` by up to `amplitude` along each axis.
///
/// `amplitude` must be finite and non-negative.
pub fn jitter_vertices(mesh: &TriangleMesh, amplitude: f64, seed: Option<u64>) -> TriangleMesh {
    let mut rng = rng_from_seed(seed);
    let vertices = mesh.vertices();
    let jittered = Mat::from_fn(vertices.nrows(), 3, |i, k| {
        vertices[(i, k)] + rng.random_range(-amplitude..=amplitude)
    });
    TriangleMesh::from_parts(jittered, mesh.faces().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_soup_has_unit_area_triangles() {
        let soup = generate_sphere_soup(200, Some(1));
        let radius = (200.0 / (4.0 * f64::consts::PI)).sqrt();

        for f in 0..soup.num_faces() {
            let g = soup.face_geometry(f);
            assert!((g.area - 1.0).abs() < 1e-12);
            assert!((utils::norm(&g.centroid) - radius).abs() < 1e-12);
        }

        let again = generate_sphere_soup(200, Some(1));
        assert_eq!(soup.vertices(), again.vertices());
    }

    #[test]
    fn uv_sphere_normals_point_outward() {
        let sphere = generate_uv_sphere(8, 12, 2.0).unwrap();
        assert_eq!(sphere.num_vertices(), 12 * 7 + 2);
        assert_eq!(sphere.num_faces(), 2 * 12 * 7);

        for f in 0..sphere.num_faces() {
            let g = sphere.face_geometry(f);
            assert!(g.area > 0.0);
            assert!(utils::dot(&g.normal, &g.centroid) > 0.0);
        }

        // Area approaches 4 pi r^2 from below.
        let area = sphere.area();
        assert!(area < 16.0 * f64::consts::PI);
        assert!(area > 0.9 * 16.0 * f64::consts::PI);
    }

    #[test]
    fn uv_sphere_rejects_too_few_bands() {
        assert!(generate_uv_sphere(1, 8, 1.0).is_err());
        assert!(generate_uv_sphere(4, 2, 1.0).is_err());
    }
}
