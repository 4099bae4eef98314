/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API and high-level documentation for tangent-point repulsive energies.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Tangent-point repulsive energies for triangle meshes.
//!
//! The tangent-point energy penalises pairs of surface elements that are close to
//! each other and nearly tangent. For triangles `i` and `j` with areas `a`,
//! centroids `x` and unit normals `n`, the discrete energy is
//!
//! ```text
//! E = sum_{i < j} a_i a_j (|v.n_i|^alpha + |v.n_j|^alpha) / |v|^beta,    v = x_j - x_i
//! ```
//!
//! Evaluating every pair costs **O(N²)**. Following `1`, this crate groups the faces
//! into a block cluster tree (see the [`repulsive_bct`] crate): well separated groups
//! of faces interact through their aggregate area, centroid and normal, and only
//! nearby faces are summed exactly. Energy, analytic vertex gradient and the
//! fractional Sobolev metric operators then cost close to **O(N log N)**.
//!
//! # Features
//! - Exact [`AllPairsTpe`] reference and tree-accelerated [`HierarchicalTpe`] energies
//!   behind the [`SurfaceEnergy`] trait
//! - A [`CoulombEnergy`] on the same tree, with the normals left out of the kernel
//! - Analytic differential with respect to every vertex position
//! - Integer exponent fast path evaluated by repeated squaring
//! - Fractional, high order and low order metric operators and a shifted metric solve
//! - Per-energy thread pools and optional progress reporting
//!
//! # Examples
//!
//! ```
//! use repulsive_tpe::{
//!     generate_sphere_soup, AllPairsTpe, HierarchicalTpe, SurfaceEnergy, TpeParams,
//! };
//!
//! // 500 unit-area triangles scattered over a sphere
//! let soup = generate_sphere_soup(500, Some(42));
//!
//! let params = TpeParams::builder()
//!     .exponents(6.0, 12.0)
//!     .theta(0.5)
//!     .split_threshold(8)
//!     .build()
//!     .unwrap();
//!
//! let exact = AllPairsTpe::new(&soup, params).unwrap();
//! let fast = HierarchicalTpe::new(&soup, params).unwrap();
//!
//! let relative_error = (fast.value() - exact.value()).abs() / exact.value();
//! assert!(relative_error < 1e-2);
//!
//! // Gradient with respect to the vertex positions, shape (V, 3)
//! let gradient = fast.differential().unwrap();
//! assert_eq!(gradient.nrows(), soup.num_vertices());
//! ```
//!
//! # References
//! 1.  Yu, C., Brakensiek, C., Schumacher, H., & Crane, K. (2021). Repulsive Surfaces.
//!     ACM Transactions on Graphics, 40(6).
//! 2.  Yu, C., Schumacher, H., & Crane, K. (2021). Repulsive Curves.
//!     ACM Transactions on Graphics, 40(2).
pub mod config;

pub mod progress;

pub mod kernel;

pub mod metric;

pub mod accumulator;

mod common;

mod mesh;

mod iterative_solvers;

mod energy;

pub use {
    common::{generate_sphere_soup, generate_uv_sphere, jitter_vertices},
    config::{TpeParams, TpeParamsBuilder},
    energy::{
        AllPairsTpe, CoulombEnergy, HierarchicalTpe, SurfaceEnergy, TangentPointEnergy, TpeError,
    },
    iterative_solvers::{conjugate_gradient, Solution},
    mesh::{FaceGeometry, TriangleMesh},
    metric::{MetricSolveParams, OperatorKind},
};
