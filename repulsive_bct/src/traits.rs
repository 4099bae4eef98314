/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the pair kernel trait used by hierarchical operator products.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::primitives::Descriptor;

/// Evaluates an interaction kernel between a target and a source descriptor.
///
/// The descriptors may belong to single primitives (near field) or be the aggregated
/// descriptors of whole clusters (far field). Implementors return the kernel value
/// *without* the area weights; the caller multiplies by both areas.
///
/// Implementations must return a finite value for every pair, including coincident
/// centroids, where returning `0.0` is the expected convention.
pub trait PairKernel: Send + Sync {
    fn evaluate(&self, target: &Descriptor, source: &Descriptor) -> f64;
}
