/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares configuration types for tangent-point energies and their tree approximation.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Declares configuration types for tangent-point energies.
use crate::energy::TpeError;
use serde::{Deserialize, Serialize};

/// Parameters controlling a tangent-point energy.
///
/// The energy density between two oriented elements is
/// `(|v.n|^alpha + |v.m|^alpha) / |v|^beta`. The pair `(alpha, beta)` controls how
/// strongly near-tangent and nearby elements repel each other, and the metric
/// operators derive their fractional order `s = (beta - 2) / alpha` from it.
///
/// ### Default Values
/// - `alpha`: `6.0`
/// - `beta`: `12.0`
/// - `theta`: `0.5`
/// - `split_threshold`: `8`
/// - `weight`: `1.0`
/// - `use_integer_exponents`: `true`
/// - `thread_count`: `None` (rayon's default)
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct TpeParams {
    /// Exponent applied to the projected distances `|v.n|` and `|v.m|`.
    pub alpha: f64,

    /// Exponent applied to the distance `|v|`.
    pub beta: f64,

    /// Admissibility parameter of the block cluster tree, in (0, 1).
    /// Smaller values are more accurate and slower.
    pub theta: f64,

    /// Maximum number of primitives in a leaf cluster.
    pub split_threshold: usize,

    /// Scalar multiplier applied to the energy and its derivative.
    pub weight: f64,

    /// Evaluate powers by repeated squaring when `alpha` and `beta / 2` are integers.
    pub use_integer_exponents: bool,

    /// Size of the thread pool owned by each energy.
    pub thread_count: Option<usize>,
}

impl Default for TpeParams {
    fn default() -> Self {
        TpeParams {
            alpha: 6.0,
            beta: 12.0,
            theta: 0.5,
            split_threshold: 8,
            weight: 1.0,
            use_integer_exponents: true,
            thread_count: None,
        }
    }
}

impl TpeParams {
    /// Returns a new [`TpeParamsBuilder`] populated with the default values.
    pub fn builder() -> TpeParamsBuilder {
        TpeParamsBuilder::new()
    }

    /// Checks every parameter, returning the first invalid one as an error.
    pub fn validate(&self) -> Result<(), TpeError> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(TpeError::InvalidParameter {
                name: "alpha",
                value: self.alpha,
            });
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(TpeError::InvalidParameter {
                name: "beta",
                value: self.beta,
            });
        }
        if !(self.theta > 0.0 && self.theta < 1.0) {
            return Err(TpeError::InvalidParameter {
                name: "theta",
                value: self.theta,
            });
        }
        if self.split_threshold == 0 {
            return Err(TpeError::InvalidParameter {
                name: "split_threshold",
                value: 0.0,
            });
        }
        if !self.weight.is_finite() {
            return Err(TpeError::InvalidParameter {
                name: "weight",
                value: self.weight,
            });
        }
        if self.thread_count == Some(0) {
            return Err(TpeError::InvalidParameter {
                name: "thread_count",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// True when both exponents can be evaluated with integer powers.
    #[inline]
    pub fn integer_exponents(&self) -> bool {
        self.integer_distance_exponent()
            && self.alpha.fract() == 0.0
            && self.alpha <= i32::MAX as f64
    }

    /// True when `beta / 2` can be evaluated with integer powers.
    #[inline]
    pub fn integer_distance_exponent(&self) -> bool {
        self.use_integer_exponents
            && (0.5 * self.beta).fract() == 0.0
            && 0.5 * self.beta <= i32::MAX as f64
    }
}

/// A convenience builder for constructing a [`TpeParams`] instance.
///
/// The builder should be called via the [`TpeParams::builder`] method.
///
/// See [`TpeParams`] for details on each field.
#[derive(Debug, Clone)]
pub struct TpeParamsBuilder {
    params: TpeParams,
}

impl TpeParamsBuilder {
    fn new() -> Self {
        Self {
            params: TpeParams::default(),
        }
    }

    /// Sets both exponents.
    pub fn exponents(mut self, alpha: f64, beta: f64) -> Self {
        self.params.alpha = alpha;
        self.params.beta = beta;
        self
    }

    /// Sets the admissibility parameter.
    pub fn theta(mut self, theta: f64) -> Self {
        self.params.theta = theta;
        self
    }

    /// Sets the maximum leaf size.
    pub fn split_threshold(mut self, split_threshold: usize) -> Self {
        self.params.split_threshold = split_threshold;
        self
    }

    /// Sets the energy weight.
    pub fn weight(mut self, weight: f64) -> Self {
        self.params.weight = weight;
        self
    }

    /// Enables or disables integer power evaluation.
    pub fn use_integer_exponents(mut self, use_integer_exponents: bool) -> Self {
        self.params.use_integer_exponents = use_integer_exponents;
        self
    }

    /// Sets the number of worker threads.
    pub fn thread_count(mut self, thread_count: usize) -> Self {
        self.params.thread_count = Some(thread_count);
        self
    }

    /// Validates and returns a [`TpeParams`] instance.
    pub fn build(self) -> Result<TpeParams, TpeError> {
        self.params.validate()?;
        Ok(self.params)
    }
}
