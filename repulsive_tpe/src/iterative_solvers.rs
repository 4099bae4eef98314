/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements a preconditioned conjugate gradient solver for symmetric metric systems.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    energy::TpeError,
    progress::{progress_from_rel, ProgressMsg, ProgressSink},
};
use faer::{Mat, MatRef};
use std::sync::Arc;

/// Result of an iterative solve.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Approximate solution, shape (n, 1).
    pub x: Mat<f64>,

    /// Number of operator applications performed.
    pub iterations: usize,

    /// Final residual norm relative to the norm of the right-hand side.
    pub residual: f64,

    /// Whether the relative residual dropped below the tolerance.
    pub converged: bool,
}

#[inline]
fn dot(a: MatRef<f64>, b: MatRef<f64>) -> f64 {
    a.col(0).iter().zip(b.col(0).iter()).map(|(x, y)| x * y).sum()
}

/// Preconditioned conjugate gradient for a symmetric positive definite operator.
///
/// # Parameters
/// - `a`: Operator function A(x)
/// - `b`: Right-hand side, shape (n, 1)
/// - `m`: Optional symmetric positive definite preconditioner M(r) approximating A^-1 r
/// - `x0`: Optional initial guess
/// - `max_iterations`: Maximum number of iterations
/// - `tolerance`: Stopping criterion on the relative residual `|b - Ax| / |b|`
/// - `callback`: Optional progress sink receiving one message per iteration
///
/// # Errors
/// - Propagates errors returned by `a` or `m`.
/// - Returns `TpeError::NotPositiveDefinite` if a search direction has non-positive
///   curvature.
pub fn conjugate_gradient<A, M>(
    a: &A,
    b: MatRef<f64>,
    m: Option<&M>,
    x0: Option<&Mat<f64>>,
    max_iterations: usize,
    tolerance: f64,
    callback: Option<Arc<dyn ProgressSink>>,
) -> Result<Solution, TpeError>
where
    A: Fn(&MatRef<f64>) -> Result<Mat<f64>, TpeError>,
    M: Fn(&MatRef<f64>) -> Result<Mat<f64>, TpeError>,
{
    let n = b.nrows();
    let mut x = x0.cloned().unwrap_or_else(|| Mat::zeros(n, 1));

    let b_norm = b.norm_l2();
    if b_norm == 0.0 {
        return Ok(Solution {
            x: Mat::zeros(n, 1),
            iterations: 0,
            residual: 0.0,
            converged: true,
        });
    }

    let ax = a(&x.as_ref())?;
    let mut r = Mat::from_fn(n, 1, |i, _| b[(i, 0)] - ax[(i, 0)]);
    let mut residual = r.norm_l2() / b_norm;
    let start_residual = residual;

    if residual < tolerance {
        return Ok(Solution {
            x,
            iterations: 0,
            residual,
            converged: true,
        });
    }

    let mut z = match m {
        Some(mfun) => mfun(&r.as_ref())?,
        None => r.clone(),
    };
    let mut p = z.clone();
    let mut rz = dot(r.as_ref(), z.as_ref());

    for iteration in 1..=max_iterations {
        let ap = a(&p.as_ref())?;
        let curvature = dot(p.as_ref(), ap.as_ref());
        if !(curvature > 0.0) {
            return Err(TpeError::NotPositiveDefinite { iteration });
        }

        let step = rz / curvature;
        for i in 0..n {
            x[(i, 0)] += step * p[(i, 0)];
            r[(i, 0)] -= step * ap[(i, 0)];
        }

        residual = r.norm_l2() / b_norm;

        if let Some(sink) = &callback {
            sink.emit(ProgressMsg::SolverIteration {
                iter: iteration,
                residual,
                progress: progress_from_rel(residual, start_residual, tolerance),
            });
        }

        if residual < tolerance {
            log::debug!(
                "conjugate gradient converged in {} iterations (residual {:e})",
                iteration,
                residual
            );
            return Ok(Solution {
                x,
                iterations: iteration,
                residual,
                converged: true,
            });
        }

        z = match m {
            Some(mfun) => mfun(&r.as_ref())?,
            None => r.clone(),
        };
        let rz_next = dot(r.as_ref(), z.as_ref());
        let beta = rz_next / rz;
        rz = rz_next;

        for i in 0..n {
            p[(i, 0)] = z[(i, 0)] + beta * p[(i, 0)];
        }
    }

    log::warn!(
        "conjugate gradient stopped after {} iterations with residual {:e}",
        max_iterations,
        residual
    );

    Ok(Solution {
        x,
        iterations: max_iterations,
        residual,
        converged: false,
    })
}
