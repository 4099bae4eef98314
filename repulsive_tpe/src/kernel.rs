/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the tangent-point energy density and its analytic derivative for element pairs.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::config::TpeParams;
use repulsive_bct::{utils, Descriptor, DATA_DIM};
use std::fmt::Debug;

/// An exponent that can raise a non-negative base to its power.
pub trait Exponent: Copy + Send + Sync + Debug {
    fn from_f64(value: f64) -> Self;
    fn raise(self, base: f64) -> f64;
}

impl Exponent for i32 {
    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value as i32
    }

    #[inline(always)]
    fn raise(self, base: f64) -> f64 {
        int_pow(base, self)
    }
}

impl Exponent for f64 {
    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline(always)]
    fn raise(self, base: f64) -> f64 {
        base.powf(self)
    }
}

/// `base^exponent` by repeated squaring. Negative exponents return the reciprocal.
#[inline(always)]
pub fn int_pow(base: f64, exponent: i32) -> f64 {
    let mut result = 1.0;
    let mut square = base;
    let mut e = exponent.unsigned_abs();

    while e > 0 {
        if e & 1 == 1 {
            result *= square;
        }
        square *= square;
        e >>= 1;
    }

    if exponent < 0 {
        1.0 / result
    } else {
        result
    }
}

/// Energy and derivative of a single interacting pair.
///
/// `first` and `second` are derivatives with respect to the area weighted coordinates
/// `(area, area * centroid, area * normal)` of the two elements, laid out as
/// `[d_area, d_centroid (x, y, z), d_normal (x, y, z)]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairTerms {
    pub energy: f64,
    pub first: [f64; DATA_DIM],
    pub second: [f64; DATA_DIM],
}

impl PairTerms {
    const ZERO: PairTerms = PairTerms {
        energy: 0.0,
        first: [0.0; DATA_DIM],
        second: [0.0; DATA_DIM],
    };
}

/// Area weighted pair energy between two elements, with its derivatives in the area
/// weighted coordinates. Implemented by every energy the accumulator can reduce.
pub trait EnergyKernel: Send + Sync {
    /// Area weighted energy of a pair. Zero for coincident centroids or zero areas.
    fn pair_energy(&self, i: &Descriptor, j: &Descriptor) -> f64;

    /// Area weighted energy of a pair together with its derivatives.
    fn pair_terms(&self, i: &Descriptor, j: &Descriptor) -> PairTerms;
}

/// The tangent-point kernel
///
/// ```text
/// K(i, j) = (|v.n|^alpha + |v.m|^alpha) / |v|^beta,   v = y - x
/// ```
///
/// for elements `i = (x, n)` and `j = (y, m)`.
#[derive(Debug, Clone, Copy)]
pub struct TangentPointKernel<E: Exponent> {
    alpha: f64,
    beta: f64,
    alpha_exponent: E,
    alpha_minus_two: E,
    minus_beta_half_minus_one: E,
}

impl<E: Exponent> TangentPointKernel<E> {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            alpha,
            beta,
            alpha_exponent: E::from_f64(alpha),
            alpha_minus_two: E::from_f64(alpha - 2.0),
            minus_beta_half_minus_one: E::from_f64(-0.5 * beta - 1.0),
        }
    }

    #[inline(always)]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline(always)]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Energy density between two elements, without area weights. Zero for
    /// coincident centroids.
    #[inline(always)]
    pub fn density(&self, i: &Descriptor, j: &Descriptor) -> f64 {
        let v = utils::sub(&j.centroid, &i.centroid);
        let r2 = utils::dot(&v, &v);
        if r2 == 0.0 {
            return 0.0;
        }

        let r_cos_phi = utils::dot(&v, &i.normal).abs();
        let r_cos_psi = utils::dot(&v, &j.normal).abs();

        let numerator =
            self.alpha_exponent.raise(r_cos_phi) + self.alpha_exponent.raise(r_cos_psi);
        numerator * self.minus_beta_half_minus_one.raise(r2) * r2
    }

}

impl<E: Exponent> EnergyKernel for TangentPointKernel<E> {
    /// Area weighted energy `a * b * K(i, j)` of a pair.
    #[inline(always)]
    fn pair_energy(&self, i: &Descriptor, j: &Descriptor) -> f64 {
        if i.area == 0.0 || j.area == 0.0 {
            return 0.0;
        }
        i.area * j.area * self.density(i, j)
    }

    #[inline(always)]
    fn pair_terms(&self, i: &Descriptor, j: &Descriptor) -> PairTerms {
        let a = i.area;
        let b = j.area;
        if a == 0.0 || b == 0.0 {
            return PairTerms::ZERO;
        }

        let x = &i.centroid;
        let n = &i.normal;
        let y = &j.centroid;
        let m = &j.normal;

        let v = utils::sub(y, x);
        let r2 = utils::dot(&v, &v);
        if r2 == 0.0 {
            return PairTerms::ZERO;
        }

        let r_cos_phi = utils::dot(&v, n);
        let r_cos_psi = utils::dot(&v, m);

        let r_beta_minus_two = self.minus_beta_half_minus_one.raise(r2);
        let r_beta = r_beta_minus_two * r2;

        let phi_alpha = self.alpha_exponent.raise(r_cos_phi.abs());
        let psi_alpha = self.alpha_exponent.raise(r_cos_psi.abs());
        let numerator = phi_alpha + psi_alpha;
        let density = numerator * r_beta;

        let phi_alpha_minus_one = if r_cos_phi == 0.0 {
            0.0
        } else {
            self.alpha_minus_two.raise(r_cos_phi.abs()) * r_cos_phi
        };
        let psi_alpha_minus_one = if r_cos_psi == 0.0 {
            0.0
        } else {
            self.alpha_minus_two.raise(r_cos_psi.abs()) * r_cos_psi
        };

        let factor = self.alpha * r_beta;
        let f = factor * phi_alpha_minus_one;
        let g = factor * psi_alpha_minus_one;
        let h = self.beta * r_beta_minus_two * numerator;

        let mut z = [0.0; 3];
        for k in 0..3 {
            z[k] = -f * n[k] - g * m[k] + h * v[k];
        }

        let x_minus_v = utils::sub(x, &v);
        let mut y_plus_v = *y;
        for k in 0..3 {
            y_plus_v[k] += v[k];
        }

        let mut first = [0.0; DATA_DIM];
        let mut second = [0.0; DATA_DIM];

        first[0] = b
            * (density + f * utils::dot(n, &x_minus_v) + g * utils::dot(m, x)
                - h * utils::dot(&v, x));
        second[0] = a
            * (density - f * utils::dot(n, y) - g * utils::dot(m, &y_plus_v)
                + h * utils::dot(&v, y));

        for k in 0..3 {
            first[1 + k] = b * z[k];
            second[1 + k] = -a * z[k];
            first[4 + k] = b * f * v[k];
            second[4 + k] = a * g * v[k];
        }

        PairTerms {
            energy: a * b * density,
            first,
            second,
        }
    }
}

/// The Coulomb kernel `K(i, j) = |v|^(-beta)`, which ignores the normals.
#[derive(Debug, Clone, Copy)]
pub struct CoulombKernel<E: Exponent> {
    beta: f64,
    minus_beta_half: E,
    minus_beta_half_minus_one: E,
}

impl<E: Exponent> CoulombKernel<E> {
    pub fn new(beta: f64) -> Self {
        Self {
            beta,
            minus_beta_half: E::from_f64(-0.5 * beta),
            minus_beta_half_minus_one: E::from_f64(-0.5 * beta - 1.0),
        }
    }

    #[inline(always)]
    pub fn beta(&self) -> f64 {
        self.beta
    }
}

impl<E: Exponent> EnergyKernel for CoulombKernel<E> {
    #[inline(always)]
    fn pair_energy(&self, i: &Descriptor, j: &Descriptor) -> f64 {
        if i.area == 0.0 || j.area == 0.0 {
            return 0.0;
        }
        let v = utils::sub(&j.centroid, &i.centroid);
        let r2 = utils::dot(&v, &v);
        if r2 == 0.0 {
            return 0.0;
        }
        i.area * j.area * self.minus_beta_half.raise(r2)
    }

    /// Same closed form as the tangent-point derivative with the normal terms removed.
    #[inline(always)]
    fn pair_terms(&self, i: &Descriptor, j: &Descriptor) -> PairTerms {
        let a = i.area;
        let b = j.area;
        if a == 0.0 || b == 0.0 {
            return PairTerms::ZERO;
        }

        let x = &i.centroid;
        let y = &j.centroid;
        let v = utils::sub(y, x);
        let r2 = utils::dot(&v, &v);
        if r2 == 0.0 {
            return PairTerms::ZERO;
        }

        let density = self.minus_beta_half.raise(r2);
        let h = self.beta * self.minus_beta_half_minus_one.raise(r2);

        let mut first = [0.0; DATA_DIM];
        let mut second = [0.0; DATA_DIM];
        first[0] = b * (density - h * utils::dot(&v, x));
        second[0] = a * (density + h * utils::dot(&v, y));
        for k in 0..3 {
            first[1 + k] = b * h * v[k];
            second[1 + k] = -a * h * v[k];
        }

        PairTerms {
            energy: a * b * density,
            first,
            second,
        }
    }
}

/// Tangent-point kernel with the exponent representation chosen at construction.
#[derive(Debug, Clone, Copy)]
pub enum TpeKernel {
    Integer(TangentPointKernel<i32>),
    Real(TangentPointKernel<f64>),
}

impl TpeKernel {
    pub fn new(params: &TpeParams) -> Self {
        if params.integer_exponents() {
            TpeKernel::Integer(TangentPointKernel::new(params.alpha, params.beta))
        } else {
            TpeKernel::Real(TangentPointKernel::new(params.alpha, params.beta))
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, TpeKernel::Integer(_))
    }
}

/// Coulomb kernel with the exponent representation chosen at construction.
#[derive(Debug, Clone, Copy)]
pub enum CoulombKernelKind {
    Integer(CoulombKernel<i32>),
    Real(CoulombKernel<f64>),
}

impl CoulombKernelKind {
    pub fn new(params: &TpeParams) -> Self {
        if params.integer_distance_exponent() {
            CoulombKernelKind::Integer(CoulombKernel::new(params.beta))
        } else {
            CoulombKernelKind::Real(CoulombKernel::new(params.beta))
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, CoulombKernelKind::Integer(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_descriptor(rng: &mut StdRng) -> Descriptor {
        let mut normal = [0.0; 3];
        for k in 0..3 {
            normal[k] = rng.random_range(-1.0..1.0);
        }
        let length = utils::norm(&normal);
        Descriptor {
            area: rng.random_range(0.1..1.0),
            centroid: [
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            ],
            normal: normal.map(|x| x / length),
        }
    }

    #[test]
    fn int_pow_matches_powi() {
        for base in [0.0, 0.5, 1.0, 1.7, 3.0] {
            for e in -7..9 {
                let expected = f64::powi(base, e);
                let found = int_pow(base, e);
                if expected.is_finite() {
                    assert!((found - expected).abs() <= 1e-14 * expected.abs().max(1.0));
                } else {
                    assert!(found.is_infinite());
                }
            }
        }
    }

    #[test]
    fn integer_and_real_paths_agree() {
        let mut rng = StdRng::seed_from_u64(4);
        let integer = TangentPointKernel::<i32>::new(6.0, 12.0);
        let real = TangentPointKernel::<f64>::new(6.0, 12.0);

        for _ in 0..100 {
            let i = random_descriptor(&mut rng);
            let j = random_descriptor(&mut rng);
            let ti = integer.pair_terms(&i, &j);
            let tr = real.pair_terms(&i, &j);

            assert!((ti.energy - tr.energy).abs() <= 1e-12 * ti.energy.abs().max(1e-300));

            let scale = ti
                .first
                .iter()
                .chain(ti.second.iter())
                .fold(ti.energy.abs(), |s, x| s.max(x.abs()))
                .max(1e-300);
            for k in 0..DATA_DIM {
                assert!((ti.first[k] - tr.first[k]).abs() <= 1e-10 * scale);
                assert!((ti.second[k] - tr.second[k]).abs() <= 1e-10 * scale);
            }
        }
    }

    #[test]
    fn folded_pair_matches_hand_computed_density() {
        // Triangles (0,0,0),(1,0,0),(0,1,0) and (1,0,0),(0,1,0),(1,1,1).
        let i = Descriptor {
            area: 0.5,
            centroid: [1.0 / 3.0, 1.0 / 3.0, 0.0],
            normal: [0.0, 0.0, 1.0],
        };
        let s = 1.0 / 3f64.sqrt();
        let j = Descriptor {
            area: 3f64.sqrt() / 2.0,
            centroid: [2.0 / 3.0, 2.0 / 3.0, 1.0 / 3.0],
            normal: [s, s, -s],
        };

        let kernel = TangentPointKernel::<i32>::new(6.0, 12.0);
        assert!((kernel.density(&i, &j) - 28.0 / 27.0).abs() < 1e-12);
        assert!((kernel.pair_energy(&i, &j) - 0.5 * 3f64.sqrt() / 2.0 * 28.0 / 27.0).abs() < 1e-12);
        // Density is symmetric in the pair.
        assert!((kernel.density(&j, &i) - 28.0 / 27.0).abs() < 1e-12);
    }

    #[test]
    fn coplanar_and_degenerate_pairs_vanish() {
        let kernel = TangentPointKernel::<f64>::new(6.0, 12.0);
        let i = Descriptor {
            area: 0.5,
            centroid: [0.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
        };
        let mut j = Descriptor {
            area: 0.5,
            centroid: [1.0, 2.0, 0.0],
            normal: [0.0, 0.0, 1.0],
        };
        assert_eq!(kernel.density(&i, &j), 0.0);
        assert_eq!(kernel.pair_terms(&i, &j).energy, 0.0);

        assert_eq!(kernel.pair_terms(&i, &i), PairTerms::ZERO);

        j.area = 0.0;
        j.centroid = [0.0, 0.0, 1.0];
        assert_eq!(kernel.pair_terms(&i, &j), PairTerms::ZERO);
    }

    /// Central differences of the pair energy in the area weighted coordinates.
    fn check_finite_differences<K: EnergyKernel>(kernel: &K, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);

        let to_coordinates = |d: &Descriptor| -> [f64; DATA_DIM] {
            [
                d.area,
                d.area * d.centroid[0],
                d.area * d.centroid[1],
                d.area * d.centroid[2],
                d.area * d.normal[0],
                d.area * d.normal[1],
                d.area * d.normal[2],
            ]
        };
        let from_coordinates = |c: &[f64; DATA_DIM]| -> Descriptor {
            Descriptor {
                area: c[0],
                centroid: [c[1] / c[0], c[2] / c[0], c[3] / c[0]],
                normal: [c[4] / c[0], c[5] / c[0], c[6] / c[0]],
            }
        };

        for _ in 0..20 {
            let i = random_descriptor(&mut rng);
            let j = random_descriptor(&mut rng);
            let terms = kernel.pair_terms(&i, &j);
            let h = 1e-6;

            for (side, analytic) in [(0, terms.first), (1, terms.second)] {
                for k in 0..DATA_DIM {
                    let mut plus = [to_coordinates(&i), to_coordinates(&j)];
                    let mut minus = plus;
                    plus[side][k] += h;
                    minus[side][k] -= h;

                    let e_plus = kernel.pair_energy(
                        &from_coordinates(&plus[0]),
                        &from_coordinates(&plus[1]),
                    );
                    let e_minus = kernel.pair_energy(
                        &from_coordinates(&minus[0]),
                        &from_coordinates(&minus[1]),
                    );
                    let numeric = (e_plus - e_minus) / (2.0 * h);
                    let tolerance = 1e-5 * analytic[k].abs().max(terms.energy.abs()).max(1e-8);
                    assert!(
                        (numeric - analytic[k]).abs() < tolerance,
                        "slot {} of side {}: numeric {} analytic {}",
                        k,
                        side,
                        numeric,
                        analytic[k]
                    );
                }
            }
        }
    }

    #[test]
    fn pair_derivative_matches_finite_differences() {
        check_finite_differences(&TangentPointKernel::<f64>::new(3.0, 6.0), 12);
        check_finite_differences(&TangentPointKernel::<i32>::new(4.0, 8.0), 13);
    }

    #[test]
    fn coulomb_derivative_matches_finite_differences() {
        check_finite_differences(&CoulombKernel::<f64>::new(3.0), 14);
        check_finite_differences(&CoulombKernel::<i32>::new(4.0), 15);
    }

    #[test]
    fn coulomb_energy_ignores_normals() {
        let kernel = CoulombKernel::<i32>::new(4.0);
        let i = Descriptor {
            area: 0.5,
            centroid: [0.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
        };
        let mut j = Descriptor {
            area: 2.0,
            centroid: [0.0, 2.0, 0.0],
            normal: [0.0, 0.0, 1.0],
        };

        // a * b * r^-4 with r = 2.
        assert!((kernel.pair_energy(&i, &j) - 1.0 / 16.0).abs() < 1e-15);
        let terms = kernel.pair_terms(&i, &j);
        assert_eq!(terms.first[4..], [0.0; 3]);
        assert_eq!(terms.second[4..], [0.0; 3]);

        j.normal = [1.0, 0.0, 0.0];
        assert!((kernel.pair_energy(&i, &j) - 1.0 / 16.0).abs() < 1e-15);
        assert_eq!(kernel.pair_terms(&i, &i), PairTerms::ZERO);
    }

    #[test]
    fn kernel_choice_follows_params() {
        assert!(TpeKernel::new(&TpeParams::default()).is_integer());
        let params = TpeParams::builder().exponents(2.5, 7.0).build().unwrap();
        assert!(!TpeKernel::new(&params).is_integer());
        // Only beta matters for the Coulomb kernel.
        assert!(CoulombKernelKind::new(&params).is_integer());
        let params = TpeParams::builder().exponents(6.0, 7.0).build().unwrap();
        assert!(!CoulombKernelKind::new(&params).is_integer());
    }
}
