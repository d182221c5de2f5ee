//! Seeded rejection sampling over the bounding box
//!
//! The axis-aligned bounding box comes from the same Fourier–Motzkin
//! projection the exact backend uses, so unbounded regions are rejected
//! identically. Points are drawn uniformly from the box; those inside
//! the polytope contribute the integrand's value. Results are
//! reproducible for a fixed seed when run single-threaded; under the
//! parallel wrapper they are deterministic only up to the associativity
//! of floating-point addition.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::enumerate::lra::{self, Row};
use crate::error::{WmiError, WmiResult};
use crate::integrate::{IntegralValue, Integrator};
use crate::polynomial::{rational_to_f64, Polynomial};
use crate::polytope::Polytope;

/// Monte-Carlo backend with a fixed seed and sample count
#[derive(Debug, Clone, Copy)]
pub struct RejectionSampler {
    pub seed: u64,
    pub samples: usize,
}

impl Default for RejectionSampler {
    fn default() -> Self {
        Self {
            seed: 0,
            samples: 100_000,
        }
    }
}

impl RejectionSampler {
    pub fn new(seed: u64, samples: usize) -> Self {
        Self { seed, samples }
    }
}

impl Integrator for RejectionSampler {
    fn name(&self) -> &'static str {
        "rejection-sampling"
    }

    fn integrate(
        &self,
        polytope: &Polytope,
        polynomial: &Polynomial,
    ) -> WmiResult<IntegralValue> {
        if polynomial.is_zero() || self.samples == 0 {
            return Ok(IntegralValue::Approx(0.0));
        }
        let rows: Vec<Row> = polytope
            .half_spaces()
            .iter()
            .map(Row::from_half_space)
            .collect();

        let mut box_volume = 1.0;
        let mut axes = Vec::with_capacity(polytope.dimension());
        for v in polytope.vars() {
            let bounds = match lra::variable_bounds(&rows, *v) {
                None => return Ok(IntegralValue::Approx(0.0)),
                Some(b) => b,
            };
            let (lo, hi) = match (bounds.lower, bounds.upper) {
                (Some((lo, _)), Some((hi, _))) => {
                    (rational_to_f64(&lo), rational_to_f64(&hi))
                }
                _ => {
                    return Err(WmiError::UnboundedRegion {
                        variable: format!("v{}", v.index()),
                    })
                }
            };
            if hi <= lo {
                return Ok(IntegralValue::Approx(0.0));
            }
            box_volume *= hi - lo;
            axes.push((*v, lo, hi));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut accumulated = 0.0;
        let mut point: HashMap<_, f64> = HashMap::with_capacity(axes.len());
        for _ in 0..self.samples {
            for (v, lo, hi) in &axes {
                point.insert(*v, rng.gen_range(*lo..*hi));
            }
            let inside = polytope
                .half_spaces()
                .iter()
                .all(|h| h.holds_at_f64(&point));
            if inside {
                accumulated += polynomial.eval_f64(&point);
            }
        }
        let mean = accumulated / self.samples as f64;
        Ok(IntegralValue::Approx(mean * box_volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::types::VarId;
    use crate::polytope::HalfSpace;
    use num_bigint::BigInt;
    use num_rational::BigRational;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    fn triangle() -> Polytope {
        Polytope::new(
            vec![VarId(0), VarId(1)],
            vec![
                HalfSpace {
                    coeffs: vec![(VarId(0), q(-1, 1))],
                    bound: q(0, 1),
                    strict: false,
                },
                HalfSpace {
                    coeffs: vec![(VarId(1), q(-1, 1))],
                    bound: q(0, 1),
                    strict: false,
                },
                HalfSpace {
                    coeffs: vec![(VarId(0), q(1, 1)), (VarId(1), q(1, 1))],
                    bound: q(1, 1),
                    strict: false,
                },
            ],
        )
    }

    #[test]
    fn test_triangle_volume_estimate() {
        let sampler = RejectionSampler::new(7, 60_000);
        let v = sampler
            .integrate(&triangle(), &Polynomial::one())
            .unwrap()
            .to_f64();
        assert!((v - 0.5).abs() < 0.02, "estimate {v} too far from 1/2");
    }

    #[test]
    fn test_seed_reproducibility() {
        let sampler = RejectionSampler::new(99, 10_000);
        let p = Polynomial::variable(VarId(0));
        let a = sampler.integrate(&triangle(), &p).unwrap();
        let b = sampler.integrate(&triangle(), &p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unbounded_rejected() {
        let p = Polytope::new(
            vec![VarId(0)],
            vec![HalfSpace {
                coeffs: vec![(VarId(0), q(-1, 1))],
                bound: q(0, 1),
                strict: false,
            }],
        );
        let sampler = RejectionSampler::default();
        assert!(matches!(
            sampler.integrate(&p, &Polynomial::one()),
            Err(WmiError::UnboundedRegion { .. })
        ));
    }
}
