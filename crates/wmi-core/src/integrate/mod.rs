//! Integration backends and their composable wrappers
//!
//! A base integrator maps one (polytope, polynomial) pair to a number.
//! Wrappers — cache, batch parallelism — implement the same trait and
//! compose around any backend; the solver stacks them according to its
//! options.

pub mod cache;
pub mod exact;
pub mod parallel;
pub mod sampling;

use num_rational::BigRational;
use num_traits::Zero;

use crate::error::WmiResult;
use crate::polynomial::{rational_to_f64, Polynomial};
use crate::polytope::Polytope;

pub use cache::CachedIntegrator;
pub use exact::ExactIntegrator;
pub use parallel::ParallelIntegrator;
pub use sampling::RejectionSampler;

/// An integral contribution: exact backends stay in rationals, sampling
/// backends live in floats. Mixing degrades to float.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegralValue {
    Exact(BigRational),
    Approx(f64),
}

impl IntegralValue {
    pub fn exact_zero() -> Self {
        Self::Exact(BigRational::zero())
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Self::Exact(q) => q.is_zero(),
            Self::Approx(x) => *x == 0.0,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Self::Exact(q) => rational_to_f64(q),
            Self::Approx(x) => *x,
        }
    }

    pub fn as_exact(&self) -> Option<&BigRational> {
        match self {
            Self::Exact(q) => Some(q),
            Self::Approx(_) => None,
        }
    }

    pub fn add(&self, other: &IntegralValue) -> IntegralValue {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => Self::Exact(a + b),
            _ => Self::Approx(self.to_f64() + other.to_f64()),
        }
    }

    /// Multiply by 2^k, the totalization count of a partial assignment.
    pub fn scale_pow2(&self, k: u32) -> IntegralValue {
        match self {
            Self::Exact(q) => {
                use num_traits::One;
                let factor = BigRational::from_integer(
                    num_bigint::BigInt::one() << (k as usize),
                );
                Self::Exact(q * factor)
            }
            Self::Approx(x) => Self::Approx(x * (k as f64).exp2()),
        }
    }
}

/// A pluggable integration backend over rational H-representations
pub trait Integrator: Send + Sync {
    fn name(&self) -> &'static str;

    fn integrate(
        &self,
        polytope: &Polytope,
        polynomial: &Polynomial,
    ) -> WmiResult<IntegralValue>;

    /// Eagerly consumed batch variant; blocks until every job is done.
    fn integrate_batch(
        &self,
        jobs: &[(Polytope, Polynomial)],
    ) -> WmiResult<Vec<IntegralValue>> {
        jobs.iter()
            .map(|(p, f)| self.integrate(p, f))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    #[test]
    fn test_value_combination() {
        let a = IntegralValue::Exact(q(1, 2));
        let b = IntegralValue::Exact(q(1, 3));
        assert_eq!(a.add(&b), IntegralValue::Exact(q(5, 6)));

        // mixing exact and sampled degrades to float
        let c = IntegralValue::Approx(0.25);
        match a.add(&c) {
            IntegralValue::Approx(x) => assert!((x - 0.75).abs() < 1e-12),
            other => panic!("expected a float, got {other:?}"),
        }
    }

    #[test]
    fn test_pow2_scaling() {
        let v = IntegralValue::Exact(q(1, 2)).scale_pow2(4);
        assert_eq!(v, IntegralValue::Exact(q(8, 1)));
        let v = IntegralValue::Approx(0.5).scale_pow2(3);
        assert_eq!(v, IntegralValue::Approx(4.0));
    }
}
