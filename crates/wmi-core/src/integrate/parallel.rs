//! Batch-parallel wrapper over any integrator
//!
//! Single integrations pass straight through; batches fan out across a
//! fixed number of scoped worker threads pulling jobs off a shared
//! counter. Workers are stateless with respect to each other; sharing a
//! cached inner integrator gives the single-writer-per-key discipline
//! from the cache's single-flight slots.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::WmiResult;
use crate::integrate::{IntegralValue, Integrator};
use crate::polynomial::Polynomial;
use crate::polytope::Polytope;

pub struct ParallelIntegrator {
    inner: Arc<dyn Integrator>,
    workers: usize,
}

impl ParallelIntegrator {
    pub fn new(inner: Arc<dyn Integrator>, workers: usize) -> Self {
        Self {
            inner,
            workers: workers.max(1),
        }
    }
}

impl Integrator for ParallelIntegrator {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn integrate(
        &self,
        polytope: &Polytope,
        polynomial: &Polynomial,
    ) -> WmiResult<IntegralValue> {
        self.inner.integrate(polytope, polynomial)
    }

    fn integrate_batch(
        &self,
        jobs: &[(Polytope, Polynomial)],
    ) -> WmiResult<Vec<IntegralValue>> {
        if self.workers == 1 || jobs.len() <= 1 {
            return self.inner.integrate_batch(jobs);
        }
        let next = AtomicUsize::new(0);
        let results: Mutex<Vec<Option<WmiResult<IntegralValue>>>> =
            Mutex::new(vec![None; jobs.len()]);
        thread::scope(|scope| {
            for _ in 0..self.workers.min(jobs.len()) {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= jobs.len() {
                        break;
                    }
                    let (polytope, polynomial) = &jobs[i];
                    let r = self.inner.integrate(polytope, polynomial);
                    results.lock().unwrap()[i] = Some(r);
                });
            }
        });
        results
            .into_inner()
            .unwrap()
            .into_iter()
            .map(|r| r.expect("every batch slot is filled"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::types::VarId;
    use crate::integrate::ExactIntegrator;
    use crate::polytope::HalfSpace;
    use num_bigint::BigInt;
    use num_rational::BigRational;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    fn interval(hi: i64) -> Polytope {
        Polytope::new(
            vec![VarId(0)],
            vec![
                HalfSpace {
                    coeffs: vec![(VarId(0), q(1, 1))],
                    bound: q(hi, 1),
                    strict: false,
                },
                HalfSpace {
                    coeffs: vec![(VarId(0), q(-1, 1))],
                    bound: q(0, 1),
                    strict: false,
                },
            ],
        )
    }

    #[test]
    fn test_batch_matches_sequential() {
        let jobs: Vec<(Polytope, Polynomial)> = (1..=8)
            .map(|hi| (interval(hi), Polynomial::one()))
            .collect();
        let base = Arc::new(ExactIntegrator);
        let sequential = base.integrate_batch(&jobs).unwrap();
        let parallel = ParallelIntegrator::new(base, 4)
            .integrate_batch(&jobs)
            .unwrap();
        assert_eq!(sequential, parallel);
        assert_eq!(parallel[2], IntegralValue::Exact(q(3, 1)));
    }
}
