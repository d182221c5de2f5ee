//! The weighted-model-integration solver
//!
//! One `WmiSolver` owns an environment, an integrator stack composed per
//! its options, and a shared cache. Each query runs the pipeline:
//! decompose the weight, conjoin Δ = support ∧ query ∧ skeleton,
//! enumerate cells sequentially, convert each cell to a (polytope,
//! polynomial, k) job, and fan the jobs over a bounded queue to a worker
//! pool that applies the fast paths, consults the cache, dispatches to
//! the backend and scales by 2^k. Contributions are summed in exact
//! rationals for exact backends.
//!
//! Enumeration is never parallelized: the enumerator owns mutable search
//! state. The driver overlaps it with integration through the queue. A
//! query-wide cancellation token and wall-clock deadline are polled
//! between enumeration steps and between jobs; workers never abort an
//! in-flight backend call, they drain the queue and exit.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::enumerate::{CellStream, EnumeratorKind, StreamControl};
use crate::error::{WmiError, WmiResult};
use crate::formula::types::{AtomId, FormulaId, TermId, VarId};
use crate::integrate::{
    CachedIntegrator, ExactIntegrator, IntegralValue, Integrator,
    ParallelIntegrator, RejectionSampler,
};
use crate::polytope::Polytope;
use crate::weight::{self, WeightSkeleton};

/// An in-memory weighted-SMT problem: support, weight, and the declared
/// variable universe (the `declare-fun` analogue). Declared Boolean
/// atoms count toward the 2^k multiplier even when they never appear in
/// a formula; declared reals join the integration domain.
#[derive(Debug, Clone)]
pub struct WmiProblem {
    pub support: FormulaId,
    pub weight: TermId,
    pub bool_atoms: BTreeSet<AtomId>,
    pub real_vars: BTreeSet<VarId>,
}

impl WmiProblem {
    pub fn new(support: FormulaId, weight: TermId) -> Self {
        Self {
            support,
            weight,
            bool_atoms: BTreeSet::new(),
            real_vars: BTreeSet::new(),
        }
    }

    pub fn declare_bool(mut self, atom: AtomId) -> Self {
        self.bool_atoms.insert(atom);
        self
    }

    pub fn declare_real(mut self, var: VarId) -> Self {
        self.real_vars.insert(var);
        self
    }
}

/// Base integration backend selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BackendKind {
    Exact,
    Sampling { seed: u64, samples: usize },
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Exact
    }
}

/// Solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    pub enumerator: EnumeratorKind,
    pub backend: BackendKind,
    /// Integration worker pool width
    pub workers: usize,
    pub enable_cache: bool,
    /// Flat-file cache persistence location
    pub cache_path: Option<PathBuf>,
    /// Query wall-clock deadline
    pub timeout: Option<Duration>,
    /// Per-integration-job deadline
    pub job_timeout: Option<Duration>,
    /// With a job deadline, expired jobs contribute zero instead of
    /// failing the query; the outcome is flagged partial
    pub best_effort: bool,
    /// Bound of the enumeration→integration job queue
    pub queue_depth: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            enumerator: EnumeratorKind::default(),
            backend: BackendKind::default(),
            workers: num_cpus::get(),
            enable_cache: true,
            cache_path: None,
            timeout: None,
            job_timeout: None,
            best_effort: false,
            queue_depth: 64,
        }
    }
}

/// Per-query statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryStats {
    pub cells: u64,
    pub box_fast_path: u64,
    pub zero_weight_skips: u64,
    pub empty_cell_skips: u64,
    pub backend_dispatches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub elapsed: Duration,
}

/// Result of one WMI query
#[derive(Debug, Clone)]
pub struct WmiOutcome {
    pub value: IntegralValue,
    /// Some job deadlines expired under best-effort mode; the value is
    /// a lower bound
    pub partial: bool,
    pub stats: QueryStats,
}

struct Job {
    polytope: Polytope,
    polynomial: Arc<crate::polynomial::Polynomial>,
    free_bools: u32,
}

enum WorkerMsg {
    Value(IntegralValue),
    Expired,
    Failed(WmiError),
}

/// Shared fast-path counters for one pipeline run
#[derive(Default)]
struct Counters {
    box_fast_path: AtomicU64,
    zero_weight_skips: AtomicU64,
    empty_cell_skips: AtomicU64,
    backend_dispatches: AtomicU64,
}

struct PipelineOutcome {
    value: IntegralValue,
    cells: u64,
    partial: bool,
    box_fast_path: u64,
    zero_weight_skips: u64,
    empty_cell_skips: u64,
    backend_dispatches: u64,
}

pub struct WmiSolver {
    env: Arc<Environment>,
    options: SolverOptions,
    integrator: Arc<dyn Integrator>,
    cache: Option<Arc<CachedIntegrator>>,
}

impl WmiSolver {
    pub fn new(options: SolverOptions) -> WmiResult<Self> {
        if options.queue_depth == 0 {
            return Err(WmiError::NoEnumerator {
                detail: "job queue depth must be positive".to_string(),
            });
        }
        if options.workers == 0 {
            return Err(WmiError::NoIntegrator {
                detail: "worker pool width must be positive".to_string(),
            });
        }
        let base: Arc<dyn Integrator> = match options.backend {
            BackendKind::Exact => Arc::new(ExactIntegrator),
            BackendKind::Sampling { seed, samples } => {
                if samples == 0 {
                    return Err(WmiError::NoIntegrator {
                        detail: "sampling backend needs a positive sample \
                                 count"
                            .to_string(),
                    });
                }
                Arc::new(RejectionSampler::new(seed, samples))
            }
        };
        let (integrator, cache) = if options.enable_cache {
            let cached = Arc::new(CachedIntegrator::new(base));
            if let Some(path) = &options.cache_path {
                if path.exists() {
                    match cached.load(path) {
                        Ok(n) => log::debug!("loaded {n} cached integrals"),
                        Err(e) => {
                            log::warn!("cache load failed, starting cold: {e}")
                        }
                    }
                }
            }
            (cached.clone() as Arc<dyn Integrator>, Some(cached))
        } else {
            (base, None)
        };
        Ok(Self {
            env: Arc::new(Environment::new()),
            options,
            integrator,
            cache,
        })
    }

    /// The environment all formulas for this solver must be built in.
    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Direct integration surface: the solver's stack behind a
    /// batch-parallel wrapper of the configured width.
    pub fn integrator(&self) -> Arc<dyn Integrator> {
        Arc::new(ParallelIntegrator::new(
            self.integrator.clone(),
            self.options.workers,
        ))
    }

    /// Write the cache to the configured path.
    pub fn persist_cache(&self) -> std::io::Result<usize> {
        match (&self.cache, &self.options.cache_path) {
            (Some(cache), Some(path)) => cache.persist(path),
            _ => Ok(0),
        }
    }

    /// WMI(support ∧ query, weight).
    pub fn compute(
        &self,
        problem: &WmiProblem,
        query: FormulaId,
    ) -> WmiResult<WmiOutcome> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.compute_cancellable(problem, query, &cancel)
    }

    /// Several queries against the same support and weight; the cache
    /// carries over between them.
    pub fn compute_many(
        &self,
        problem: &WmiProblem,
        queries: &[FormulaId],
    ) -> WmiResult<Vec<WmiOutcome>> {
        queries.iter().map(|q| self.compute(problem, *q)).collect()
    }

    /// `compute` with an external cancellation token.
    pub fn compute_cancellable(
        &self,
        problem: &WmiProblem,
        query: FormulaId,
        cancel: &Arc<AtomicBool>,
    ) -> WmiResult<WmiOutcome> {
        let started = Instant::now();
        let deadline = self.options.timeout.map(|t| started + t);
        let env = &self.env;

        let skeleton = Arc::new(weight::decompose(env, problem.weight)?);
        let delta =
            env.and(vec![problem.support, query, skeleton.skeleton()]);
        log::debug!(
            "query over Δ {:?}: {} atom(s), {} label(s)",
            delta,
            env.atoms_of(delta).len(),
            skeleton.label_count()
        );

        // declared Boolean universe: declarations plus every
        // propositional non-label atom of Δ
        let mut universe = problem.bool_atoms.clone();
        for atom in env.atoms_of(delta).iter() {
            let kind = env.atom_kind(*atom);
            if kind.is_propositional() && !kind.is_label() {
                universe.insert(*atom);
            }
        }

        // integration domain, fixed for the whole query
        let mut domain: BTreeSet<VarId> = problem.real_vars.clone();
        domain.extend(env.reals_of(delta).iter().copied());
        domain.extend(env.term_reals_of(problem.weight).iter().copied());
        let domain: Vec<VarId> = domain.into_iter().collect();

        let ctl = StreamControl::new(Some(cancel.clone()), deadline);
        let stream = CellStream::start(
            self.options.enumerator,
            env.clone(),
            delta,
            universe,
            Some(skeleton.skeleton()),
            ctl,
        );

        let cache_before = self.cache.as_ref().map(|c| c.stats());
        let outcome = self.run_pipeline(stream, &skeleton, &domain, cancel)?;

        let mut stats = QueryStats {
            cells: outcome.cells,
            box_fast_path: outcome.box_fast_path,
            zero_weight_skips: outcome.zero_weight_skips,
            empty_cell_skips: outcome.empty_cell_skips,
            backend_dispatches: outcome.backend_dispatches,
            elapsed: started.elapsed(),
            ..QueryStats::default()
        };
        if let (Some(cache), Some((h0, m0))) = (&self.cache, cache_before) {
            let (h1, m1) = cache.stats();
            stats.cache_hits = h1 - h0;
            stats.cache_misses = m1 - m0;
        }
        log::debug!(
            "query done: {} cell(s), {} backend dispatch(es), {:?}",
            stats.cells,
            stats.backend_dispatches,
            stats.elapsed
        );
        Ok(WmiOutcome {
            value: outcome.value,
            partial: outcome.partial,
            stats,
        })
    }

    /// Enumerate, convert, and integrate: the producer runs on the
    /// calling thread, workers drain the bounded queue.
    fn run_pipeline(
        &self,
        mut stream: CellStream,
        skeleton: &Arc<WeightSkeleton>,
        domain: &[VarId],
        cancel: &Arc<AtomicBool>,
    ) -> WmiResult<PipelineOutcome> {
        let counters = Counters::default();
        let partial = AtomicBool::new(false);
        let (job_tx, job_rx) =
            mpsc::sync_channel::<Job>(self.options.queue_depth);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (msg_tx, msg_rx) = mpsc::channel::<WorkerMsg>();

        let mut cells: u64 = 0;
        let mut first_error: Option<WmiError> = None;

        thread::scope(|scope| {
            for _ in 0..self.options.workers {
                let job_rx = job_rx.clone();
                let msg_tx = msg_tx.clone();
                let counters = &counters;
                let partial = &partial;
                let cancel = cancel.clone();
                scope.spawn(move || loop {
                    let job = {
                        let rx = job_rx.lock().unwrap();
                        rx.recv()
                    };
                    let job = match job {
                        Ok(j) => j,
                        Err(_) => break,
                    };
                    if cancel.load(Ordering::Relaxed) {
                        // drain the queue so the producer never blocks
                        continue;
                    }
                    let msg = self.integrate_cell(&job, counters, partial);
                    if msg_tx.send(msg).is_err() {
                        break;
                    }
                });
            }
            drop(msg_tx);

            // sequential producer: enumeration and cell conversion
            for item in stream.by_ref() {
                let cell = match item {
                    Ok(c) => c,
                    Err(e) => {
                        cancel.store(true, Ordering::Relaxed);
                        first_error = Some(e);
                        break;
                    }
                };
                cells += 1;
                let polynomial = match skeleton
                    .polynomial_for(&self.env, &cell.assignment)
                {
                    Ok(p) => p,
                    Err(e) => {
                        cancel.store(true, Ordering::Relaxed);
                        first_error = Some(e);
                        break;
                    }
                };
                let polytope = Polytope::from_assignment(
                    &self.env,
                    &cell.assignment,
                    domain.to_vec(),
                );
                let job = Job {
                    polytope,
                    polynomial,
                    free_bools: cell.free_bools,
                };
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });

        // workers have exited; fold their messages
        let mut total = match self.options.backend {
            BackendKind::Exact => IntegralValue::exact_zero(),
            BackendKind::Sampling { .. } => IntegralValue::Approx(0.0),
        };
        for msg in msg_rx.iter() {
            match msg {
                WorkerMsg::Value(v) => total = total.add(&v),
                WorkerMsg::Expired => {}
                WorkerMsg::Failed(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(PipelineOutcome {
                value: total,
                cells,
                partial: partial.load(Ordering::Relaxed),
                box_fast_path: counters.box_fast_path.load(Ordering::Relaxed),
                zero_weight_skips: counters
                    .zero_weight_skips
                    .load(Ordering::Relaxed),
                empty_cell_skips: counters
                    .empty_cell_skips
                    .load(Ordering::Relaxed),
                backend_dispatches: counters
                    .backend_dispatches
                    .load(Ordering::Relaxed),
            }),
        }
    }

    /// Worker-side handling of one cell: fast paths in order, then the
    /// configured integrator, then the 2^k multiplier.
    fn integrate_cell(
        &self,
        job: &Job,
        counters: &Counters,
        partial: &AtomicBool,
    ) -> WorkerMsg {
        let job_started = Instant::now();
        if job.polynomial.is_zero() {
            counters.zero_weight_skips.fetch_add(1, Ordering::Relaxed);
            return WorkerMsg::Value(IntegralValue::exact_zero());
        }
        if let Some(axes) = job.polytope.intervals() {
            if axes.iter().any(|(_, lo, hi)| hi <= lo) {
                counters.empty_cell_skips.fetch_add(1, Ordering::Relaxed);
                return WorkerMsg::Value(IntegralValue::exact_zero());
            }
            if let Some(c) = job.polynomial.as_constant() {
                counters.box_fast_path.fetch_add(1, Ordering::Relaxed);
                let mut volume = c;
                for (_, lo, hi) in &axes {
                    volume *= hi - lo;
                }
                return WorkerMsg::Value(
                    IntegralValue::Exact(volume).scale_pow2(job.free_bools),
                );
            }
        }
        counters.backend_dispatches.fetch_add(1, Ordering::Relaxed);
        let result = self
            .integrator
            .integrate(&job.polytope, &job.polynomial);
        if let Some(limit) = self.options.job_timeout {
            if job_started.elapsed() > limit {
                if self.options.best_effort {
                    log::warn!(
                        "integration job exceeded {limit:?}; contributing \
                         zero (best-effort)"
                    );
                    partial.store(true, Ordering::Relaxed);
                    return WorkerMsg::Expired;
                }
                return WorkerMsg::Failed(WmiError::Timeout {
                    elapsed: job_started.elapsed(),
                });
            }
        }
        match result {
            Ok(v) => WorkerMsg::Value(v.scale_pow2(job.free_bools)),
            Err(e) => WorkerMsg::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_construction_validation() {
        assert!(WmiSolver::new(SolverOptions::default()).is_ok());

        let mut bad = SolverOptions::default();
        bad.workers = 0;
        assert!(matches!(
            WmiSolver::new(bad),
            Err(WmiError::NoIntegrator { .. })
        ));

        let mut bad = SolverOptions::default();
        bad.queue_depth = 0;
        assert!(matches!(
            WmiSolver::new(bad),
            Err(WmiError::NoEnumerator { .. })
        ));

        let mut bad = SolverOptions::default();
        bad.backend = BackendKind::Sampling {
            seed: 0,
            samples: 0,
        };
        assert!(matches!(
            WmiSolver::new(bad),
            Err(WmiError::NoIntegrator { .. })
        ));
    }

    #[test]
    fn test_boolean_only_problem() {
        // (a ∨ b) with weight 1 over no reals: three models, mass 3
        let solver = WmiSolver::new(SolverOptions::default()).unwrap();
        let env = solver.environment().clone();
        let a = env.bool_atom("a");
        let b = env.bool_atom("b");
        let support = env.or(vec![env.atom(a), env.atom(b)]);
        let problem = WmiProblem::new(support, env.int(1))
            .declare_bool(a)
            .declare_bool(b);
        let outcome = solver.compute(&problem, env.top()).unwrap();
        assert_eq!(outcome.value.to_f64(), 3.0);
        assert!(!outcome.partial);
    }

    #[test]
    fn test_unsupported_weight_surfaces_at_compute() {
        let solver = WmiSolver::new(SolverOptions::default()).unwrap();
        let env = solver.environment().clone();
        let x = env.var_term(env.real_var("x"));
        let problem = WmiProblem::new(env.top(), env.div(env.int(1), x));
        assert!(matches!(
            solver.compute(&problem, env.top()),
            Err(WmiError::UnsupportedWeight { .. })
        ));
    }
}
