//! wmi-core — weighted model integration over mixed Boolean/LRA domains
//!
//! Computes WMI(χ ∧ φ, w) = Σ_{μ ⊨ χ∧φ} ∫_μ w(x) dx: the sum, over the
//! truth assignments satisfying a support χ and query φ, of the integral
//! of a piecewise-polynomial weight w over the polytope carved out by
//! each assignment's linear-arithmetic literals.
//!
//! The pipeline: a weight decomposer splits w into a Boolean skeleton of
//! conditional labels plus polynomial leaves; an enumerator streams
//! disjoint (partial) truth assignments of support ∧ query ∧ skeleton;
//! each cell becomes an H-polytope and a polynomial; an integration
//! dispatcher with caching, fast paths, and a worker pool accumulates
//! 2^k-weighted contributions.

pub mod environment;
pub mod enumerate;
pub mod error;
pub mod formula;
pub mod integrate;
pub mod polynomial;
pub mod polytope;
pub mod solver;
pub mod weight;

pub use environment::Environment;
pub use enumerate::{Cell, CellStream, EnumState, EnumeratorKind, StreamControl};
pub use error::{WmiError, WmiResult};
pub use formula::{
    AtomId, AtomKind, Formula, FormulaId, Lit, Term, TermId, TruthAssignment,
    VarId,
};
pub use integrate::{
    CachedIntegrator, ExactIntegrator, IntegralValue, Integrator,
    ParallelIntegrator, RejectionSampler,
};
pub use polynomial::Polynomial;
pub use polytope::{HalfSpace, Polytope};
pub use solver::{
    BackendKind, QueryStats, SolverOptions, WmiOutcome, WmiProblem, WmiSolver,
};
pub use weight::{decompose, WeightSkeleton};

/// Version of the cache fingerprint scheme; bump when the canonical key
/// format changes so persisted caches are not reused across versions.
pub const CACHE_FORMAT_VERSION: u32 = 1;
