//! Truth-assignment enumeration
//!
//! Both enumerators stream pairs (μ, k): a truth assignment over the
//! atoms of Δ = support ∧ query ∧ skeleton, and the number of declared
//! Boolean atoms μ leaves free. The disjoint union of the 2^k
//! totalizations of all emitted cells is exactly the theory-consistent
//! model set of Δ over the declared universe.
//!
//! The search owns all solver state; consumers drive progress through
//! the iterator and may stop early, dropping the stream and its state.
//! Cancellation is cooperative: the flag is polled between steps and the
//! step in flight completes.

pub mod lra;
mod structure;
mod total;
mod trail;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::environment::Environment;
use crate::error::{WmiError, WmiResult};
use crate::formula::types::{AtomId, Formula, FormulaId, TruthAssignment};

pub use structure::StructureSearch;
pub use total::TotalSearch;

/// Which enumerator variant a solver runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum EnumeratorKind {
    /// Every atom of Δ assigned in every cell; k = 0
    Total,
    /// Atoms that cannot influence Δ stay unassigned; k ≥ 0
    #[default]
    StructureAware,
}

/// Lifecycle of an enumeration stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumState {
    /// No stream constructed yet
    Idle,
    /// Constructed, no cell requested
    Preparing,
    Streaming,
    Done,
    Errored,
}

/// One enumerated cell: a partial assignment and its free Boolean count
#[derive(Debug, Clone)]
pub struct Cell {
    pub assignment: TruthAssignment,
    pub free_bools: u32,
}

/// Cancellation flag plus wall-clock deadline, polled between steps
#[derive(Clone)]
pub struct StreamControl {
    cancel: Arc<AtomicBool>,
    external: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    started_at: Instant,
}

impl StreamControl {
    pub fn new(
        external: Option<Arc<AtomicBool>>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            external,
            deadline,
            started_at: Instant::now(),
        }
    }

    pub fn unrestricted() -> Self {
        Self::new(None, None)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn check(&self) -> WmiResult<()> {
        if self.cancel.load(Ordering::Relaxed)
            || self
                .external
                .as_ref()
                .is_some_and(|c| c.load(Ordering::Relaxed))
        {
            return Err(WmiError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(WmiError::Timeout {
                    elapsed: self.started_at.elapsed(),
                });
            }
        }
        Ok(())
    }
}

/// A backtracking search producing cells one at a time
pub(crate) trait Search: Send {
    fn next_cell(&mut self, ctl: &StreamControl) -> Option<WmiResult<Cell>>;
}

/// Iterator over the cells of one enumeration, with the lifecycle state
/// machine and the emitted-cell blocking store
pub struct CellStream {
    engine: Box<dyn Search>,
    ctl: StreamControl,
    state: EnumState,
    emitted: Vec<TruthAssignment>,
}

impl CellStream {
    /// Start an enumeration of Δ over the given declared Boolean
    /// universe. The skeleton, when present, steers the LRA decision
    /// order.
    pub fn start(
        kind: EnumeratorKind,
        env: Arc<Environment>,
        delta: FormulaId,
        declared_bools: BTreeSet<AtomId>,
        skeleton: Option<FormulaId>,
        ctl: StreamControl,
    ) -> Self {
        let order = DecisionOrder::build(&env, delta, skeleton);
        let engine: Box<dyn Search> = match kind {
            EnumeratorKind::Total => {
                Box::new(TotalSearch::new(env, delta, declared_bools, order))
            }
            EnumeratorKind::StructureAware => Box::new(StructureSearch::new(
                env,
                delta,
                declared_bools,
                order,
            )),
        };
        Self {
            engine,
            ctl,
            state: EnumState::Preparing,
            emitted: Vec::new(),
        }
    }

    pub fn state(&self) -> EnumState {
        self.state
    }

    /// Cooperative cancellation; the next `next()` returns `Cancelled`.
    pub fn cancel(&self) {
        self.ctl.cancel();
    }

    pub fn cells_emitted(&self) -> usize {
        self.emitted.len()
    }
}

impl Iterator for CellStream {
    type Item = WmiResult<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            EnumState::Done | EnumState::Errored => return None,
            _ => self.state = EnumState::Streaming,
        }
        match self.engine.next_cell(&self.ctl) {
            None => {
                self.state = EnumState::Done;
                None
            }
            Some(Err(e)) => {
                self.state = EnumState::Errored;
                Some(Err(e))
            }
            Some(Ok(cell)) => {
                // Every pair of emitted cells must disagree on some
                // assigned atom; the stored cells are the blocking set.
                if cfg!(debug_assertions) {
                    if let Some(prior) = self
                        .emitted
                        .iter()
                        .find(|prior| !prior.conflicts_with(&cell.assignment))
                    {
                        self.state = EnumState::Errored;
                        return Some(Err(WmiError::inconsistency(format!(
                            "overlapping cells emitted: {prior:?} and {:?}",
                            cell.assignment
                        ))));
                    }
                }
                self.emitted.push(cell.assignment.clone());
                Some(Ok(cell))
            }
        }
    }
}

/// Precomputed decision order: propositional atoms by descending
/// occurrence count, then LRA atoms by first-appearance depth in the
/// skeleton and in Δ.
pub(crate) struct DecisionOrder {
    pub order: Vec<AtomId>,
    pub rank: HashMap<AtomId, usize>,
}

impl DecisionOrder {
    pub fn build(
        env: &Environment,
        delta: FormulaId,
        skeleton: Option<FormulaId>,
    ) -> Self {
        let mut counts: HashMap<AtomId, u64> = HashMap::new();
        occurrence_counts(env, delta, &mut counts, &mut HashSet::new());

        let mut skel_depth: HashMap<AtomId, u32> = HashMap::new();
        if let Some(s) = skeleton {
            appearance_depths(env, s, 0, &mut skel_depth, &mut HashSet::new());
        }
        let mut delta_depth: HashMap<AtomId, u32> = HashMap::new();
        appearance_depths(env, delta, 0, &mut delta_depth, &mut HashSet::new());

        let mut props: Vec<AtomId> = Vec::new();
        let mut lras: Vec<AtomId> = Vec::new();
        for atom in env.atoms_of(delta).iter().copied() {
            if env.atom_kind(atom).is_linear() {
                lras.push(atom);
            } else {
                props.push(atom);
            }
        }
        props.sort_by_key(|a| {
            (std::cmp::Reverse(counts.get(a).copied().unwrap_or(0)), *a)
        });
        lras.sort_by_key(|a| {
            (
                skel_depth.get(a).copied().unwrap_or(u32::MAX),
                delta_depth.get(a).copied().unwrap_or(u32::MAX),
                *a,
            )
        });

        let order: Vec<AtomId> = props.into_iter().chain(lras).collect();
        let rank = order.iter().enumerate().map(|(i, a)| (*a, i)).collect();
        Self { order, rank }
    }

    /// The highest-priority candidate among a residual's free atoms.
    pub fn pick<'a>(
        &self,
        candidates: impl Iterator<Item = &'a AtomId>,
    ) -> Option<AtomId> {
        candidates
            .copied()
            .min_by_key(|a| self.rank.get(a).copied().unwrap_or(usize::MAX))
    }
}

fn occurrence_counts(
    env: &Environment,
    f: FormulaId,
    counts: &mut HashMap<AtomId, u64>,
    visited: &mut HashSet<FormulaId>,
) {
    if !visited.insert(f) {
        return;
    }
    match env.formula(f) {
        Formula::True | Formula::False => {}
        Formula::Lit(l) => *counts.entry(l.atom).or_insert(0) += 1,
        Formula::Not(g) => occurrence_counts(env, g, counts, visited),
        Formula::And(kids) | Formula::Or(kids) => {
            for k in kids {
                occurrence_counts(env, k, counts, visited);
            }
        }
        Formula::Implies(a, b) | Formula::Iff(a, b) | Formula::Xor(a, b) => {
            occurrence_counts(env, a, counts, visited);
            occurrence_counts(env, b, counts, visited);
        }
        Formula::Ite(c, t, e) => {
            occurrence_counts(env, c, counts, visited);
            occurrence_counts(env, t, counts, visited);
            occurrence_counts(env, e, counts, visited);
        }
    }
}

fn appearance_depths(
    env: &Environment,
    f: FormulaId,
    depth: u32,
    depths: &mut HashMap<AtomId, u32>,
    visited: &mut HashSet<FormulaId>,
) {
    if !visited.insert(f) {
        return;
    }
    match env.formula(f) {
        Formula::True | Formula::False => {}
        Formula::Lit(l) => {
            depths.entry(l.atom).or_insert(depth);
        }
        Formula::Not(g) => appearance_depths(env, g, depth + 1, depths, visited),
        Formula::And(kids) | Formula::Or(kids) => {
            for k in kids {
                appearance_depths(env, k, depth + 1, depths, visited);
            }
        }
        Formula::Implies(a, b) | Formula::Iff(a, b) | Formula::Xor(a, b) => {
            appearance_depths(env, a, depth + 1, depths, visited);
            appearance_depths(env, b, depth + 1, depths, visited);
        }
        Formula::Ite(c, t, e) => {
            appearance_depths(env, c, depth + 1, depths, visited);
            appearance_depths(env, t, depth + 1, depths, visited);
            appearance_depths(env, e, depth + 1, depths, visited);
        }
    }
}
