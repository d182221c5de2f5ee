//! Shared decision trail for the enumeration searches
//!
//! A chronological trail of atom decisions with per-level residuals and
//! the asserted LRA rows. A theory-infeasible assertion forces the
//! residual to ⊥ at that level, so the search backtracks without ever
//! emitting a theory-inconsistent cell. Flipping re-derives the residual
//! from the parent level, which keeps backtracking exact.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::environment::Environment;
use crate::enumerate::lra::{self, Row};
use crate::error::{WmiError, WmiResult};
use crate::formula::transform::substitute_atom;
use crate::formula::types::{AtomId, AtomKind, FormulaId, TruthAssignment};

struct Frame {
    atom: AtomId,
    value: bool,
    flippable: bool,
    pushed_row: bool,
    skipped: bool,
}

pub(crate) struct Trail {
    env: Arc<Environment>,
    frames: Vec<Frame>,
    /// `residuals[i]` is Δ simplified under the first `i` frames
    residuals: Vec<FormulaId>,
    rows: Vec<Row>,
    assignment: TruthAssignment,
}

impl Trail {
    pub fn new(env: Arc<Environment>, delta: FormulaId) -> Self {
        Self {
            env,
            frames: Vec::new(),
            residuals: vec![delta],
            rows: Vec::new(),
            assignment: TruthAssignment::new(),
        }
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn residual(&self) -> FormulaId {
        *self.residuals.last().expect("trail keeps a root residual")
    }

    pub fn assignment(&self) -> &TruthAssignment {
        &self.assignment
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Assign an atom. An LRA atom also asserts its (possibly negated)
    /// constraint; if the asserted rows become infeasible the new
    /// residual is ⊥.
    pub fn decide(&mut self, atom: AtomId, value: bool, flippable: bool) {
        self.assignment.assign(atom, value);
        let mut pushed_row = false;
        let mut theory_conflict = false;
        if let AtomKind::Linear(c) = self.env.atom_kind(atom) {
            let constraint = if value { c } else { c.negated() };
            self.rows.push(Row::from_constraint(&constraint));
            pushed_row = true;
            theory_conflict = !lra::feasible(&self.rows);
        }
        let next = if theory_conflict {
            self.env.bottom()
        } else {
            substitute_atom(&self.env, self.residual(), atom, value)
        };
        self.frames.push(Frame {
            atom,
            value,
            flippable,
            pushed_row,
            skipped: false,
        });
        self.residuals.push(next);
    }

    /// Record an irrelevant atom: both polarities yield `collapsed`, the
    /// atom stays unassigned and the level cannot be flipped.
    pub fn skip(&mut self, atom: AtomId, collapsed: FormulaId) {
        self.frames.push(Frame {
            atom,
            value: false,
            flippable: false,
            pushed_row: false,
            skipped: true,
        });
        self.residuals.push(collapsed);
    }

    /// Undo to the deepest unflipped decision and take its other branch.
    /// Returns false when the search space is exhausted.
    pub fn backtrack(&mut self) -> bool {
        while let Some(frame) = self.frames.pop() {
            self.residuals.pop();
            if frame.pushed_row {
                self.rows.pop();
            }
            if !frame.skipped {
                self.assignment.unassign(frame.atom);
            }
            if frame.flippable {
                self.decide(frame.atom, !frame.value, false);
                return true;
            }
        }
        false
    }

    /// The asserted LRA rows must agree with Boolean propagation on
    /// every emitted cell.
    pub fn check_theory_consistent(&self) -> WmiResult<()> {
        if lra::feasible(&self.rows) {
            Ok(())
        } else {
            Err(WmiError::inconsistency(
                "theory solver rejects an emitted model",
            ))
        }
    }

    /// Number of declared Boolean atoms left unassigned.
    pub fn free_bool_count(&self, declared: &BTreeSet<AtomId>) -> u32 {
        declared
            .iter()
            .filter(|a| !self.assignment.contains(**a))
            .count() as u32
    }
}
