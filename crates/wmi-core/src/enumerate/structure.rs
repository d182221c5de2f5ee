//! Structure-aware enumeration
//!
//! DPLL-style search over the residual of Δ under the current partial
//! assignment. Unit literals of the residual are propagated before any
//! decision; a candidate atom whose two polarities collapse to the same
//! residual (hash-cons equality) is skipped and stays unassigned. Cells
//! are emitted as soon as the residual reaches ⊤, so one cell stands for
//! the 2^k totalizations over the free declared Boolean atoms.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::environment::Environment;
use crate::enumerate::trail::Trail;
use crate::enumerate::{Cell, DecisionOrder, Search, StreamControl};
use crate::error::{WmiError, WmiResult};
use crate::formula::transform::{substitute_atom, truth_value};
use crate::formula::types::{AtomId, Formula, FormulaId, Lit};

pub struct StructureSearch {
    trail: Trail,
    declared_bools: BTreeSet<AtomId>,
    order: DecisionOrder,
    exhausted: bool,
}

impl StructureSearch {
    pub(crate) fn new(
        env: Arc<Environment>,
        delta: FormulaId,
        declared_bools: BTreeSet<AtomId>,
        order: DecisionOrder,
    ) -> Self {
        Self {
            trail: Trail::new(env, delta),
            declared_bools,
            order,
            exhausted: false,
        }
    }

    /// A literal forced by the residual: the residual itself, or any
    /// literal conjunct of it.
    fn unit_literal(&self, residual: FormulaId) -> Option<Lit> {
        let env = self.trail.env();
        match env.formula(residual) {
            Formula::Lit(l) => Some(l),
            Formula::And(kids) => kids.into_iter().find_map(|k| {
                match env.formula(k) {
                    Formula::Lit(l) => Some(l),
                    _ => None,
                }
            }),
            _ => None,
        }
    }

    fn emit(&self) -> WmiResult<Cell> {
        self.trail.check_theory_consistent()?;
        Ok(Cell {
            assignment: self.trail.assignment().clone(),
            free_bools: self.trail.free_bool_count(&self.declared_bools),
        })
    }
}

impl Search for StructureSearch {
    fn next_cell(&mut self, ctl: &StreamControl) -> Option<WmiResult<Cell>> {
        if self.exhausted {
            return None;
        }
        loop {
            if let Err(e) = ctl.check() {
                self.exhausted = true;
                return Some(Err(e));
            }
            let residual = self.trail.residual();
            match truth_value(self.trail.env(), residual) {
                Some(false) => {
                    if !self.trail.backtrack() {
                        self.exhausted = true;
                        return None;
                    }
                }
                Some(true) => {
                    let cell = match self.emit() {
                        Ok(c) => c,
                        Err(e) => {
                            self.exhausted = true;
                            return Some(Err(e));
                        }
                    };
                    log::trace!(
                        "cell at depth {} with {} free Boolean atom(s)",
                        self.trail.depth(),
                        cell.free_bools
                    );
                    if !self.trail.backtrack() {
                        self.exhausted = true;
                    }
                    return Some(Ok(cell));
                }
                None => {
                    if let Some(l) = self.unit_literal(residual) {
                        self.trail.decide(l.atom, !l.negated, false);
                        continue;
                    }
                    let env = self.trail.env().clone();
                    let atoms = env.atoms_of(residual);
                    let atom = match self.order.pick(atoms.iter()) {
                        Some(a) => a,
                        None => {
                            self.exhausted = true;
                            return Some(Err(WmiError::inconsistency(
                                "non-constant residual without free atoms",
                            )));
                        }
                    };
                    let under_true =
                        substitute_atom(&env, residual, atom, true);
                    let under_false =
                        substitute_atom(&env, residual, atom, false);
                    if under_true == under_false {
                        self.trail.skip(atom, under_true);
                    } else {
                        self.trail.decide(atom, true, true);
                    }
                }
            }
        }
    }
}
