//! Total enumeration
//!
//! Reference variant: every atom of the universe — declared Boolean
//! atoms plus every atom of Δ — is assigned in every emitted cell, so
//! k is always zero. Theory-infeasible branches are pruned through the
//! trail exactly as in the structure-aware search.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::environment::Environment;
use crate::enumerate::trail::Trail;
use crate::enumerate::{Cell, DecisionOrder, Search, StreamControl};
use crate::error::{WmiError, WmiResult};
use crate::formula::transform::truth_value;
use crate::formula::types::{AtomId, FormulaId};

pub struct TotalSearch {
    trail: Trail,
    /// Fixed decision order over the whole universe
    atoms: Vec<AtomId>,
    exhausted: bool,
}

impl TotalSearch {
    pub(crate) fn new(
        env: Arc<Environment>,
        delta: FormulaId,
        declared_bools: BTreeSet<AtomId>,
        order: DecisionOrder,
    ) -> Self {
        let mut universe: Vec<AtomId> = order.order.clone();
        for a in declared_bools {
            if !order.rank.contains_key(&a) {
                universe.push(a);
            }
        }
        Self {
            trail: Trail::new(env, delta),
            atoms: universe,
            exhausted: false,
        }
    }
}

impl Search for TotalSearch {
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
            if truth_value(self.trail.env(), residual) == Some(false) {
                if !self.trail.backtrack() {
                    self.exhausted = true;
                    return None;
                }
                continue;
            }
            if self.trail.depth() == self.atoms.len() {
                // every atom assigned: the residual can only be constant
                if truth_value(self.trail.env(), residual) != Some(true) {
                    self.exhausted = true;
                    return Some(Err(WmiError::inconsistency(
                        "total assignment left a non-constant residual",
                    )));
                }
                let cell = match self.trail.check_theory_consistent() {
                    Ok(()) => Cell {
                        assignment: self.trail.assignment().clone(),
                        free_bools: 0,
                    },
                    Err(e) => {
                        self.exhausted = true;
                        return Some(Err(e));
                    }
                };
                if !self.trail.backtrack() {
                    self.exhausted = true;
                }
                return Some(Ok(cell));
            }
            let atom = self.atoms[self.trail.depth()];
            self.trail.decide(atom, true, true);
        }
    }
}
