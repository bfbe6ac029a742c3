//! Factor graphs: owned factor instances over a vector of discrete
//! variables, plus full and partial observations of their states.

use crate::factor::Factor;
use crate::{FgError, Result};

/// A bipartite factor graph. Owns its factors (insertion order is preserved
/// and defines enumeration order for energy summation) and the per-variable
/// cardinality vector; factor types are shared with the owning model.
#[derive(Debug, Clone)]
pub struct FactorGraph {
    card: Vec<usize>,
    factors: Vec<Factor>,
    mapped: bool,
}

impl FactorGraph {
    pub fn new(card: Vec<usize>) -> Result<Self> {
        if card.is_empty() || card.contains(&0) {
            return Err(FgError::EmptyCardinality);
        }
        Ok(Self {
            card,
            factors: Vec::new(),
            mapped: false,
        })
    }

    pub fn cardinalities(&self) -> &[usize] {
        &self.card
    }

    pub fn n_vars(&self) -> usize {
        self.card.len()
    }

    /// Factors in insertion order.
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn factor(&self, fi: usize) -> &Factor {
        &self.factors[fi]
    }

    pub fn n_factors(&self) -> usize {
        self.factors.len()
    }

    /// Validates the factor's scope against the graph and the referenced
    /// type, then appends it. Scope slots must name distinct, in-range
    /// variables whose cardinalities match the type signature.
    pub fn add_factor(&mut self, factor: Factor) -> Result<()> {
        let ty_card = factor.factor_type().card();
        if factor.vars().len() != ty_card.len() {
            return Err(FgError::ScopeMismatch(format!(
                "scope has {} variables, type \"{}\" has {} slots",
                factor.vars().len(),
                factor.factor_type().name(),
                ty_card.len()
            )));
        }
        for (slot, (&v, &c)) in factor.vars().iter().zip(ty_card.iter()).enumerate() {
            if v >= self.card.len() {
                return Err(FgError::ScopeMismatch(format!(
                    "slot {slot} names variable {v}, graph has {} variables",
                    self.card.len()
                )));
            }
            if self.card[v] != c {
                return Err(FgError::ScopeMismatch(format!(
                    "slot {slot}: variable {v} has cardinality {}, type expects {c}",
                    self.card[v]
                )));
            }
            if factor.vars()[..slot].contains(&v) {
                return Err(FgError::ScopeMismatch(format!(
                    "variable {v} appears twice in the scope"
                )));
            }
        }
        factor.check_data()?;
        self.mapped = false;
        self.factors.push(factor);
        Ok(())
    }

    /// Recomputes every factor's energy table. Must be called after factors
    /// are added or weights updated, before any energy or inference query;
    /// stale tables are never refreshed implicitly.
    pub fn forward_map(&mut self) -> Result<()> {
        for f in &mut self.factors {
            f.forward_map()?;
        }
        self.mapped = true;
        Ok(())
    }

    pub(crate) fn check_mapped(&self) -> Result<()> {
        if self.mapped {
            Ok(())
        } else {
            Err(FgError::ForwardMapRequired)
        }
    }

    /// Joint energy of a full assignment: sum over factors of the table
    /// entry at the sub-state projected onto each factor's scope.
    pub fn evaluate_energy(&self, state: &[usize]) -> Result<f64> {
        if state.len() != self.card.len() {
            return Err(FgError::DimensionMismatch {
                expected: self.card.len(),
                got: state.len(),
            });
        }
        self.check_mapped()?;
        Ok(self.energy_unchecked(state))
    }

    /// Energy sum without shape or staleness checks, for enumeration and
    /// sampling inner loops.
    pub(crate) fn energy_unchecked(&self, state: &[usize]) -> f64 {
        self.factors
            .iter()
            .map(|f| f.energies()[f.local_index(state)])
            .sum()
    }

    /// Variable to (factor index, scope slot) adjacency, insertion order.
    pub(crate) fn var_adjacency(&self) -> Vec<Vec<(usize, usize)>> {
        let mut adj = vec![Vec::new(); self.card.len()];
        for (fi, f) in self.factors.iter().enumerate() {
            for (slot, &v) in f.vars().iter().enumerate() {
                adj[v].push((fi, slot));
            }
        }
        adj
    }
}

/// A full assignment of every graph variable, used as ground truth by
/// training collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorGraphObservation {
    state: Vec<usize>,
}

impl FactorGraphObservation {
    pub fn new(state: Vec<usize>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &[usize] {
        &self.state
    }
}

/// A sparse assignment fixing a subset of variables: strictly increasing
/// variable indices paired with their observed states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorGraphPartialObservation {
    vars: Vec<usize>,
    states: Vec<usize>,
}

impl FactorGraphPartialObservation {
    pub fn new(vars: Vec<usize>, states: Vec<usize>) -> Result<Self> {
        if vars.len() != states.len() {
            return Err(FgError::InvalidObservation(format!(
                "{} variables but {} states",
                vars.len(),
                states.len()
            )));
        }
        if !vars.windows(2).all(|w| w[0] < w[1]) {
            return Err(FgError::InvalidObservation(
                "variable indices must be strictly increasing".to_owned(),
            ));
        }
        Ok(Self { vars, states })
    }

    pub fn vars(&self) -> &[usize] {
        &self.vars
    }

    pub fn states(&self) -> &[usize] {
        &self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FactorType;
    use std::sync::Arc;

    #[test]
    fn scope_validation() {
        let ty = Arc::new(FactorType::new("pair", vec![2, 3], vec![0.0; 6]).unwrap());
        let mut fg = FactorGraph::new(vec![2, 3, 2]).unwrap();
        // Wrong arity.
        assert!(fg
            .add_factor(Factor::new(Arc::clone(&ty), vec![0], vec![]))
            .is_err());
        // Cardinality mismatch at slot 1.
        assert!(fg
            .add_factor(Factor::new(Arc::clone(&ty), vec![0, 2], vec![]))
            .is_err());
        // Out of range.
        assert!(fg
            .add_factor(Factor::new(Arc::clone(&ty), vec![0, 5], vec![]))
            .is_err());
        // Valid.
        assert!(fg
            .add_factor(Factor::new(Arc::clone(&ty), vec![0, 1], vec![]))
            .is_ok());
    }

    #[test]
    fn energy_requires_forward_map() {
        let ty = Arc::new(FactorType::new("u", vec![2], vec![0.5, 1.5]).unwrap());
        let mut fg = FactorGraph::new(vec![2]).unwrap();
        fg.add_factor(Factor::new(ty, vec![0], vec![])).unwrap();
        assert!(matches!(
            fg.evaluate_energy(&[0]),
            Err(FgError::ForwardMapRequired)
        ));
        fg.forward_map().unwrap();
        assert_eq!(fg.evaluate_energy(&[1]).unwrap(), 1.5);
        assert!(matches!(
            fg.evaluate_energy(&[0, 0]),
            Err(FgError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn partial_observation_ordering() {
        assert!(FactorGraphPartialObservation::new(vec![0, 2], vec![1, 0]).is_ok());
        assert!(FactorGraphPartialObservation::new(vec![2, 0], vec![1, 0]).is_err());
        assert!(FactorGraphPartialObservation::new(vec![1, 1], vec![0, 0]).is_err());
        assert!(FactorGraphPartialObservation::new(vec![1], vec![]).is_err());
    }
}
