//! Graph conditioning: reducing a factor graph under a partial observation.
//!
//! Factors whose scope is entirely fixed are dropped and their resolved
//! energy is accumulated into a constant offset; partially fixed factors are
//! rebuilt over their free slots from a synthesized reduced factor type;
//! untouched factors are copied with their scope remapped to the gap-free
//! renumbering of the unfixed variables. Reduced types are memoized per
//! (original type, fixed sub-pattern) so repeated conditioning of the same
//! pattern reuses them.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::factor::Factor;
use crate::graph::{FactorGraph, FactorGraphPartialObservation};
use crate::index::JointIndexer;
use crate::model::FactorType;
use crate::{FgError, Result};

/// Memo cache of synthesized reduced factor types. Owns the reduced types;
/// the graphs produced through it only share them.
#[derive(Debug, Default)]
pub struct FactorConditioningTable {
    reduced: HashMap<ReducedKey, Arc<FactorType>>,
}

/// Key of one reduced type: the original type's name (unique within a
/// model) and the fixed (slot, state) pattern in ascending slot order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReducedKey {
    type_name: String,
    fixed: Vec<(usize, usize)>,
}

impl FactorConditioningTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reduced types synthesized so far.
    pub fn len(&self) -> usize {
        self.reduced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reduced.is_empty()
    }

    /// Looks up or synthesizes the reduced type of `ty` under the fixed
    /// pattern. The reduced cardinalities are the free slots' in their
    /// original relative order; parametric weights are sliced per retained
    /// joint state, keeping whole feature blocks.
    fn reduced_type(
        &mut self,
        ty: &Arc<FactorType>,
        fixed: &[(usize, usize)],
    ) -> Result<Arc<FactorType>> {
        let key = ReducedKey {
            type_name: ty.name().to_owned(),
            fixed: fixed.to_vec(),
        };
        if let Some(t) = self.reduced.get(&key) {
            return Ok(Arc::clone(t));
        }
        let (free_card, retained) = slice_pattern(ty.card(), fixed);
        let weights = if ty.is_parametric() {
            let k = ty.feature_len();
            let w = ty.weights();
            retained
                .iter()
                .flat_map(|&idx| w[idx * k..(idx + 1) * k].iter().copied())
                .collect()
        } else {
            Vec::new()
        };
        let name = format!(
            "{}|{}",
            ty.name(),
            fixed.iter().map(|(s, x)| format!("{s}={x}")).join(",")
        );
        let reduced = Arc::new(FactorType::new(name, free_card, weights)?);
        self.reduced.insert(key, Arc::clone(&reduced));
        Ok(reduced)
    }
}

/// For each free joint state of `card` under the fixed pattern, the index
/// of the corresponding full joint state. Free slots keep their original
/// relative order.
fn slice_pattern(card: &[usize], fixed: &[(usize, usize)]) -> (Vec<usize>, Vec<usize>) {
    let mut fixed_state = vec![None; card.len()];
    for &(slot, s) in fixed {
        fixed_state[slot] = Some(s);
    }
    let free_slots: Vec<usize> = (0..card.len())
        .filter(|slot| fixed_state[*slot].is_none())
        .collect();
    let free_card: Vec<usize> = free_slots.iter().map(|&slot| card[slot]).collect();
    let full = JointIndexer::new(card);
    let mut retained = Vec::with_capacity(free_card.iter().product());
    let mut full_state: Vec<usize> = fixed_state.iter().map(|s| s.unwrap_or(0)).collect();
    JointIndexer::new(&free_card).for_each_state(|_, free_state| {
        for (&slot, &s) in free_slots.iter().zip(free_state.iter()) {
            full_state[slot] = s;
        }
        retained.push(full.encode(&full_state));
    });
    (free_card, retained)
}

/// A reduced graph together with the bookkeeping needed to translate its
/// states back to the original graph.
#[derive(Debug)]
pub struct ConditionedGraph {
    /// The reduced graph, exclusively owned by the caller.
    pub graph: FactorGraph,
    /// Original index of every retained variable.
    pub var_new_to_orig: Vec<usize>,
    /// Summed resolved energy of the dropped, fully fixed factors. The
    /// reduced graph's energies exclude this constant: original energy =
    /// reduced energy + offset for any assignment extending the
    /// observation.
    pub energy_offset: f64,
}

/// Reduces `graph` under the partial observation. Requires a prior
/// `forward_map` on `graph` (resolved tables are read for dropped factors).
pub fn condition_factor_graph(
    table: &mut FactorConditioningTable,
    graph: &FactorGraph,
    obs: &FactorGraphPartialObservation,
) -> Result<ConditionedGraph> {
    graph.check_mapped()?;
    let n_vars = graph.n_vars();
    let mut fixed_state = vec![None; n_vars];
    for (&v, &s) in obs.vars().iter().zip(obs.states().iter()) {
        if v >= n_vars {
            return Err(FgError::InvalidObservation(format!(
                "variable {v} out of range, graph has {n_vars} variables"
            )));
        }
        if s >= graph.cardinalities()[v] {
            return Err(FgError::InvalidObservation(format!(
                "state {s} out of range for variable {v} of cardinality {}",
                graph.cardinalities()[v]
            )));
        }
        fixed_state[v] = Some(s);
    }
    let var_new_to_orig: Vec<usize> = (0..n_vars).filter(|v| fixed_state[*v].is_none()).collect();
    if var_new_to_orig.is_empty() {
        return Err(FgError::InvalidObservation(
            "all variables are fixed".to_owned(),
        ));
    }
    let mut orig_to_new = vec![usize::MAX; n_vars];
    for (new, &orig) in var_new_to_orig.iter().enumerate() {
        orig_to_new[orig] = new;
    }

    let reduced_card: Vec<usize> = var_new_to_orig
        .iter()
        .map(|&v| graph.cardinalities()[v])
        .collect();
    let mut reduced = FactorGraph::new(reduced_card)?;
    let mut energy_offset = 0.0;

    for f in graph.factors() {
        let fixed: Vec<(usize, usize)> = f
            .vars()
            .iter()
            .enumerate()
            .filter_map(|(slot, &v)| fixed_state[v].map(|s| (slot, s)))
            .collect();
        if fixed.is_empty() {
            let vars = f.vars().iter().map(|&v| orig_to_new[v]).collect();
            reduced.add_factor(Factor::new(
                Arc::clone(f.factor_type()),
                vars,
                f.data().to_vec(),
            ))?;
        } else if fixed.len() == f.vars().len() {
            // Entirely observed: resolve and fold into the offset.
            let states: Vec<usize> = fixed.iter().map(|&(_, s)| s).collect();
            energy_offset += f.energies()[f.indexer().encode(&states)];
        } else {
            let rty = table.reduced_type(f.factor_type(), &fixed)?;
            let vars: Vec<usize> = f
                .vars()
                .iter()
                .filter(|&&v| fixed_state[v].is_none())
                .map(|&v| orig_to_new[v])
                .collect();
            let data = if !f.data().is_empty() && !f.factor_type().is_parametric() {
                // Data-table factor: slice the per-instance table.
                let (_, retained) = slice_pattern(f.factor_type().card(), &fixed);
                retained.iter().map(|&idx| f.data()[idx]).collect()
            } else {
                f.data().to_vec()
            };
            reduced.add_factor(Factor::new(rty, vars, data))?;
        }
    }

    Ok(ConditionedGraph {
        graph: reduced,
        var_new_to_orig,
        energy_offset,
    })
}
