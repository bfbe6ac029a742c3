//! Exact inference by exhaustive enumeration of the joint state space.
//!
//! Exponential in the number of variables; guarded by a configurable
//! state-count ceiling. Serves as the ground-truth oracle for the other
//! algorithms on small graphs.

use ndarray::{Array1, ArrayView1};

use super::InferenceMethod;
use crate::graph::FactorGraph;
use crate::index::JointIndexer;
use crate::{FgError, Result};

const DEFAULT_STATE_CEILING: usize = 1 << 20;

pub struct BruteForceInference<'g> {
    graph: &'g FactorGraph,
    state_ceiling: usize,
    marginals: Vec<Array1<f64>>,
    log_z: f64,
}

impl<'g> BruteForceInference<'g> {
    pub fn new(graph: &'g FactorGraph) -> Self {
        Self {
            graph,
            state_ceiling: DEFAULT_STATE_CEILING,
            marginals: Vec::new(),
            log_z: f64::NAN,
        }
    }

    /// Raises or lowers the guard on the joint state count.
    pub fn set_state_ceiling(&mut self, ceiling: usize) {
        self.state_ceiling = ceiling;
    }

    fn check_tractable(&self) -> Result<JointIndexer> {
        let n_states = self
            .graph
            .cardinalities()
            .iter()
            .try_fold(1usize, |acc, &c| acc.checked_mul(c))
            .unwrap_or(usize::MAX);
        if n_states > self.state_ceiling {
            return Err(FgError::IntractableSize {
                n_states,
                ceiling: self.state_ceiling,
            });
        }
        Ok(JointIndexer::new(self.graph.cardinalities()))
    }

    fn exhaustive_minimum(&self, indexer: &JointIndexer) -> (Vec<usize>, f64) {
        let mut min_state = vec![0; self.graph.n_vars()];
        let mut min_energy = f64::INFINITY;
        indexer.for_each_state(|_, state| {
            let e = self.graph.energy_unchecked(state);
            if e < min_energy {
                min_energy = e;
                min_state.copy_from_slice(state);
            }
        });
        (min_state, min_energy)
    }
}

impl InferenceMethod for BruteForceInference<'_> {
    fn perform_inference(&mut self) -> Result<()> {
        self.graph.check_mapped()?;
        let indexer = self.check_tractable()?;
        // First pass pins the exponent shift at the minimum energy, the
        // second accumulates the normalizer and per-factor mass.
        let (_, e_min) = self.exhaustive_minimum(&indexer);
        let mut z_shifted = 0.0;
        let mut marginals: Vec<Array1<f64>> = self
            .graph
            .factors()
            .iter()
            .map(|f| Array1::zeros(f.n_states()))
            .collect();
        indexer.for_each_state(|_, state| {
            let w = (-(self.graph.energy_unchecked(state) - e_min)).exp();
            z_shifted += w;
            for (f, m) in self.graph.factors().iter().zip(marginals.iter_mut()) {
                m[f.local_index(state)] += w;
            }
        });
        for m in marginals.iter_mut() {
            *m /= z_shifted;
        }
        self.marginals = marginals;
        self.log_z = -e_min + z_shifted.ln();
        Ok(())
    }

    fn marginal(&self, fi: usize) -> ArrayView1<'_, f64> {
        self.marginals[fi].view()
    }

    fn log_partition_function(&self) -> f64 {
        self.log_z
    }

    fn minimize_energy(&mut self) -> Result<(Vec<usize>, f64)> {
        self.graph.check_mapped()?;
        let indexer = self.check_tractable()?;
        Ok(self.exhaustive_minimum(&indexer))
    }
}
