//! Exact inference on tree-structured factor graphs.
//!
//! A single leaves-to-root pass followed by a root-to-leaves pass over the
//! variable–factor bipartite graph reaches the message fixed point exactly;
//! there is no convergence loop and no tolerance. Invoking it on a graph
//! with a cycle fails with `FgError::NotATree`.

use ndarray::{Array1, ArrayView1};

use super::belief_propagation::{
    bethe_log_partition, decode_min_state, factor_belief, factor_to_var, uniform_messages,
    var_belief, var_to_factor, Messages, Semiring,
};
use super::InferenceMethod;
use crate::graph::FactorGraph;
use crate::{FgError, Result};

/// A node of the bipartite graph, paired during traversal with the edge to
/// its parent as a (factor index, scope slot) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Var(usize),
    Fac(usize),
}

pub struct TreeInference<'g> {
    graph: &'g FactorGraph,
    adj: Vec<Vec<(usize, usize)>>,
    f2v: Messages,
    v2f: Messages,
    marginals: Vec<Array1<f64>>,
    log_z: f64,
}

impl<'g> TreeInference<'g> {
    pub fn new(graph: &'g FactorGraph) -> Self {
        Self {
            adj: graph.var_adjacency(),
            f2v: uniform_messages(graph),
            v2f: uniform_messages(graph),
            marginals: Vec::new(),
            log_z: f64::NAN,
            graph,
        }
    }

    /// BFS order of the bipartite graph with parent edges, rooted at the
    /// first unvisited variable of each component. Fails on cycles.
    fn traversal_order(&self) -> Result<Vec<(Node, Option<(usize, usize)>)>> {
        let n_vars = self.graph.n_vars();
        let mut seen_var = vec![false; n_vars];
        let mut seen_fac = vec![false; self.graph.n_factors()];
        let mut order = Vec::with_capacity(n_vars + self.graph.n_factors());
        let mut queue = std::collections::VecDeque::new();
        for root in 0..n_vars {
            if seen_var[root] {
                continue;
            }
            seen_var[root] = true;
            queue.push_back((Node::Var(root), None));
            while let Some((node, parent)) = queue.pop_front() {
                order.push((node, parent));
                match node {
                    Node::Var(v) => {
                        for &(fi, slot) in &self.adj[v] {
                            if Some((fi, slot)) == parent {
                                continue;
                            }
                            if seen_fac[fi] {
                                return Err(FgError::NotATree);
                            }
                            seen_fac[fi] = true;
                            queue.push_back((Node::Fac(fi), Some((fi, slot))));
                        }
                    }
                    Node::Fac(fi) => {
                        let parent_slot = parent.map(|(_, slot)| slot);
                        for (slot, &u) in self.graph.factor(fi).vars().iter().enumerate() {
                            if Some(slot) == parent_slot {
                                continue;
                            }
                            if seen_var[u] {
                                return Err(FgError::NotATree);
                            }
                            seen_var[u] = true;
                            queue.push_back((Node::Var(u), Some((fi, slot))));
                        }
                    }
                }
            }
        }
        Ok(order)
    }

    /// One upward (leaves-to-root) and one downward (root-to-leaves) pass.
    fn propagate(&mut self, ring: Semiring) -> Result<()> {
        let order = self.traversal_order()?;
        let card = self.graph.cardinalities();
        // Upward: every non-root node sends towards its parent.
        for &(node, parent) in order.iter().rev() {
            match (node, parent) {
                (Node::Var(v), Some((fi, slot))) => {
                    self.v2f[fi][slot] =
                        var_to_factor(&self.adj, &self.f2v, v, fi, slot, card[v], ring);
                }
                (Node::Fac(fi), Some((_, slot))) => {
                    self.f2v[fi][slot] =
                        factor_to_var(self.graph.factor(fi), &self.v2f[fi], slot, ring);
                }
                (_, None) => {}
            }
        }
        // Downward: every node sends towards its children.
        for &(node, parent) in order.iter() {
            match node {
                Node::Var(v) => {
                    for &(fi, slot) in &self.adj[v] {
                        if Some((fi, slot)) == parent {
                            continue;
                        }
                        self.v2f[fi][slot] =
                            var_to_factor(&self.adj, &self.f2v, v, fi, slot, card[v], ring);
                    }
                }
                Node::Fac(fi) => {
                    let parent_slot = parent.map(|(_, slot)| slot);
                    for slot in 0..self.graph.factor(fi).vars().len() {
                        if Some(slot) == parent_slot {
                            continue;
                        }
                        self.f2v[fi][slot] =
                            factor_to_var(self.graph.factor(fi), &self.v2f[fi], slot, ring);
                    }
                }
            }
        }
        Ok(())
    }
}

impl InferenceMethod for TreeInference<'_> {
    fn perform_inference(&mut self) -> Result<()> {
        self.graph.check_mapped()?;
        self.propagate(Semiring::Sum)?;
        self.marginals = self
            .graph
            .factors()
            .iter()
            .enumerate()
            .map(|(fi, f)| factor_belief(f, &self.v2f[fi]))
            .collect();
        let var_beliefs: Vec<Array1<f64>> = (0..self.graph.n_vars())
            .map(|v| var_belief(&self.adj, &self.f2v, v, self.graph.cardinalities()[v]))
            .collect();
        // The tree free energy is exact here.
        self.log_z = bethe_log_partition(self.graph, &self.adj, &self.marginals, &var_beliefs);
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
        self.propagate(Semiring::Max)?;
        let state = decode_min_state(&self.adj, &self.f2v, self.graph.cardinalities());
        let energy = self.graph.evaluate_energy(&state)?;
        Ok((state, energy))
    }
}
