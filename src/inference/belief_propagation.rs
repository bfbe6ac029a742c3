//! Loopy sum-product belief propagation in log domain.
//!
//! One directed message lives on each (factor, scope-slot) pair in both
//! directions, as a log-domain vector over the incident variable's states.
//! Messages start uniform (all zero). A sweep recomputes every message; the
//! fixed point is reached when the largest absolute message change falls
//! below the tolerance. On trees the fixed point is exact; on loopy graphs
//! the result is the usual Bethe approximation and non-convergence is
//! reported through [`converged`](BeliefPropagation::converged), not as an
//! error.

use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};
use ndarray::{Array1, ArrayView1};

use super::{log_add, log_sum_exp, InferenceMethod};
use crate::factor::Factor;
use crate::graph::FactorGraph;
use crate::{Config, Result};

/// Message update discipline within one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Gauss–Seidel: each newly computed message is used immediately by the
    /// updates that follow it in the same sweep.
    Sequential,
    /// Jacobi: all messages of a sweep are computed from the previous
    /// sweep's values and committed atomically.
    Parallel,
}

/// Marginalization mode of the message updates: log-sum-exp for marginals,
/// max for energy minimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Semiring {
    Sum,
    Max,
}

/// Per-(factor, slot) message buffers, `msgs[fi][slot]`.
pub(crate) type Messages = Vec<Vec<Array1<f64>>>;

pub(crate) fn uniform_messages(graph: &FactorGraph) -> Messages {
    graph
        .factors()
        .iter()
        .map(|f| {
            f.factor_type()
                .card()
                .iter()
                .map(|&c| Array1::zeros(c))
                .collect()
        })
        .collect()
}

/// Message from the variable behind `(fi, slot)` into that factor: the sum
/// of all other incoming factor-to-variable messages at the variable,
/// normalized in log domain.
pub(crate) fn var_to_factor(
    adj: &[Vec<(usize, usize)>],
    f2v: &Messages,
    v: usize,
    fi: usize,
    slot: usize,
    card: usize,
    ring: Semiring,
) -> Array1<f64> {
    let mut m = Array1::zeros(card);
    for &(gi, q) in &adj[v] {
        if (gi, q) != (fi, slot) {
            m += &f2v[gi][q];
        }
    }
    normalize_log(&mut m, ring);
    m
}

/// Message from factor `fi` to the variable at `slot`: marginalizes the
/// factor's energy table combined with the other incoming variable
/// messages.
pub(crate) fn factor_to_var(
    factor: &Factor,
    v2f: &[Array1<f64>],
    slot: usize,
    ring: Semiring,
) -> Array1<f64> {
    let card = factor.factor_type().card();
    let energies = factor.energies();
    let mut out = Array1::from_elem(card[slot], f64::NEG_INFINITY);
    factor.indexer().for_each_state(|s_idx, state| {
        let mut val = -energies[s_idx];
        for (q, &sq) in state.iter().enumerate() {
            if q != slot {
                val += v2f[q][sq];
            }
        }
        let o = &mut out[state[slot]];
        *o = match ring {
            Semiring::Sum => log_add(*o, val),
            Semiring::Max => o.max(val),
        };
    });
    normalize_log(&mut out, ring);
    out
}

fn normalize_log(m: &mut Array1<f64>, ring: Semiring) {
    let shift = match ring {
        Semiring::Sum => log_sum_exp(m.as_slice().unwrap()),
        Semiring::Max => m.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    };
    if shift.is_finite() {
        *m -= shift;
    }
}

/// Normalized belief over a factor's joint states given the final incoming
/// variable messages.
pub(crate) fn factor_belief(factor: &Factor, v2f: &[Array1<f64>]) -> Array1<f64> {
    let energies = factor.energies();
    let mut b = Array1::zeros(factor.n_states());
    factor.indexer().for_each_state(|s_idx, state| {
        let mut val = -energies[s_idx];
        for (q, &sq) in state.iter().enumerate() {
            val += v2f[q][sq];
        }
        b[s_idx] = val;
    });
    let lse = log_sum_exp(b.as_slice().unwrap());
    b.mapv_inplace(|x| (x - lse).exp());
    b
}

/// Normalized belief over one variable's states from its incoming
/// factor-to-variable messages; uniform for isolated variables.
pub(crate) fn var_belief(
    adj: &[Vec<(usize, usize)>],
    f2v: &Messages,
    v: usize,
    card: usize,
) -> Array1<f64> {
    let mut b = Array1::zeros(card);
    for &(gi, q) in &adj[v] {
        b += &f2v[gi][q];
    }
    let lse = log_sum_exp(b.as_slice().unwrap());
    b.mapv_inplace(|x| (x - lse).exp());
    b
}

/// Bethe/tree free-energy estimate of the log partition function from
/// factor and variable beliefs:
/// `logZ = -U + sum_f H(b_f) - sum_v (deg_v - 1) H(b_v)`.
/// Exact on trees; the standard Bethe approximation on loopy graphs.
pub(crate) fn bethe_log_partition(
    graph: &FactorGraph,
    adj: &[Vec<(usize, usize)>],
    factor_beliefs: &[Array1<f64>],
    var_beliefs: &[Array1<f64>],
) -> f64 {
    let mut log_z = 0.0;
    for (f, b) in graph.factors().iter().zip(factor_beliefs.iter()) {
        for (&bs, &es) in b.iter().zip(f.energies().iter()) {
            if bs > 0.0 {
                log_z += bs * (-es - bs.ln());
            }
        }
    }
    for (v, b) in var_beliefs.iter().enumerate() {
        let entropy: f64 = b
            .iter()
            .filter(|&&x| x > 0.0)
            .map(|&x| -x * x.ln())
            .sum();
        log_z -= (adj[v].len() as f64 - 1.0) * entropy;
    }
    log_z
}

/// Per-variable decode of the max-marginals after a max-product run.
pub(crate) fn decode_min_state(
    adj: &[Vec<(usize, usize)>],
    f2v: &Messages,
    card: &[usize],
) -> Vec<usize> {
    let mut state = vec![0; card.len()];
    for (v, sv) in state.iter_mut().enumerate() {
        let mut best = (0, f64::NEG_INFINITY);
        for x in 0..card[v] {
            let score: f64 = adj[v].iter().map(|&(gi, q)| f2v[gi][q][x]).sum();
            if score > best.1 {
                best = (x, score);
            }
        }
        *sv = best.0;
    }
    state
}

/// Loopy (or tree) sum-product belief propagation.
pub struct BeliefPropagation<'g> {
    graph: &'g FactorGraph,
    schedule: Schedule,
    max_sweeps: usize,
    tolerance: f64,
    config: Config,
    adj: Vec<Vec<(usize, usize)>>,
    f2v: Messages,
    v2f: Messages,
    marginals: Vec<Array1<f64>>,
    log_z: f64,
    converged: bool,
    sweeps_run: usize,
}

impl<'g> BeliefPropagation<'g> {
    pub fn new(graph: &'g FactorGraph) -> Self {
        Self::with_schedule(graph, Schedule::Sequential)
    }

    pub fn with_schedule(graph: &'g FactorGraph, schedule: Schedule) -> Self {
        Self {
            schedule,
            max_sweeps: 100,
            tolerance: 1e-6,
            config: Config::default(),
            adj: graph.var_adjacency(),
            f2v: uniform_messages(graph),
            v2f: uniform_messages(graph),
            marginals: Vec::new(),
            log_z: f64::NAN,
            converged: false,
            sweeps_run: 0,
            graph,
        }
    }

    pub fn set_parameters(&mut self, max_sweeps: usize, tolerance: f64) {
        self.max_sweeps = max_sweeps;
        self.tolerance = tolerance;
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Whether the last message-passing run reached its fixed point within
    /// the sweep limit.
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn sweeps(&self) -> usize {
        self.sweeps_run
    }

    fn reset_messages(&mut self) {
        for msgs in self.f2v.iter_mut().chain(self.v2f.iter_mut()) {
            for m in msgs.iter_mut() {
                m.fill(0.0);
            }
        }
    }

    fn sweep_sequential(&mut self, ring: Semiring) -> f64 {
        let mut delta: f64 = 0.0;
        for (fi, f) in self.graph.factors().iter().enumerate() {
            for (slot, &v) in f.vars().iter().enumerate() {
                let card = self.graph.cardinalities()[v];
                let new = var_to_factor(&self.adj, &self.f2v, v, fi, slot, card, ring);
                delta = delta.max(max_abs_diff(&self.v2f[fi][slot], &new));
                self.v2f[fi][slot] = new;
            }
            for slot in 0..f.vars().len() {
                let new = factor_to_var(f, &self.v2f[fi], slot, ring);
                delta = delta.max(max_abs_diff(&self.f2v[fi][slot], &new));
                self.f2v[fi][slot] = new;
            }
        }
        delta
    }

    fn sweep_parallel(&mut self, ring: Semiring) -> f64 {
        let mut delta: f64 = 0.0;
        let new_v2f: Messages = self
            .graph
            .factors()
            .iter()
            .enumerate()
            .map(|(fi, f)| {
                f.vars()
                    .iter()
                    .enumerate()
                    .map(|(slot, &v)| {
                        let card = self.graph.cardinalities()[v];
                        var_to_factor(&self.adj, &self.f2v, v, fi, slot, card, ring)
                    })
                    .collect()
            })
            .collect();
        let new_f2v: Messages = self
            .graph
            .factors()
            .iter()
            .enumerate()
            .map(|(fi, f)| {
                (0..f.vars().len())
                    .map(|slot| factor_to_var(f, &self.v2f[fi], slot, ring))
                    .collect()
            })
            .collect();
        for (old, new) in self.v2f.iter().flatten().zip(new_v2f.iter().flatten()) {
            delta = delta.max(max_abs_diff(old, new));
        }
        for (old, new) in self.f2v.iter().flatten().zip(new_f2v.iter().flatten()) {
            delta = delta.max(max_abs_diff(old, new));
        }
        self.v2f = new_v2f;
        self.f2v = new_f2v;
        delta
    }

    fn run(&mut self, ring: Semiring) {
        self.reset_messages();
        self.converged = false;
        self.sweeps_run = 0;
        let pb = self.config.show_progress().then(|| {
            ProgressBar::new(self.max_sweeps as u64)
                .with_style(
                    ProgressStyle::default_spinner()
                        .template("{msg} [{bar:40.cyan/blue}] ({pos}/{len})")
                        .unwrap(),
                )
                .with_finish(ProgressFinish::AndClear)
                .with_message("BP sweeps")
        });
        for sweep in 0..self.max_sweeps {
            let delta = match self.schedule {
                Schedule::Sequential => self.sweep_sequential(ring),
                Schedule::Parallel => self.sweep_parallel(ring),
            };
            self.sweeps_run = sweep + 1;
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            if delta < self.tolerance {
                self.converged = true;
                break;
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
    }

    /// Recomputes all variable-to-factor messages from the final
    /// factor-to-variable messages, so that beliefs are read from one
    /// consistent message set.
    fn refresh_v2f(&mut self, ring: Semiring) {
        for (fi, f) in self.graph.factors().iter().enumerate() {
            for (slot, &v) in f.vars().iter().enumerate() {
                let card = self.graph.cardinalities()[v];
                self.v2f[fi][slot] = var_to_factor(&self.adj, &self.f2v, v, fi, slot, card, ring);
            }
        }
    }
}

impl InferenceMethod for BeliefPropagation<'_> {
    fn perform_inference(&mut self) -> Result<()> {
        self.graph.check_mapped()?;
        self.run(Semiring::Sum);
        self.refresh_v2f(Semiring::Sum);
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
        self.log_z = bethe_log_partition(self.graph, &self.adj, &self.marginals, &var_beliefs);
        Ok(())
    }

    fn marginal(&self, fi: usize) -> ArrayView1<'_, f64> {
        self.marginals[fi].view()
    }

    /// Bethe estimate; exact on tree-structured graphs.
    fn log_partition_function(&self) -> f64 {
        self.log_z
    }

    /// Max-product variant: min-sum message passing followed by a
    /// per-variable decode of the max-marginals.
    fn minimize_energy(&mut self) -> Result<(Vec<usize>, f64)> {
        self.graph.check_mapped()?;
        self.run(Semiring::Max);
        let state = decode_min_state(&self.adj, &self.f2v, self.graph.cardinalities());
        let energy = self.graph.evaluate_energy(&state)?;
        Ok((state, energy))
    }
}

fn max_abs_diff(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
