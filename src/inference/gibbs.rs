//! Gibbs sampling: stochastic approximate inference by single-site
//! resampling from exact conditionals.
//!
//! Variables are revisited in a fixed cyclic order. After the burn-in
//! sweeps, one assignment is recorded every `spacing` single-site steps
//! until the sample target is reached. Approximation error is controlled by
//! the sampling parameters only and is not reported as an error.

use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};
use ndarray::{Array1, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use super::{log_sum_exp, InferenceMethod};
use crate::graph::FactorGraph;
use crate::{Config, Result};

pub struct GibbsInference<'g> {
    graph: &'g FactorGraph,
    adj: Vec<Vec<(usize, usize)>>,
    burn_in_sweeps: usize,
    spacing: usize,
    n_samples: usize,
    seed: u64,
    config: Config,
    marginals: Vec<Array1<f64>>,
    log_z: f64,
}

impl<'g> GibbsInference<'g> {
    pub fn new(graph: &'g FactorGraph) -> Self {
        Self {
            adj: graph.var_adjacency(),
            burn_in_sweeps: 100,
            spacing: 1,
            n_samples: 1000,
            seed: 0,
            config: Config::default(),
            marginals: Vec::new(),
            log_z: f64::NAN,
            graph,
        }
    }

    /// Burn-in sweep count, thinning interval in single-site steps, and
    /// total sample count.
    pub fn set_sampling_parameters(
        &mut self,
        burn_in_sweeps: usize,
        spacing: usize,
        n_samples: usize,
    ) {
        self.burn_in_sweeps = burn_in_sweeps;
        self.spacing = spacing.max(1);
        self.n_samples = n_samples;
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Resamples `state[v]` from its exact conditional given all other
    /// variables, touching only the factors incident to `v`.
    fn resample(&self, state: &mut [usize], v: usize, rng: &mut Xoshiro256StarStar) {
        let card = self.graph.cardinalities()[v];
        let mut logp = vec![0.0; card];
        for (x, lp) in logp.iter_mut().enumerate() {
            state[v] = x;
            let e: f64 = self.adj[v]
                .iter()
                .map(|&(fi, _)| {
                    let f = self.graph.factor(fi);
                    f.energies()[f.local_index(state)]
                })
                .sum();
            *lp = -e;
        }
        let lse = log_sum_exp(&logp);
        let u: f64 = rng.gen();
        let mut acc = 0.0;
        state[v] = card - 1;
        for (x, lp) in logp.iter().enumerate() {
            acc += (lp - lse).exp();
            if u <= acc {
                state[v] = x;
                break;
            }
        }
    }
}

impl InferenceMethod for GibbsInference<'_> {
    fn perform_inference(&mut self) -> Result<()> {
        self.graph.check_mapped()?;
        let n_vars = self.graph.n_vars();
        let mut rng = Xoshiro256StarStar::seed_from_u64(self.seed);
        let mut state = vec![0; n_vars];
        let mut next_var = 0;
        let mut step = |state: &mut [usize], rng: &mut Xoshiro256StarStar| {
            self.resample(state, next_var, rng);
            next_var = (next_var + 1) % n_vars;
        };
        for _ in 0..self.burn_in_sweeps * n_vars {
            step(&mut state, &mut rng);
        }

        let mut counts: Vec<Array1<f64>> = self
            .graph
            .factors()
            .iter()
            .map(|f| Array1::zeros(f.n_states()))
            .collect();
        let mut sample_energies = Vec::with_capacity(self.n_samples);
        let pb = self.config.show_progress().then(|| {
            ProgressBar::new(self.n_samples as u64)
                .with_style(
                    ProgressStyle::default_spinner()
                        .template("{msg} [{bar:40.cyan/blue}] ({pos}/{len})")
                        .unwrap(),
                )
                .with_finish(ProgressFinish::AndClear)
                .with_message("Gibbs samples")
        });
        for _ in 0..self.n_samples {
            for _ in 0..self.spacing {
                step(&mut state, &mut rng);
            }
            for (f, c) in self.graph.factors().iter().zip(counts.iter_mut()) {
                c[f.local_index(&state)] += 1.0;
            }
            sample_energies.push(self.graph.energy_unchecked(&state));
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        for c in counts.iter_mut() {
            *c /= self.n_samples as f64;
        }
        self.marginals = counts;
        // Empirical estimate from Z = |S| / E_p[exp(E)]:
        // logZ = ln|S| - (logsumexp(E_i) - ln N).
        let ln_states: f64 = self
            .graph
            .cardinalities()
            .iter()
            .map(|&c| (c as f64).ln())
            .sum();
        self.log_z =
            ln_states - (log_sum_exp(&sample_energies) - (self.n_samples as f64).ln());
        Ok(())
    }

    /// Empirical sample frequencies over the factor's joint states.
    fn marginal(&self, fi: usize) -> ArrayView1<'_, f64> {
        self.marginals[fi].view()
    }

    /// Empirical estimate; quality depends on the sampling parameters.
    fn log_partition_function(&self) -> f64 {
        self.log_z
    }

    /// Best assignment visited while sampling with the configured
    /// parameters; a stochastic search rather than an exact minimizer.
    fn minimize_energy(&mut self) -> Result<(Vec<usize>, f64)> {
        self.graph.check_mapped()?;
        let n_vars = self.graph.n_vars();
        let mut rng = Xoshiro256StarStar::seed_from_u64(self.seed);
        let mut state = vec![0; n_vars];
        let mut best_state = state.clone();
        let mut best_energy = self.graph.energy_unchecked(&state);
        let steps = (self.burn_in_sweeps + self.n_samples * self.spacing / n_vars.max(1)) * n_vars;
        let mut next_var = 0;
        for _ in 0..steps {
            self.resample(&mut state, next_var, &mut rng);
            next_var = (next_var + 1) % n_vars;
            let e = self.graph.energy_unchecked(&state);
            if e < best_energy {
                best_energy = e;
                best_state.copy_from_slice(&state);
            }
        }
        Ok((best_state, best_energy))
    }
}
