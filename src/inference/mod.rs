//! Inference algorithms over materialized factor graphs.
//!
//! Every algorithm implements the same capability contract,
//! [`InferenceMethod`]: run to completion, then expose per-factor marginals,
//! the log partition function, and a most-probable joint assignment.

pub mod belief_propagation;
pub mod brute_force;
pub mod gibbs;
pub mod tree;

pub use belief_propagation::{BeliefPropagation, Schedule};
pub use brute_force::BruteForceInference;
pub use gibbs::GibbsInference;
pub use tree::TreeInference;

use ndarray::ArrayView1;

use crate::Result;

/// Shared contract of all inference algorithms. Callers, including external
/// learning drivers, depend only on this interface.
pub trait InferenceMethod {
    /// Runs the algorithm to completion, computing per-factor marginals and
    /// the log partition function.
    fn perform_inference(&mut self) -> Result<()>;

    /// Normalized probability vector over the joint states of factor `fi`.
    /// Valid only after [`perform_inference`](Self::perform_inference).
    fn marginal(&self, fi: usize) -> ArrayView1<'_, f64>;

    /// Log of the normalizing constant, exact or approximate depending on
    /// the algorithm. Valid only after
    /// [`perform_inference`](Self::perform_inference).
    fn log_partition_function(&self) -> f64;

    /// Minimizing joint assignment and its energy.
    fn minimize_energy(&mut self) -> Result<(Vec<usize>, f64)>;
}

/// Numerically stable `ln(sum(exp(v)))`.
pub(crate) fn log_sum_exp(v: &[f64]) -> f64 {
    let m = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return m;
    }
    m + v.iter().map(|x| (x - m).exp()).sum::<f64>().ln()
}

/// Stable `ln(exp(a) + exp(b))`.
pub(crate) fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sum_exp_matches_naive() {
        let v: [f64; 3] = [0.3, -1.0, 2.5];
        let naive: f64 = v.iter().map(|x| x.exp()).sum::<f64>().ln();
        assert!((log_sum_exp(&v) - naive).abs() < 1e-12);
        assert!((log_add(0.3, -1.0) - (0.3f64.exp() + (-1.0f64).exp()).ln()).abs() < 1e-12);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }
}
