use std::sync::Arc;

use loglin::{
    BeliefPropagation, BruteForceInference, Factor, FactorGraph, FactorGraphModel, FactorType,
    FgError, InferenceMethod, TreeInference,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Chain over cardinalities [2, 3, 4, 2] with random data-table factors.
fn heterogeneous_chain(seed: u64) -> FactorGraph {
    let card = [2usize, 3, 4, 2];
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    let mut model = FactorGraphModel::new();
    let mut fg = FactorGraph::new(card.to_vec()).unwrap();
    for v in 0..card.len() - 1 {
        let ty = model
            .add_factor_type(
                FactorType::new(format!("pair{v}"), vec![card[v], card[v + 1]], vec![]).unwrap(),
            )
            .unwrap();
        let data: Vec<f64> = (0..card[v] * card[v + 1]).map(|_| rng.gen()).collect();
        fg.add_factor(Factor::new(ty, vec![v, v + 1], data)).unwrap();
    }
    fg.forward_map().unwrap();
    fg
}

#[test]
fn tree_inference_matches_brute_force() {
    for seed in 0..20 {
        let fg = heterogeneous_chain(seed);
        let mut exact = TreeInference::new(&fg);
        exact.perform_inference().unwrap();
        let mut bf = BruteForceInference::new(&fg);
        bf.perform_inference().unwrap();

        assert!(
            (exact.log_partition_function() - bf.log_partition_function()).abs() < 1e-6,
            "seed {seed}"
        );
        for fi in 0..fg.n_factors() {
            for (a, b) in exact.marginal(fi).iter().zip(bf.marginal(fi).iter()) {
                assert!((a - b).abs() < 1e-6, "seed {seed}, factor {fi}");
            }
        }

        let (_, e_tree) = exact.minimize_energy().unwrap();
        let (_, e_bf) = bf.minimize_energy().unwrap();
        assert!((e_tree - e_bf).abs() < 1e-6, "seed {seed}");
    }
}

#[test]
fn loopy_bp_matches_brute_force_closely_on_a_single_cycle() {
    // A 4-cycle. BP is approximate here, so only loose agreement is
    // asserted, plus that the run terminates and reports its status.
    let mut rng = Xoshiro256StarStar::seed_from_u64(42);
    let mut model = FactorGraphModel::new();
    let pair = model
        .add_factor_type(FactorType::new("pair", vec![2, 2], vec![]).unwrap())
        .unwrap();
    let mut fg = FactorGraph::new(vec![2; 4]).unwrap();
    for (a, b) in [(0, 1), (1, 2), (2, 3), (0, 3)] {
        let data: Vec<f64> = (0..4).map(|_| 0.5 * rng.gen::<f64>()).collect();
        fg.add_factor(Factor::new(Arc::clone(&pair), vec![a, b], data))
            .unwrap();
    }
    fg.forward_map().unwrap();

    let mut bp = BeliefPropagation::new(&fg);
    bp.perform_inference().unwrap();
    assert!(bp.converged());
    assert!(bp.sweeps() <= 100);
    let mut bf = BruteForceInference::new(&fg);
    bf.perform_inference().unwrap();
    assert!((bp.log_partition_function() - bf.log_partition_function()).abs() < 0.1);
    for fi in 0..fg.n_factors() {
        for (a, b) in bp.marginal(fi).iter().zip(bf.marginal(fi).iter()) {
            assert!((a - b).abs() < 0.05);
        }
    }
}

#[test]
fn tree_inference_rejects_cycles() {
    let mut model = FactorGraphModel::new();
    let pair = model
        .add_factor_type(FactorType::new("pair", vec![2, 2], vec![0.0; 4]).unwrap())
        .unwrap();
    let mut fg = FactorGraph::new(vec![2; 3]).unwrap();
    for (a, b) in [(0, 1), (1, 2), (0, 2)] {
        fg.add_factor(Factor::new(Arc::clone(&pair), vec![a, b], vec![]))
            .unwrap();
    }
    fg.forward_map().unwrap();

    let mut exact = TreeInference::new(&fg);
    assert!(matches!(exact.perform_inference(), Err(FgError::NotATree)));
}

#[test]
fn inference_requires_mapped_tables() {
    let mut model = FactorGraphModel::new();
    let u = model
        .add_factor_type(FactorType::new("u", vec![2], vec![0.0, 1.0]).unwrap())
        .unwrap();
    let mut fg = FactorGraph::new(vec![2]).unwrap();
    fg.add_factor(Factor::new(u, vec![0], vec![])).unwrap();

    assert!(matches!(
        fg.evaluate_energy(&[0]),
        Err(FgError::ForwardMapRequired)
    ));
    let mut bp = BeliefPropagation::new(&fg);
    assert!(matches!(
        bp.perform_inference(),
        Err(FgError::ForwardMapRequired)
    ));
}

#[test]
fn brute_force_honors_the_state_ceiling() {
    let fg = heterogeneous_chain(0); // 48 joint states
    let mut bf = BruteForceInference::new(&fg);
    bf.set_state_ceiling(32);
    assert!(matches!(
        bf.perform_inference(),
        Err(FgError::IntractableSize {
            n_states: 48,
            ceiling: 32
        })
    ));
    bf.set_state_ceiling(48);
    assert!(bf.perform_inference().is_ok());
}

#[test]
fn isolated_variables_contribute_uniform_mass() {
    // Variable 1 has no incident factor; it multiplies Z by its
    // cardinality and must not disturb the rest.
    let mut model = FactorGraphModel::new();
    let u = model
        .add_factor_type(FactorType::new("u", vec![2], vec![0.0, 1.0]).unwrap())
        .unwrap();
    let mut fg = FactorGraph::new(vec![2, 3]).unwrap();
    fg.add_factor(Factor::new(u, vec![0], vec![])).unwrap();
    fg.forward_map().unwrap();

    let mut exact = TreeInference::new(&fg);
    exact.perform_inference().unwrap();
    let mut bf = BruteForceInference::new(&fg);
    bf.perform_inference().unwrap();
    assert!((exact.log_partition_function() - bf.log_partition_function()).abs() < 1e-6);
    let expected = (1.0 + (-1.0f64).exp()).ln() + 3.0f64.ln();
    assert!((bf.log_partition_function() - expected).abs() < 1e-12);
}
