use loglin::{Factor, FactorGraph, FactorGraphModel, FactorGraphObservation, FactorType};
use ndarray::arr1;

/// Three binary variables tied pairwise into a triangle by one shared
/// factor type, as in the classic smoke test for energy evaluation.
fn triangle() -> (FactorGraphModel, FactorGraph) {
    let mut model = FactorGraphModel::new();
    let pt = model
        .add_factor_type(
            FactorType::new("pairwise", vec![2, 2], vec![1.0, 0.2, -0.2, 1.0]).unwrap(),
        )
        .unwrap();

    let mut fg = FactorGraph::new(vec![2, 2, 2]).unwrap();
    for scope in [vec![0, 1], vec![1, 2], vec![0, 2]] {
        fg.add_factor(Factor::new(pt.clone(), scope, vec![])).unwrap();
    }
    (model, fg)
}

#[test]
fn energy_is_sum_of_projected_table_entries() {
    let (_model, mut fg) = triangle();
    fg.forward_map().unwrap();

    // Table order (first scope variable least significant):
    // (0,0) -> 1.0, (1,0) -> 0.2, (0,1) -> -0.2, (1,1) -> 1.0
    assert!((fg.evaluate_energy(&[0, 0, 0]).unwrap() - 3.0).abs() < 1e-12);
    assert!((fg.evaluate_energy(&[1, 1, 1]).unwrap() - 3.0).abs() < 1e-12);
    // (1,0), (0,0), (1,0)
    assert!((fg.evaluate_energy(&[1, 0, 0]).unwrap() - 1.4).abs() < 1e-12);
    // (1,1), (1,0), (1,0)
    assert!((fg.evaluate_energy(&[1, 1, 0]).unwrap() - 1.4).abs() < 1e-12);
    // (0,1), (1,1), (0,1)
    assert!((fg.evaluate_energy(&[0, 1, 1]).unwrap() - 0.6).abs() < 1e-12);

    let obs = FactorGraphObservation::new(vec![1, 0, 0]);
    assert!((fg.evaluate_energy(obs.state()).unwrap() - 1.4).abs() < 1e-12);
}

#[test]
fn backward_map_returns_marginal_for_plain_tables() {
    let (_model, mut fg) = triangle();
    fg.forward_map().unwrap();

    let marg = arr1(&[0.25, 0.4, 0.1, 0.25]);
    let mut grad = vec![0.0; 4];
    fg.factor(0).backward_map(marg.view(), &mut grad).unwrap();
    for (g, m) in grad.iter().zip(marg.iter()) {
        assert!((g - m).abs() < 1e-7);
    }
}

#[test]
fn forward_map_is_idempotent() {
    let (_model, mut fg) = triangle();
    fg.forward_map().unwrap();
    let e1 = fg.evaluate_energy(&[1, 0, 1]).unwrap();
    fg.forward_map().unwrap();
    fg.forward_map().unwrap();
    let e2 = fg.evaluate_energy(&[1, 0, 1]).unwrap();
    assert_eq!(e1, e2);
}

#[test]
fn weight_update_flows_through_forward_map() {
    let (model, mut fg) = triangle();
    fg.forward_map().unwrap();
    assert!((fg.evaluate_energy(&[0, 0, 0]).unwrap() - 3.0).abs() < 1e-12);

    let pt = model.find_factor_type("pairwise").unwrap();
    pt.set_weights(vec![0.5, 0.2, -0.2, 1.0]).unwrap();
    // The explicit-call contract: tables are stale until forward_map runs.
    assert!((fg.evaluate_energy(&[0, 0, 0]).unwrap() - 3.0).abs() < 1e-12);
    fg.forward_map().unwrap();
    assert!((fg.evaluate_energy(&[0, 0, 0]).unwrap() - 1.5).abs() < 1e-12);

    // Length changes are rejected.
    assert!(pt.set_weights(vec![0.0; 8]).is_err());
}
