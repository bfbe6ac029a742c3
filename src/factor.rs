//! Factor instances and the forward/backward energy mapping.

use std::sync::Arc;

use itertools::izip;
use ndarray::{Array1, ArrayView1};

use crate::index::JointIndexer;
use crate::model::FactorType;
use crate::{FgError, Result};

/// One energy-table instance: a shared factor type applied to an ordered
/// scope of graph variables, with optional per-instance feature data.
///
/// The concrete energy table is materialized by [`forward_map`]
/// (Factor::forward_map) and indexed in mixed radix with the first scope
/// variable as the least-significant digit.
#[derive(Debug, Clone)]
pub struct Factor {
    ty: Arc<FactorType>,
    vars: Vec<usize>,
    data: Vec<f64>,
    energies: Array1<f64>,
}

impl Factor {
    pub fn new(ty: Arc<FactorType>, vars: Vec<usize>, data: Vec<f64>) -> Self {
        Self {
            ty,
            vars,
            data,
            energies: Array1::zeros(0),
        }
    }

    pub fn factor_type(&self) -> &Arc<FactorType> {
        &self.ty
    }

    /// Scope variable indices, in declared order.
    pub fn vars(&self) -> &[usize] {
        self.vars.as_slice()
    }

    pub fn data(&self) -> &[f64] {
        self.data.as_slice()
    }

    pub fn n_states(&self) -> usize {
        self.ty.n_states()
    }

    /// The materialized energy table; empty until the forward map ran.
    pub fn energies(&self) -> ArrayView1<'_, f64> {
        self.energies.view()
    }

    pub(crate) fn indexer(&self) -> JointIndexer {
        JointIndexer::new(self.ty.card())
    }

    /// Checks that weights and feature data together describe one energy
    /// value per joint state.
    pub(crate) fn check_data(&self) -> Result<()> {
        let n = self.ty.n_states();
        let w_len = self.ty.weights().len();
        if self.data.is_empty() {
            if w_len == 0 {
                // Data-table type: the instance must carry the full table.
                return Err(FgError::DataLength {
                    len: 0,
                    expected: n,
                });
            }
            // Plain table: one scalar weight per state.
            if w_len != n {
                return Err(FgError::DataLength {
                    len: 0,
                    expected: w_len / n,
                });
            }
        } else if w_len == 0 {
            // Data-table type: the instance data is the energy table.
            if self.data.len() != n {
                return Err(FgError::DataLength {
                    len: self.data.len(),
                    expected: n,
                });
            }
        } else if w_len != n * self.data.len() {
            return Err(FgError::DataLength {
                len: self.data.len(),
                expected: w_len / n,
            });
        }
        Ok(())
    }

    /// Materializes the energy table from (weights, feature data).
    pub fn forward_map(&mut self) -> Result<()> {
        self.check_data()?;
        let n = self.ty.n_states();
        let w = self.ty.weights();
        self.energies = if self.data.is_empty() {
            Array1::from_iter(w.iter().copied())
        } else if w.is_empty() {
            Array1::from_vec(self.data.clone())
        } else {
            let k = self.data.len();
            Array1::from_shape_fn(n, |s| {
                izip!(&w[s * k..(s + 1) * k], &self.data)
                    .map(|(wi, di)| wi * di)
                    .sum()
            })
        };
        Ok(())
    }

    /// Adjoint of the forward map: accumulates into `grad` the parameter
    /// gradient implied by a target marginal over this factor's joint
    /// states. For a plain table this is the identity map; for feature
    /// blocks it is the outer product of marginal and data, flattened in
    /// weight-block layout.
    pub fn backward_map(&self, marginal: ArrayView1<f64>, grad: &mut [f64]) -> Result<()> {
        self.check_data()?;
        let n = self.ty.n_states();
        let w_len = self.ty.weights().len();
        if w_len == 0 {
            return Err(FgError::UnparametrizedFactorType(self.ty.name().to_owned()));
        }
        if marginal.len() != n {
            return Err(FgError::DimensionMismatch {
                expected: n,
                got: marginal.len(),
            });
        }
        if grad.len() != w_len {
            return Err(FgError::DimensionMismatch {
                expected: w_len,
                got: grad.len(),
            });
        }
        if self.data.is_empty() {
            for (g, m) in grad.iter_mut().zip(marginal.iter()) {
                *g += m;
            }
        } else {
            let k = self.data.len();
            for (s, m) in marginal.iter().enumerate() {
                for (g, d) in grad[s * k..(s + 1) * k].iter_mut().zip(&self.data) {
                    *g += m * d;
                }
            }
        }
        Ok(())
    }

    /// Table index of the scope sub-state of a full graph assignment.
    pub(crate) fn local_index(&self, full_state: &[usize]) -> usize {
        let mut idx = 0;
        for (&v, &c) in self.vars.iter().zip(self.ty.card().iter()).rev() {
            idx = idx * c + full_state[v];
        }
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_map_feature_blocks() {
        let ty = Arc::new(
            FactorType::new("f", vec![2], vec![1.0, 0.0, 0.0, 2.0]).unwrap(),
        );
        let mut fac = Factor::new(ty, vec![0], vec![0.5, 3.0]);
        fac.forward_map().unwrap();
        // state 0: 1.0*0.5 + 0.0*3.0; state 1: 0.0*0.5 + 2.0*3.0
        assert_eq!(fac.energies().to_vec(), vec![0.5, 6.0]);
    }

    #[test]
    fn missing_data_reports_expected_length() {
        // Data-table type: the instance must supply the whole table.
        let ty = Arc::new(FactorType::new("t", vec![2, 2], vec![]).unwrap());
        let mut fac = Factor::new(ty, vec![0, 1], vec![]);
        assert!(matches!(
            fac.forward_map(),
            Err(FgError::DataLength {
                len: 0,
                expected: 4
            })
        ));
        // Feature-block type without its feature vector.
        let ty = Arc::new(FactorType::new("f", vec![2], vec![0.0; 6]).unwrap());
        let mut fac = Factor::new(ty, vec![0], vec![]);
        assert!(matches!(
            fac.forward_map(),
            Err(FgError::DataLength {
                len: 0,
                expected: 3
            })
        ));
    }

    #[test]
    fn backward_map_is_identity_without_data() {
        let ty = Arc::new(FactorType::new("f", vec![2, 2], vec![0.0; 4]).unwrap());
        let fac = Factor::new(ty, vec![0, 1], vec![]);
        let marg = ndarray::arr1(&[0.25, 0.4, 0.1, 0.25]);
        let mut grad = vec![0.0; 4];
        fac.backward_map(marg.view(), &mut grad).unwrap();
        assert_eq!(grad, vec![0.25, 0.4, 0.1, 0.25]);
    }
}
