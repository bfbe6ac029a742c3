//! Factor type catalog: named, reusable energy-function templates.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use indexmap::IndexMap;

use crate::{FgError, Result};

type NamedList<T> = IndexMap<String, T>;

/// A named template describing a factor's variable-cardinality signature and
/// its learnable weight vector.
///
/// The weight vector holds one contiguous block per joint-state index. With
/// block width one the energy of a state is the corresponding scalar weight;
/// with a wider block the energy is the dot product of the block with the
/// factor instance's feature-data vector. An empty weight vector marks a
/// data-table type: each instance then carries its full energy table as
/// per-instance data.
///
/// Weights live behind a lock so that learning procedures can update them in
/// place between inference runs while factor instances share the type.
#[derive(Debug)]
pub struct FactorType {
    name: String,
    card: Vec<usize>,
    n_states: usize,
    weights: RwLock<Vec<f64>>,
}

impl FactorType {
    pub fn new(name: impl Into<String>, card: Vec<usize>, weights: Vec<f64>) -> Result<Self> {
        if card.is_empty() || card.contains(&0) {
            return Err(FgError::EmptyCardinality);
        }
        let n_states = card.iter().product();
        if !weights.is_empty() && weights.len() % n_states != 0 {
            return Err(FgError::WeightLength {
                len: weights.len(),
                n_states,
            });
        }
        Ok(Self {
            name: name.into(),
            card,
            n_states,
            weights: RwLock::new(weights),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-slot state counts, in scope order.
    pub fn card(&self) -> &[usize] {
        &self.card
    }

    /// Number of joint states, the product of the cardinalities.
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Width of the per-state weight block (0 for data-table types).
    pub fn feature_len(&self) -> usize {
        self.weights.read().unwrap().len() / self.n_states
    }

    /// Whether this type carries learnable weights.
    pub fn is_parametric(&self) -> bool {
        !self.weights.read().unwrap().is_empty()
    }

    pub fn weights(&self) -> RwLockReadGuard<'_, Vec<f64>> {
        self.weights.read().unwrap()
    }

    /// In-place weight update (the learner hook). The length must not
    /// change; forward maps of graphs using this type become stale and must
    /// be recomputed by the caller.
    pub fn set_weights(&self, weights: Vec<f64>) -> Result<()> {
        let mut w = self.weights.write().unwrap();
        if weights.len() != w.len() {
            return Err(FgError::WeightLength {
                len: weights.len(),
                n_states: self.n_states,
            });
        }
        *w = weights;
        Ok(())
    }
}

/// Name-keyed catalog owning the factor types of a model.
#[derive(Debug, Default)]
pub struct FactorGraphModel {
    types: NamedList<Arc<FactorType>>,
}

impl FactorGraphModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type, enforcing name uniqueness. Returns the shared
    /// handle under which factor instances reference the type.
    pub fn add_factor_type(&mut self, ty: FactorType) -> Result<Arc<FactorType>> {
        if self.types.contains_key(ty.name()) {
            return Err(FgError::DuplicateFactorType(ty.name().to_owned()));
        }
        let ty = Arc::new(ty);
        self.types.insert(ty.name().to_owned(), Arc::clone(&ty));
        Ok(ty)
    }

    pub fn find_factor_type(&self, name: &str) -> Result<Arc<FactorType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| FgError::UnknownFactorType(name.to_owned()))
    }

    /// Registered types in registration order.
    pub fn factor_types(&self) -> impl Iterator<Item = &Arc<FactorType>> {
        self.types.values()
    }
}
