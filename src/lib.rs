//! Discrete factor-graph inference and conditioning engine.
//!
//! A model is a catalog of named [`FactorType`]s (cardinality signature plus
//! a learnable weight vector). A [`FactorGraph`] instantiates factors over a
//! concrete set of discrete variables, materializes their energy tables
//! through an explicit forward map, and answers energy, marginal and
//! partition-function queries through one of the [`inference`] algorithms.
//! [`conditioning`] reduces a graph under a partial observation of its
//! variables.
//!
//! Energies are negative log unnormalized probabilities: lower energy means
//! higher probability. All partition functions are tracked in log domain.

pub mod conditioning;
pub mod factor;
pub mod graph;
pub mod index;
pub mod inference;
pub mod model;

pub use conditioning::{condition_factor_graph, ConditionedGraph, FactorConditioningTable};
pub use factor::Factor;
pub use graph::{FactorGraph, FactorGraphObservation, FactorGraphPartialObservation};
pub use index::JointIndexer;
pub use inference::{
    BeliefPropagation, BruteForceInference, GibbsInference, InferenceMethod, Schedule,
    TreeInference,
};
pub use model::{FactorGraphModel, FactorType};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FgError>;

#[derive(Error, Debug)]
pub enum FgError {
    #[error("A factor type named \"{0}\" is already registered.")]
    DuplicateFactorType(String),
    #[error("No factor type named \"{0}\".")]
    UnknownFactorType(String),
    #[error("Cardinality vector is empty or contains a zero entry.")]
    EmptyCardinality,
    #[error("Weight vector length {len} is not a multiple of the {n_states} joint states.")]
    WeightLength { len: usize, n_states: usize },
    #[error("Factor data length {len}, expected {expected}.")]
    DataLength { len: usize, expected: usize },
    #[error("Factor scope does not fit the graph: {0}.")]
    ScopeMismatch(String),
    #[error("Vector length {got}, expected {expected}.")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Factor type \"{0}\" has no learnable weights.")]
    UnparametrizedFactorType(String),
    #[error("Energy tables are stale or missing, call forward_map first.")]
    ForwardMapRequired,
    #[error("The factor graph contains a cycle.")]
    NotATree,
    #[error("Joint state space has {n_states} states, above the ceiling of {ceiling}.")]
    IntractableSize { n_states: usize, ceiling: usize },
    #[error("Invalid partial observation: {0}.")]
    InvalidObservation(String),
}

/// Controls progress reporting of long-running inference loops.
#[derive(Clone, Debug, Default)]
pub struct Config {
    show_progress: bool,
}

impl Config {
    pub fn with_progress() -> Self {
        Self {
            show_progress: true,
        }
    }
    pub fn no_progress() -> Self {
        Self {
            show_progress: false,
        }
    }
    pub(crate) fn show_progress(&self) -> bool {
        self.show_progress
    }
}
