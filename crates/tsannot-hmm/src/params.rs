//! HMM configuration

use serde::{Deserialize, Serialize};
use tsannot_core::{Error, Result};

/// Shape of the Gaussian covariance matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceKind {
    /// Independent variances per dimension
    #[default]
    Diagonal,
    /// Unrestricted symmetric positive definite matrix
    Full,
    /// A single variance shared by all dimensions
    Spherical,
    /// One full matrix shared by all states (by all mixture components of
    /// a state for GMM emissions)
    Tied,
}

/// Emission family of the hidden states
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum EmissionKind {
    Gaussian {
        covariance: CovarianceKind,
    },
    /// Mixture of `n_mix` Gaussians per state
    Gmm {
        n_mix: usize,
        covariance: CovarianceKind,
    },
    /// Independent Poisson counts per column
    Poisson,
    /// Univariate symbols `0..n_symbols`; `None` infers the alphabet from
    /// the training data
    Categorical {
        n_symbols: Option<usize>,
    },
}

impl Default for EmissionKind {
    fn default() -> Self {
        Self::Gaussian {
            covariance: CovarianceKind::default(),
        }
    }
}

/// What to do with a state that never receives posterior mass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Fail with [`Error::DegenerateModel`]
    #[default]
    Error,
    /// Drop the state and refit with one state fewer
    ReduceStates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmmParameters {
    pub n_states: usize,
    pub emission: EmissionKind,
    /// EM stops when the log-likelihood improves by less than this
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Added to covariance diagonals after every update
    pub min_covar: f64,
    /// A state whose share of the posterior mass stays below this in every
    /// iteration is degenerate
    pub degenerate_threshold: f64,
    pub degenerate_policy: DegeneratePolicy,
    /// Seed of the k-means++ initialization
    pub seed: u64,
}

impl Default for HmmParameters {
    fn default() -> Self {
        Self {
            n_states: 2,
            emission: EmissionKind::default(),
            tolerance: 1e-4,
            max_iterations: 100,
            min_covar: 1e-3,
            degenerate_threshold: 1e-3,
            degenerate_policy: DegeneratePolicy::Error,
            seed: 0,
        }
    }
}

impl HmmParameters {
    pub fn new(n_states: usize, emission: EmissionKind) -> Self {
        Self {
            n_states,
            emission,
            ..Default::default()
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_min_covar(mut self, min_covar: f64) -> Self {
        self.min_covar = min_covar;
        self
    }

    pub fn with_degenerate_threshold(mut self, threshold: f64) -> Self {
        self.degenerate_threshold = threshold;
        self
    }

    pub fn with_degenerate_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate_policy = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_states == 0 {
            return Err(Error::out_of_range("n_states", self.n_states, ">= 1"));
        }
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(Error::out_of_range("tolerance", self.tolerance, "[0, inf)"));
        }
        if self.max_iterations == 0 {
            return Err(Error::out_of_range(
                "max_iterations",
                self.max_iterations,
                ">= 1",
            ));
        }
        if !(self.min_covar > 0.0 && self.min_covar.is_finite()) {
            return Err(Error::out_of_range("min_covar", self.min_covar, "(0, inf)"));
        }
        if !(0.0..1.0).contains(&self.degenerate_threshold) {
            return Err(Error::out_of_range(
                "degenerate_threshold",
                self.degenerate_threshold,
                "[0, 1)",
            ));
        }
        match self.emission {
            EmissionKind::Gmm { n_mix: 0, .. } => {
                Err(Error::out_of_range("n_mix", 0, ">= 1"))
            }
            EmissionKind::Categorical { n_symbols: Some(0) } => {
                Err(Error::out_of_range("n_symbols", 0, ">= 1"))
            }
            _ => Ok(()),
        }
    }
}
