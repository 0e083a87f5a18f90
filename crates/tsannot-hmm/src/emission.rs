//! Emission families and their EM updates

use crate::kmeans::kmeans;
use crate::params::{CovarianceKind, EmissionKind, HmmParameters};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use tsannot_core::math::{log_normalize, logsumexp, poisson_ln_pmf, safe_ln};
use tsannot_core::{Error, ExecutionEngine, Result};

/// States (or mixture components) with less posterior mass keep their
/// previous parameters
const MIN_MASS: f64 = 1e-300;
const MIN_RATE: f64 = 1e-8;

/// Multivariate normal prepared for repeated density evaluation
#[derive(Debug, Clone)]
struct Density {
    mean: DVector<f64>,
    precision: DMatrix<f64>,
    log_norm: f64,
}

impl Density {
    fn new(mean: &DVector<f64>, covar: &DMatrix<f64>) -> Result<Self> {
        let chol = covar.clone().cholesky().ok_or_else(|| {
            Error::DegenerateModel("covariance matrix is not positive definite".to_string())
        })?;
        let log_det = 2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        let dim = mean.len() as f64;
        Ok(Self {
            mean: mean.clone(),
            precision: chol.inverse(),
            log_norm: -0.5 * (dim * (2.0 * PI).ln() + log_det),
        })
    }

    fn ln_pdf(&self, x: &[f64]) -> f64 {
        let diff = DVector::from_column_slice(x) - &self.mean;
        self.log_norm - 0.5 * diff.dot(&(&self.precision * &diff))
    }
}

/// Weighted mean and scatter `Σ w (x − μ)(x − μ)ᵀ`; `None` without mass
fn weighted_moments(rows: &[Vec<f64>], weights: &[f64]) -> Option<(DVector<f64>, DMatrix<f64>, f64)> {
    let dim = rows[0].len();
    let mass: f64 = weights.iter().sum();
    if mass < MIN_MASS {
        return None;
    }
    let mut mean = DVector::zeros(dim);
    for (row, &w) in rows.iter().zip(weights) {
        mean += DVector::from_column_slice(row) * w;
    }
    mean /= mass;
    let mut scatter = DMatrix::zeros(dim, dim);
    for (row, &w) in rows.iter().zip(weights) {
        let diff = DVector::from_column_slice(row) - &mean;
        scatter += &diff * diff.transpose() * w;
    }
    Some((mean, scatter, mass))
}

/// Restrict an empirical covariance to `kind` and regularize its diagonal
fn shape_covariance(kind: CovarianceKind, empirical: &DMatrix<f64>, min_covar: f64) -> DMatrix<f64> {
    let dim = empirical.nrows();
    match kind {
        CovarianceKind::Full | CovarianceKind::Tied => {
            empirical + DMatrix::identity(dim, dim) * min_covar
        }
        CovarianceKind::Diagonal => {
            DMatrix::from_diagonal(&empirical.diagonal().add_scalar(min_covar))
        }
        CovarianceKind::Spherical => {
            let avg = empirical.trace() / dim as f64;
            DMatrix::identity(dim, dim) * (avg + min_covar)
        }
    }
}

fn data_covariance(rows: &[Vec<f64>]) -> DMatrix<f64> {
    let weights = vec![1.0; rows.len()];
    match weighted_moments(rows, &weights) {
        Some((_, scatter, mass)) => scatter / mass,
        None => DMatrix::zeros(rows[0].len(), rows[0].len()),
    }
}

/// One Gaussian per state
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianEmission {
    covariance: CovarianceKind,
    means: Vec<DVector<f64>>,
    covars: Vec<DMatrix<f64>>,
}

impl GaussianEmission {
    pub fn covariance_kind(&self) -> CovarianceKind {
        self.covariance
    }

    pub fn means(&self) -> &[DVector<f64>] {
        &self.means
    }

    /// Full covariance matrices, one per state, whatever the kind
    pub fn covars(&self) -> &[DMatrix<f64>] {
        &self.covars
    }

    fn init(kind: CovarianceKind, rows: &[Vec<f64>], n_states: usize, params: &HmmParameters) -> Self {
        let km = kmeans(rows, n_states, params.seed);
        let covar = shape_covariance(kind, &data_covariance(rows), params.min_covar);
        Self {
            covariance: kind,
            means: km.centroids.into_iter().map(DVector::from_vec).collect(),
            covars: vec![covar; n_states],
        }
    }

    fn update(&mut self, rows: &[Vec<f64>], gamma: &[Vec<f64>], min_covar: f64) {
        let mut pooled: Option<(DMatrix<f64>, f64)> = None;
        for k in 0..self.means.len() {
            let weights: Vec<f64> = gamma.iter().map(|g| g[k]).collect();
            let Some((mean, scatter, mass)) = weighted_moments(rows, &weights) else {
                continue;
            };
            self.means[k] = mean;
            if self.covariance == CovarianceKind::Tied {
                pooled = Some(match pooled {
                    Some((acc, total)) => (acc + scatter, total + mass),
                    None => (scatter, mass),
                });
            } else {
                self.covars[k] = shape_covariance(self.covariance, &(scatter / mass), min_covar);
            }
        }
        if let Some((scatter, mass)) = pooled {
            let shared = shape_covariance(CovarianceKind::Tied, &(scatter / mass), min_covar);
            self.covars.iter_mut().for_each(|c| *c = shared.clone());
        }
    }
}

/// A Gaussian mixture per state
#[derive(Debug, Clone, PartialEq)]
pub struct GmmEmission {
    covariance: CovarianceKind,
    /// `weights[state][component]`
    weights: Vec<Vec<f64>>,
    means: Vec<Vec<DVector<f64>>>,
    covars: Vec<Vec<DMatrix<f64>>>,
}

impl GmmEmission {
    pub fn covariance_kind(&self) -> CovarianceKind {
        self.covariance
    }

    pub fn weights(&self) -> &[Vec<f64>] {
        &self.weights
    }

    pub fn means(&self) -> &[Vec<DVector<f64>>] {
        &self.means
    }

    pub fn covars(&self) -> &[Vec<DMatrix<f64>>] {
        &self.covars
    }

    fn init(
        kind: CovarianceKind,
        n_mix: usize,
        rows: &[Vec<f64>],
        n_states: usize,
        params: &HmmParameters,
    ) -> Self {
        let states = kmeans(rows, n_states, params.seed);
        let covar = shape_covariance(kind, &data_covariance(rows), params.min_covar);
        let mut means = Vec::with_capacity(n_states);
        for k in 0..n_states {
            let members: Vec<Vec<f64>> = rows
                .iter()
                .zip(&states.labels)
                .filter(|(_, &l)| l == k)
                .map(|(r, _)| r.clone())
                .collect();
            let source: &[Vec<f64>] = if members.is_empty() { rows } else { &members };
            let components = kmeans(source, n_mix, params.seed.wrapping_add(k as u64 + 1));
            means.push(components.centroids.into_iter().map(DVector::from_vec).collect());
        }
        Self {
            covariance: kind,
            weights: vec![vec![1.0 / n_mix as f64; n_mix]; n_states],
            means,
            covars: vec![vec![covar; n_mix]; n_states],
        }
    }

    fn densities(&self) -> Result<Vec<Vec<Density>>> {
        self.means
            .iter()
            .zip(&self.covars)
            .map(|(ms, cs)| ms.iter().zip(cs).map(|(m, c)| Density::new(m, c)).collect())
            .collect()
    }

    /// Per-component `ln w_m + ln N_m(x)` for one state
    fn component_terms(weights: &[f64], densities: &[Density], x: &[f64]) -> Vec<f64> {
        weights
            .iter()
            .zip(densities)
            .map(|(&w, d)| safe_ln(w) + d.ln_pdf(x))
            .collect()
    }

    fn update(&mut self, rows: &[Vec<f64>], gamma: &[Vec<f64>], min_covar: f64) -> Result<()> {
        let densities = self.densities()?;
        for k in 0..self.weights.len() {
            let n_mix = self.weights[k].len();
            // resp[m][t] = gamma[t][k] * P(component m | x_t, state k)
            let mut resp = vec![vec![0.0; rows.len()]; n_mix];
            for (t, row) in rows.iter().enumerate() {
                let mut terms = Self::component_terms(&self.weights[k], &densities[k], row);
                log_normalize(&mut terms);
                for (m, term) in terms.iter().enumerate() {
                    resp[m][t] = gamma[t][k] * term.exp();
                }
            }

            let state_mass: f64 = gamma.iter().map(|g| g[k]).sum();
            if state_mass < MIN_MASS {
                continue;
            }

            let mut pooled: Option<(DMatrix<f64>, f64)> = None;
            for (m, weights) in resp.iter().enumerate() {
                let Some((mean, scatter, mass)) = weighted_moments(rows, weights) else {
                    continue;
                };
                self.weights[k][m] = mass / state_mass;
                self.means[k][m] = mean;
                if self.covariance == CovarianceKind::Tied {
                    pooled = Some(match pooled {
                        Some((acc, total)) => (acc + scatter, total + mass),
                        None => (scatter, mass),
                    });
                } else {
                    self.covars[k][m] =
                        shape_covariance(self.covariance, &(scatter / mass), min_covar);
                }
            }
            if let Some((scatter, mass)) = pooled {
                let shared = shape_covariance(CovarianceKind::Tied, &(scatter / mass), min_covar);
                self.covars[k].iter_mut().for_each(|c| *c = shared.clone());
            }

            let total: f64 = self.weights[k].iter().sum();
            self.weights[k].iter_mut().for_each(|w| *w /= total);
        }
        Ok(())
    }
}

/// Independent Poisson counts per column
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonEmission {
    /// `rates[state][column]`
    rates: Vec<Vec<f64>>,
}

impl PoissonEmission {
    pub fn rates(&self) -> &[Vec<f64>] {
        &self.rates
    }

    fn init(rows: &[Vec<f64>], n_states: usize, seed: u64) -> Self {
        let km = kmeans(rows, n_states, seed);
        let rates = km
            .centroids
            .into_iter()
            .map(|c| c.into_iter().map(|v| v.max(MIN_RATE)).collect())
            .collect();
        Self { rates }
    }

    fn update(&mut self, rows: &[Vec<f64>], gamma: &[Vec<f64>]) {
        for (k, rates) in self.rates.iter_mut().enumerate() {
            let mass: f64 = gamma.iter().map(|g| g[k]).sum();
            if mass < MIN_MASS {
                continue;
            }
            for (d, rate) in rates.iter_mut().enumerate() {
                let weighted: f64 = rows.iter().zip(gamma).map(|(r, g)| g[k] * r[d]).sum();
                *rate = (weighted / mass).max(MIN_RATE);
            }
        }
    }
}

/// Symbols `0..n_symbols` with a probability table per state
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalEmission {
    /// `probs[state][symbol]`
    probs: Vec<Vec<f64>>,
}

impl CategoricalEmission {
    pub fn probs(&self) -> &[Vec<f64>] {
        &self.probs
    }

    pub fn n_symbols(&self) -> usize {
        self.probs.first().map_or(0, Vec::len)
    }

    fn init(n_symbols: usize, n_states: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let probs = (0..n_states)
            .map(|_| {
                let row: Vec<f64> = (0..n_symbols).map(|_| rng.gen_range(0.5..1.5)).collect();
                let total: f64 = row.iter().sum();
                row.into_iter().map(|p| p / total).collect()
            })
            .collect();
        Self { probs }
    }

    fn update(&mut self, rows: &[Vec<f64>], gamma: &[Vec<f64>]) {
        for (k, probs) in self.probs.iter_mut().enumerate() {
            let mut counts = vec![0.0; probs.len()];
            for (row, g) in rows.iter().zip(gamma) {
                counts[row[0] as usize] += g[k];
            }
            let mass: f64 = counts.iter().sum();
            if mass < MIN_MASS {
                continue;
            }
            for (p, c) in probs.iter_mut().zip(counts) {
                *p = c / mass;
            }
        }
    }
}

/// Emission model of a fitted HMM
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Gaussian(GaussianEmission),
    Gmm(GmmEmission),
    Poisson(PoissonEmission),
    Categorical(CategoricalEmission),
}

impl Emission {
    /// Initial parameters for `n_states` states fitted to `rows`
    pub(crate) fn init(rows: &[Vec<f64>], n_states: usize, params: &HmmParameters) -> Self {
        match params.emission {
            EmissionKind::Gaussian { covariance } => {
                Self::Gaussian(GaussianEmission::init(covariance, rows, n_states, params))
            }
            EmissionKind::Gmm { n_mix, covariance } => {
                Self::Gmm(GmmEmission::init(covariance, n_mix, rows, n_states, params))
            }
            EmissionKind::Poisson => Self::Poisson(PoissonEmission::init(rows, n_states, params.seed)),
            EmissionKind::Categorical { n_symbols } => {
                let observed = rows.iter().map(|r| r[0] as usize + 1).max().unwrap_or(1);
                let n_symbols = n_symbols.unwrap_or(observed);
                Self::Categorical(CategoricalEmission::init(n_symbols, n_states, params.seed))
            }
        }
    }

    pub fn n_states(&self) -> usize {
        match self {
            Self::Gaussian(g) => g.means.len(),
            Self::Gmm(g) => g.weights.len(),
            Self::Poisson(p) => p.rates.len(),
            Self::Categorical(c) => c.probs.len(),
        }
    }

    /// Number of columns the model expects
    pub fn n_features(&self) -> usize {
        match self {
            Self::Gaussian(g) => g.means.first().map_or(0, |m| m.len()),
            Self::Gmm(g) => g.means.first().and_then(|c| c.first()).map_or(0, |m| m.len()),
            Self::Poisson(p) => p.rates.first().map_or(0, Vec::len),
            Self::Categorical(_) => 1,
        }
    }

    /// `log p(x_t | z_t = k)` for every row, indexed `[t][k]`
    pub(crate) fn log_likelihoods<E: ExecutionEngine>(
        &self,
        rows: &[Vec<f64>],
        engine: &E,
    ) -> Result<Vec<Vec<f64>>> {
        let table = match self {
            Self::Gaussian(g) => {
                let densities = g
                    .means
                    .iter()
                    .zip(&g.covars)
                    .map(|(m, c)| Density::new(m, c))
                    .collect::<Result<Vec<_>>>()?;
                engine.execute_batch(rows.len(), |t| {
                    densities.iter().map(|d| d.ln_pdf(&rows[t])).collect::<Vec<f64>>()
                })
            }
            Self::Gmm(g) => {
                let densities = g.densities()?;
                engine.execute_batch(rows.len(), |t| {
                    g.weights
                        .iter()
                        .zip(&densities)
                        .map(|(w, ds)| logsumexp(&GmmEmission::component_terms(w, ds, &rows[t])))
                        .collect::<Vec<f64>>()
                })
            }
            Self::Poisson(p) => engine.execute_batch(rows.len(), |t| {
                p.rates
                    .iter()
                    .map(|rates| {
                        rows[t]
                            .iter()
                            .zip(rates)
                            .map(|(&x, &rate)| poisson_ln_pmf(x, rate))
                            .sum::<f64>()
                    })
                    .collect::<Vec<f64>>()
            }),
            Self::Categorical(c) => engine.execute_batch(rows.len(), |t| {
                let symbol = rows[t][0] as usize;
                c.probs
                    .iter()
                    .map(|probs| probs.get(symbol).copied().map_or(f64::NEG_INFINITY, safe_ln))
                    .collect::<Vec<f64>>()
            }),
        };
        Ok(table)
    }

    /// M-step for the emission parameters
    pub(crate) fn update(&mut self, rows: &[Vec<f64>], gamma: &[Vec<f64>], min_covar: f64) -> Result<()> {
        match self {
            Self::Gaussian(g) => g.update(rows, gamma, min_covar),
            Self::Gmm(g) => g.update(rows, gamma, min_covar)?,
            Self::Poisson(p) => p.update(rows, gamma),
            Self::Categorical(c) => c.update(rows, gamma),
        }
        Ok(())
    }
}
