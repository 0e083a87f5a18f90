//! Greedy Gaussian Segmentation
//!
//! Each segment is modelled as a multivariate Gaussian with regularized
//! covariance. The negative log-likelihood of a segment of `m` rows is, up
//! to constants, `(m/2) · logdet(Σ̂ + (λ/m) I)`. Breakpoints are inserted one
//! at a time where they reduce the total cost most, and after each
//! insertion all breakpoints are re-placed by coordinate descent.

use crate::fitted::{FittedSegmenter, Segmentation, Segmenter};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use tsannot_core::cancel::is_cancelled;
use tsannot_core::{
    AnnotationWarning, AnnotatorProperties, BreakpointSet, CancellationToken, ChangePointCount,
    Error, ExecutionEngine, FitStatus, Result, SequentialEngine, Series, SeriesAnnotator,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GgsParameters {
    /// Maximum number of breakpoints
    pub k_max: usize,
    /// Covariance regularization, `> 0`
    pub lambda: f64,
    /// Cap on coordinate-descent passes after each insertion
    pub max_shuffles: usize,
    /// Insertions gaining no more than this stop the search
    pub min_gain: f64,
    pub min_segment_length: usize,
}

impl Default for GgsParameters {
    fn default() -> Self {
        Self {
            k_max: 10,
            lambda: 1.0,
            max_shuffles: 250,
            min_gain: 0.0,
            min_segment_length: 2,
        }
    }
}

impl GgsParameters {
    pub fn with_k_max(mut self, k_max: usize) -> Self {
        self.k_max = k_max;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_max_shuffles(mut self, max_shuffles: usize) -> Self {
        self.max_shuffles = max_shuffles;
        self
    }

    pub fn with_min_gain(mut self, min_gain: f64) -> Self {
        self.min_gain = min_gain;
        self
    }

    pub fn with_min_segment_length(mut self, len: usize) -> Self {
        self.min_segment_length = len;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.lambda > 0.0 && self.lambda.is_finite()) {
            return Err(Error::out_of_range("lambda", self.lambda, "(0, inf)"));
        }
        if self.min_segment_length == 0 {
            return Err(Error::out_of_range(
                "min_segment_length",
                self.min_segment_length,
                ">= 1",
            ));
        }
        if !self.min_gain.is_finite() {
            return Err(Error::out_of_range("min_gain", self.min_gain, "finite"));
        }
        Ok(())
    }
}

/// Likelihood trace of a GGS run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GgsDiagnostics {
    /// Total log-likelihood (negative cost) with no breakpoints and after
    /// each insertion and its shuffle passes
    pub log_likelihood: Vec<f64>,
    /// Breakpoints after each insertion
    pub breakpoint_history: Vec<Vec<usize>>,
    /// Coordinate-descent passes run after each insertion
    pub shuffle_passes: Vec<usize>,
}

/// Prefix sums of rows and row outer products
struct GaussianCost {
    sum: Vec<DVector<f64>>,
    outer: Vec<DMatrix<f64>>,
    lambda: f64,
    dim: usize,
}

impl GaussianCost {
    fn new(series: &Series, lambda: f64) -> Self {
        let dim = series.n_columns();
        let n = series.len();
        let mut sum = Vec::with_capacity(n + 1);
        let mut outer = Vec::with_capacity(n + 1);
        sum.push(DVector::zeros(dim));
        outer.push(DMatrix::zeros(dim, dim));
        for row in series.rows() {
            let x = DVector::from_vec(row);
            let next_outer = &outer[outer.len() - 1] + &x * x.transpose();
            let next_sum = &sum[sum.len() - 1] + x;
            sum.push(next_sum);
            outer.push(next_outer);
        }
        Self {
            sum,
            outer,
            lambda,
            dim,
        }
    }

    /// Cost of rows `[a, b)`
    fn cost(&self, a: usize, b: usize) -> f64 {
        let m = (b - a) as f64;
        let s = &self.sum[b] - &self.sum[a];
        let mu = s / m;
        let mut cov = (&self.outer[b] - &self.outer[a]) / m - &mu * mu.transpose();
        for i in 0..self.dim {
            cov[(i, i)] += self.lambda / m;
        }
        0.5 * m * log_det(cov)
    }

    /// Best split of `[a, b)` keeping both parts at least `min_len` long
    fn best_split<E: ExecutionEngine>(
        &self,
        a: usize,
        b: usize,
        min_len: usize,
        engine: &E,
    ) -> Option<(usize, f64)> {
        if b - a < 2 * min_len {
            return None;
        }
        let first = a + min_len;
        let last = b - min_len;
        let costs = engine.execute_batch(last + 1 - first, |c| {
            let t = first + c;
            self.cost(a, t) + self.cost(t, b)
        });
        let mut best = (first, costs[0]);
        for (c, &cost) in costs.iter().enumerate().skip(1) {
            if cost < best.1 {
                best = (first + c, cost);
            }
        }
        Some(best)
    }

    fn total(&self, breakpoints: &[usize], n: usize) -> f64 {
        bounds(breakpoints, n)
            .windows(2)
            .map(|w| self.cost(w[0], w[1]))
            .sum()
    }
}

fn bounds(breakpoints: &[usize], n: usize) -> Vec<usize> {
    let mut b = Vec::with_capacity(breakpoints.len() + 2);
    b.push(0);
    b.extend_from_slice(breakpoints);
    b.push(n);
    b
}

/// Log-determinant of a symmetric positive definite matrix
///
/// Falls back to the eigen-decomposition when the Cholesky factorization
/// fails numerically.
fn log_det(m: DMatrix<f64>) -> f64 {
    match m.clone().cholesky() {
        Some(chol) => 2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>(),
        None => SymmetricEigen::new(m)
            .eigenvalues
            .iter()
            .map(|v| v.max(f64::MIN_POSITIVE).ln())
            .sum(),
    }
}

/// Greedy Gaussian segmenter
#[derive(Debug, Clone)]
pub struct GreedyGaussianSegmenter<E: ExecutionEngine = SequentialEngine> {
    params: GgsParameters,
    engine: E,
    cancel: Option<CancellationToken>,
}

impl GreedyGaussianSegmenter<SequentialEngine> {
    pub fn new(params: GgsParameters) -> Result<Self> {
        Self::with_engine(params, SequentialEngine)
    }
}

impl<E: ExecutionEngine> GreedyGaussianSegmenter<E> {
    pub fn with_engine(params: GgsParameters, engine: E) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            engine,
            cancel: None,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn params(&self) -> &GgsParameters {
        &self.params
    }

    /// Re-place every breakpoint within its neighbours until none moves
    ///
    /// Returns the number of passes and whether the pass cap was hit.
    fn shuffle(&self, cost: &GaussianCost, bps: &mut [usize], n: usize) -> (usize, bool) {
        let min_len = self.params.min_segment_length;
        let mut passes = 0;
        while passes < self.params.max_shuffles {
            passes += 1;
            let mut moved = false;
            for i in 0..bps.len() {
                let prev = if i == 0 { 0 } else { bps[i - 1] };
                let next = bps.get(i + 1).copied().unwrap_or(n);
                let current = cost.cost(prev, bps[i]) + cost.cost(bps[i], next);
                if let Some((t, c)) = cost.best_split(prev, next, min_len, &self.engine) {
                    if t != bps[i] && c < current - 1e-10 * current.abs().max(1.0) {
                        bps[i] = t;
                        moved = true;
                    }
                }
            }
            if !moved {
                return (passes, false);
            }
        }
        (passes, self.params.max_shuffles > 0)
    }

    #[instrument(skip_all, fields(n = series.len(), dim = series.n_columns(), k_max = self.params.k_max))]
    fn run(&self, series: &Series) -> Result<Segmentation<GgsDiagnostics>> {
        let n = series.len();
        ChangePointCount::Fixed(self.params.k_max).check(n)?;
        if n < self.params.min_segment_length {
            return Err(Error::InsufficientData {
                expected: self.params.min_segment_length,
                actual: n,
            });
        }

        let cost = GaussianCost::new(series, self.params.lambda);
        let mut bps: Vec<usize> = Vec::new();
        let mut diagnostics = GgsDiagnostics {
            log_likelihood: vec![-cost.total(&bps, n)],
            ..Default::default()
        };
        let mut status = FitStatus::Converged;
        let mut warnings = Vec::new();

        while bps.len() < self.params.k_max {
            if is_cancelled(self.cancel.as_ref()) {
                status = FitStatus::Cancelled;
                break;
            }

            let b = bounds(&bps, n);
            let mut best: Option<(usize, f64)> = None;
            for w in b.windows(2) {
                let Some((t, split_cost)) =
                    cost.best_split(w[0], w[1], self.params.min_segment_length, &self.engine)
                else {
                    continue;
                };
                let gain = cost.cost(w[0], w[1]) - split_cost;
                if best.map_or(true, |(_, g)| gain > g) {
                    best = Some((t, gain));
                }
            }

            let Some((t, gain)) = best else {
                debug!("no admissible split left");
                break;
            };
            if gain <= self.params.min_gain {
                debug!(t, gain, "best insertion below minimum gain");
                break;
            }

            let pos = bps.partition_point(|&x| x < t);
            bps.insert(pos, t);
            let (passes, capped) = self.shuffle(&cost, &mut bps, n);
            let ll = -cost.total(&bps, n);
            debug!(t, gain, passes, log_likelihood = ll, "inserted breakpoint");

            if capped {
                let last_change = ll - diagnostics.log_likelihood.last().copied().unwrap_or(ll);
                warn!(passes, "shuffle pass cap reached; keeping current placement");
                status = FitStatus::ConvergenceWarning;
                warnings.push(AnnotationWarning::Convergence {
                    iterations: passes,
                    last_change,
                });
            }
            diagnostics.log_likelihood.push(ll);
            diagnostics.breakpoint_history.push(bps.clone());
            diagnostics.shuffle_passes.push(passes);
        }

        Ok(Segmentation {
            breakpoints: BreakpointSet::new(bps, n)?,
            status,
            warnings,
            diagnostics,
        })
    }
}

impl<E: ExecutionEngine> AnnotatorProperties for GreedyGaussianSegmenter<E> {
    fn algorithm_name(&self) -> &'static str {
        "GGS"
    }

    fn minimum_sample_size(&self) -> usize {
        (self.params.k_max + 1).max(self.params.min_segment_length)
    }
}

impl<E: ExecutionEngine> Segmenter for GreedyGaussianSegmenter<E> {
    type Diagnostics = GgsDiagnostics;

    fn segment(&self, series: &Series) -> Result<Segmentation<GgsDiagnostics>> {
        self.run(series)
    }
}

impl<E: ExecutionEngine> SeriesAnnotator for GreedyGaussianSegmenter<E> {
    type Fitted = FittedSegmenter<Self>;

    fn fit(&self, series: &Series) -> Result<Self::Fitted> {
        FittedSegmenter::fit(self, series)
    }
}
