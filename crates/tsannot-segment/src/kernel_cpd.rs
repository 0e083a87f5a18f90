//! Kernel change point detection
//!
//! The cost of a segment is its dispersion in the feature space of a
//! positive semi-definite kernel,
//! `Σ k(x_i, x_i) − (1/m) Σ_i Σ_j k(x_i, x_j)` over the segment's rows.
//! A fixed number of change points is solved exactly by dynamic
//! programming; otherwise PELT minimizes cost plus a per-change penalty.

use crate::fitted::{FittedSegmenter, Segmentation, Segmenter};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use tsannot_core::cancel::is_cancelled;
use tsannot_core::math::{median, squared_euclidean};
use tsannot_core::{
    AnnotatorProperties, BreakpointSet, CancellationToken, ChangePointCount, Error,
    ExecutionEngine, FitStatus, Result, SequentialEngine, Series, SeriesAnnotator,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CpdKernel {
    /// `x · y`
    Linear,
    /// `exp(−γ ‖x − y‖²)`; `None` picks `γ` by the median heuristic
    Rbf { gamma: Option<f64> },
    /// `x · y / (‖x‖ ‖y‖)`, zero when either norm vanishes
    Cosine,
}

impl Default for CpdKernel {
    fn default() -> Self {
        CpdKernel::Rbf { gamma: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelCpdParameters {
    pub kernel: CpdKernel,
    pub n_change_points: ChangePointCount,
    /// Penalty per change point for PELT; `None` means `ln N`
    pub penalty: Option<f64>,
    pub min_size: usize,
    /// Breakpoints are restricted to multiples of `jump`
    pub jump: usize,
}

impl Default for KernelCpdParameters {
    fn default() -> Self {
        Self {
            kernel: CpdKernel::default(),
            n_change_points: ChangePointCount::Fixed(1),
            penalty: None,
            min_size: 2,
            jump: 1,
        }
    }
}

impl KernelCpdParameters {
    pub fn with_kernel(mut self, kernel: CpdKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_n_change_points(mut self, n: ChangePointCount) -> Self {
        self.n_change_points = n;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = Some(penalty);
        self
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_jump(mut self, jump: usize) -> Self {
        self.jump = jump;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 {
            return Err(Error::out_of_range("min_size", self.min_size, ">= 1"));
        }
        if self.jump == 0 {
            return Err(Error::out_of_range("jump", self.jump, ">= 1"));
        }
        if let Some(p) = self.penalty {
            if !(p >= 0.0 && p.is_finite()) {
                return Err(Error::out_of_range("penalty", p, "[0, inf)"));
            }
        }
        if let CpdKernel::Rbf { gamma: Some(g) } = self.kernel {
            if !(g > 0.0 && g.is_finite()) {
                return Err(Error::out_of_range("gamma", g, "(0, inf)"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelCpdDiagnostics {
    /// Total segment cost of the returned segmentation
    pub cost: f64,
    /// RBF bandwidth actually used
    pub gamma: Option<f64>,
    /// Penalty used by PELT
    pub penalty: Option<f64>,
}

/// Segment costs from 2-D prefix sums of the Gram matrix
struct KernelCost {
    /// `block[i * (n + 1) + j]`, sum of `K[a][b]` for `a < i`, `b < j`
    block: Vec<f64>,
    diag: Vec<f64>,
    n: usize,
}

impl KernelCost {
    fn new(gram: &[Vec<f64>]) -> Self {
        let n = gram.len();
        let stride = n + 1;
        let mut block = vec![0.0; stride * stride];
        let mut diag = vec![0.0; stride];
        for i in 0..n {
            diag[i + 1] = diag[i] + gram[i][i];
            let mut row = 0.0;
            for j in 0..n {
                row += gram[i][j];
                block[(i + 1) * stride + j + 1] = block[i * stride + j + 1] + row;
            }
        }
        Self { block, diag, n }
    }

    fn cost(&self, a: usize, b: usize) -> f64 {
        let s = self.n + 1;
        let within = self.block[b * s + b] - self.block[a * s + b] - self.block[b * s + a]
            + self.block[a * s + a];
        (self.diag[b] - self.diag[a]) - within / (b - a) as f64
    }
}

/// Kernel change point detector
#[derive(Debug, Clone)]
pub struct KernelCpd<E: ExecutionEngine = SequentialEngine> {
    params: KernelCpdParameters,
    engine: E,
    cancel: Option<CancellationToken>,
}

impl KernelCpd<SequentialEngine> {
    pub fn new(params: KernelCpdParameters) -> Result<Self> {
        Self::with_engine(params, SequentialEngine)
    }
}

impl<E: ExecutionEngine> KernelCpd<E> {
    pub fn with_engine(params: KernelCpdParameters, engine: E) -> Result<Self> {
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

    pub fn params(&self) -> &KernelCpdParameters {
        &self.params
    }

    fn gram(&self, rows: &[Vec<f64>]) -> (Vec<Vec<f64>>, Option<f64>) {
        let n = rows.len();
        match self.params.kernel {
            CpdKernel::Linear => {
                let gram: Vec<Vec<f64>> = self.engine.execute_batch(n, |i| {
                    rows.iter().map(|r| dot(&rows[i], r)).collect()
                });
                (gram, None)
            }
            CpdKernel::Rbf { gamma } => {
                let gamma = gamma.unwrap_or_else(|| median_heuristic(rows));
                let gram: Vec<Vec<f64>> = self.engine.execute_batch(n, |i| {
                    rows.iter()
                        .map(|r| (-gamma * squared_euclidean(&rows[i], r)).exp())
                        .collect()
                });
                (gram, Some(gamma))
            }
            CpdKernel::Cosine => {
                let norms: Vec<f64> = rows.iter().map(|r| dot(r, r).sqrt()).collect();
                let gram: Vec<Vec<f64>> = self.engine.execute_batch(n, |i| {
                    rows.iter()
                        .zip(&norms)
                        .map(|(r, &nr)| {
                            let denom = norms[i] * nr;
                            if denom > 0.0 {
                                dot(&rows[i], r) / denom
                            } else {
                                0.0
                            }
                        })
                        .collect()
                });
                (gram, None)
            }
        }
    }

    /// Admissible segment ends: multiples of `jump` below `n`, then `n`
    fn positions(&self, n: usize) -> Vec<usize> {
        let mut p: Vec<usize> = (self.params.jump..n).step_by(self.params.jump).collect();
        p.push(n);
        p
    }

    /// Exact minimum-cost segmentation with `k` change points; `None` when
    /// cancelled
    fn dynamic_program(
        &self,
        cost: &KernelCost,
        k: usize,
        n: usize,
    ) -> Result<Option<(Vec<usize>, f64)>> {
        let min_size = self.params.min_size;
        let mut starts = vec![0];
        starts.extend(self.positions(n));
        let p = starts.len();

        // best[j][e]: min cost of covering [0, starts[e]) with j + 1 segments
        let mut best = vec![vec![f64::INFINITY; p]; k + 1];
        let mut back = vec![vec![usize::MAX; p]; k + 1];
        for e in 1..p {
            if starts[e] >= min_size {
                best[0][e] = cost.cost(0, starts[e]);
                back[0][e] = 0;
            }
        }
        for j in 1..=k {
            if is_cancelled(self.cancel.as_ref()) {
                return Ok(None);
            }
            for e in 1..p {
                for s in 1..e {
                    if starts[e] - starts[s] < min_size || !best[j - 1][s].is_finite() {
                        continue;
                    }
                    let c = best[j - 1][s] + cost.cost(starts[s], starts[e]);
                    if c < best[j][e] {
                        best[j][e] = c;
                        back[j][e] = s;
                    }
                }
            }
        }

        let total = best[k][p - 1];
        if !total.is_finite() {
            return Err(Error::InsufficientData {
                expected: (k + 1) * min_size,
                actual: n,
            });
        }

        let mut breakpoints = Vec::with_capacity(k);
        let mut e = p - 1;
        for j in (1..=k).rev() {
            let s = back[j][e];
            breakpoints.push(starts[s]);
            e = s;
        }
        breakpoints.reverse();
        Ok(Some((breakpoints, total)))
    }

    /// Penalized segmentation by pruned exact linear time search
    fn pelt(&self, cost: &KernelCost, penalty: f64, n: usize) -> (Vec<usize>, f64, FitStatus) {
        let min_size = self.params.min_size;
        let ends = self.positions(n);
        let mut f = vec![f64::INFINITY; n + 1];
        let mut prev = vec![0usize; n + 1];
        f[0] = -penalty;
        let mut candidates = vec![0usize];
        let mut status = FitStatus::Converged;

        for &t in &ends {
            if is_cancelled(self.cancel.as_ref()) {
                status = FitStatus::Cancelled;
                break;
            }
            let mut best = (f64::INFINITY, 0usize);
            for &s in &candidates {
                if t - s < min_size {
                    continue;
                }
                let c = f[s] + cost.cost(s, t) + penalty;
                if c < best.0 {
                    best = (c, s);
                }
            }
            f[t] = best.0;
            prev[t] = best.1;

            if f[t].is_finite() {
                candidates.retain(|&s| t - s < min_size || f[s] + cost.cost(s, t) <= f[t]);
                candidates.push(t);
            }
        }

        if !f[n].is_finite() {
            return (Vec::new(), cost.cost(0, n), status);
        }
        let mut breakpoints = Vec::new();
        let mut t = prev[n];
        while t > 0 {
            breakpoints.push(t);
            t = prev[t];
        }
        breakpoints.reverse();
        let total = f[n] - penalty * breakpoints.len() as f64;
        (breakpoints, total, status)
    }

    #[instrument(skip_all, fields(n = series.len(), kernel = ?self.params.kernel))]
    fn run(&self, series: &Series) -> Result<Segmentation<KernelCpdDiagnostics>> {
        let n = series.len();
        self.params.n_change_points.check(n)?;
        if let Some(k) = self.params.n_change_points.fixed() {
            if (k + 1) * self.params.min_size > n {
                return Err(Error::InsufficientData {
                    expected: (k + 1) * self.params.min_size,
                    actual: n,
                });
            }
            // k + 1 segments need k + 1 admissible ends
            if self.positions(n).len() < k + 1 {
                return Err(Error::InsufficientData {
                    expected: k * self.params.jump + 1,
                    actual: n,
                });
            }
        }

        let rows = series.to_row_major();
        let (gram, gamma) = self.gram(&rows);
        let cost = KernelCost::new(&gram);

        let (breakpoints, total, status, penalty) = match self.params.n_change_points {
            ChangePointCount::Fixed(k) => match self.dynamic_program(&cost, k, n)? {
                Some((b, total)) => (b, total, FitStatus::Converged, None),
                None => (Vec::new(), cost.cost(0, n), FitStatus::Cancelled, None),
            },
            ChangePointCount::Auto => {
                let penalty = self.params.penalty.unwrap_or((n as f64).ln());
                let (b, total, status) = self.pelt(&cost, penalty, n);
                (b, total, status, Some(penalty))
            }
        };
        debug!(breakpoints = ?breakpoints, cost = total, "kernel segmentation");

        Ok(Segmentation {
            breakpoints: BreakpointSet::new(breakpoints, n)?,
            status,
            warnings: Vec::new(),
            diagnostics: KernelCpdDiagnostics {
                cost: total,
                gamma,
                penalty,
            },
        })
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `1 / median(‖x_i − x_j‖²)` over distinct pairs; 1 when the median is 0
fn median_heuristic(rows: &[Vec<f64>]) -> f64 {
    let mut d = Vec::with_capacity(rows.len() * rows.len().saturating_sub(1) / 2);
    for i in 0..rows.len() {
        for j in (i + 1)..rows.len() {
            d.push(squared_euclidean(&rows[i], &rows[j]));
        }
    }
    let med = median(&d);
    if med > 0.0 && med.is_finite() {
        1.0 / med
    } else {
        1.0
    }
}

impl<E: ExecutionEngine> AnnotatorProperties for KernelCpd<E> {
    fn algorithm_name(&self) -> &'static str {
        "KernelCPD"
    }

    fn minimum_sample_size(&self) -> usize {
        let k = self.params.n_change_points.fixed().unwrap_or(0);
        (k + 1) * self.params.min_size
    }
}

impl<E: ExecutionEngine> Segmenter for KernelCpd<E> {
    type Diagnostics = KernelCpdDiagnostics;

    fn segment(&self, series: &Series) -> Result<Segmentation<KernelCpdDiagnostics>> {
        self.run(series)
    }
}

impl<E: ExecutionEngine> SeriesAnnotator for KernelCpd<E> {
    type Fitted = FittedSegmenter<Self>;

    fn fit(&self, series: &Series) -> Result<Self::Fitted> {
        FittedSegmenter::fit(self, series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tsannot_core::test_data::TestSeries;

    fn step_series() -> Series {
        Series::univariate(vec![0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0, 10.0]).unwrap()
    }

    #[test]
    fn test_linear_cost_is_sum_of_squares_about_mean() {
        let rows: Vec<Vec<f64>> = [1.0, 2.0, 4.0, 7.0].iter().map(|&v| vec![v]).collect();
        let gram: Vec<Vec<f64>> = rows
            .iter()
            .map(|a| rows.iter().map(|b| a[0] * b[0]).collect())
            .collect();
        let cost = KernelCost::new(&gram);
        // mean of 2, 4, 7 is 13/3
        let expected: f64 = [2.0f64, 4.0, 7.0].iter().map(|v| (v - 13.0 / 3.0).powi(2)).sum();
        assert_relative_eq!(cost.cost(1, 4), expected, epsilon = 1e-9);
        assert_relative_eq!(cost.cost(2, 3), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_step_with_each_kernel() {
        for kernel in [
            CpdKernel::Linear,
            CpdKernel::Rbf { gamma: None },
            CpdKernel::Rbf { gamma: Some(0.5) },
        ] {
            let cpd = KernelCpd::new(KernelCpdParameters::default().with_kernel(kernel)).unwrap();
            let breaks = cpd.fit_annotate(&step_series()).unwrap();
            assert_eq!(breaks.as_slice(), &[5], "kernel {kernel:?}");
        }
    }

    #[test]
    fn test_median_heuristic_on_step() {
        let cpd = KernelCpd::new(KernelCpdParameters::default()).unwrap();
        let fitted = cpd.fit(&step_series()).unwrap();
        assert_relative_eq!(fitted.diagnostics().gamma.unwrap(), 0.01);
    }

    #[test]
    fn test_cosine_direction_change() {
        let mut rows = vec![vec![1.0, 0.1]; 10];
        rows.extend(vec![vec![0.1, 1.0]; 10]);
        let series = Series::from_rows(&rows).unwrap();
        let cpd = KernelCpd::new(KernelCpdParameters::default().with_kernel(CpdKernel::Cosine))
            .unwrap();
        assert_eq!(cpd.fit_annotate(&series).unwrap().as_slice(), &[10]);
    }

    #[test]
    fn test_dynamic_program_is_optimal() {
        let values = TestSeries::piecewise_constant(&[0.0, 2.0, -1.0], 6, 0.7, 17);
        let series = Series::univariate(values).unwrap();
        let cpd = KernelCpd::new(
            KernelCpdParameters::default()
                .with_kernel(CpdKernel::Linear)
                .with_n_change_points(ChangePointCount::Fixed(2)),
        )
        .unwrap();
        let fitted = cpd.fit(&series).unwrap();

        let rows = series.to_row_major();
        let (gram, _) = cpd.gram(&rows);
        let cost = KernelCost::new(&gram);
        let n = series.len();
        let mut brute = f64::INFINITY;
        for a in 2..n {
            for b in (a + 2)..=(n - 2) {
                brute = brute.min(cost.cost(0, a) + cost.cost(a, b) + cost.cost(b, n));
            }
        }
        assert_relative_eq!(fitted.diagnostics().cost, brute, epsilon = 1e-9);
    }

    #[test]
    fn test_pelt_finds_regimes() {
        let values = TestSeries::piecewise_constant(&[0.0, 5.0, 0.0], 40, 0.5, 23);
        let series = Series::univariate(values).unwrap();
        let cpd = KernelCpd::new(
            KernelCpdParameters::default()
                .with_n_change_points(ChangePointCount::Auto)
                .with_penalty(10.0),
        )
        .unwrap();
        let breaks = cpd.fit_annotate(&series).unwrap();
        assert_eq!(breaks.len(), 2);
        assert!(breaks.as_slice()[0].abs_diff(40) <= 2);
        assert!(breaks.as_slice()[1].abs_diff(80) <= 2);
    }

    #[test]
    fn test_jump_restricts_positions() {
        let values = TestSeries::piecewise_constant(&[0.0, 5.0], 23, 0.1, 1);
        let series = Series::univariate(values).unwrap();
        let cpd = KernelCpd::new(KernelCpdParameters::default().with_jump(5)).unwrap();
        let breaks = cpd.fit_annotate(&series).unwrap();
        assert_eq!(breaks.as_slice()[0] % 5, 0);
    }

    #[test]
    fn test_jump_leaves_too_few_positions() {
        // ends at 5 and 10 only, so at most one change point
        let cpd = KernelCpd::new(
            KernelCpdParameters::default()
                .with_jump(5)
                .with_n_change_points(ChangePointCount::Fixed(2)),
        )
        .unwrap();
        assert!(matches!(
            cpd.fit(&step_series()).unwrap_err(),
            Error::InsufficientData {
                expected: 11,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_insufficient_data() {
        let cpd = KernelCpd::new(
            KernelCpdParameters::default()
                .with_min_size(3)
                .with_n_change_points(ChangePointCount::Fixed(4)),
        )
        .unwrap();
        assert!(matches!(
            cpd.fit(&step_series()).unwrap_err(),
            Error::InsufficientData {
                expected: 15,
                actual: 10
            }
        ));
    }
}
