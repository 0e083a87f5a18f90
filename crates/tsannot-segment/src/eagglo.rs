//! Agglomerative segmentation with energy statistics (E-Agglo)
//!
//! Clusters are contiguous blocks of observations. The goodness-of-fit of a
//! clustering is the sum of energy divergences between neighbouring
//! clusters; adjacent clusters are merged greedily while recording the fit
//! after each merge, and the answer is read off that history.

use crate::fitted::{FittedSegmenter, Segmentation, Segmenter};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use tsannot_core::cancel::is_cancelled;
use tsannot_core::math::euclidean;
use tsannot_core::{
    AnnotatorProperties, BreakpointSet, CancellationToken, ChangePointCount, Error, FitStatus,
    Result, Series, SeriesAnnotator,
};

/// Penalty added to the goodness-of-fit when the number of change points is
/// chosen automatically
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "weight")]
pub enum EaggloPenalty {
    #[default]
    None,
    /// `−w · (number of change points)`
    SegmentCount(f64),
    /// `+w · (mean segment length)`, favouring fewer, longer segments
    MeanSegmentLength(f64),
}

impl EaggloPenalty {
    fn apply(self, n_segments: usize, n: usize) -> f64 {
        match self {
            Self::None => 0.0,
            Self::SegmentCount(w) => -w * (n_segments.saturating_sub(1)) as f64,
            Self::MeanSegmentLength(w) => w * n as f64 / n_segments as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EaggloParameters {
    /// Observations per initial cluster; a shorter remainder forms the last one
    pub initial_block_size: usize,
    /// Distance exponent, in `(0, 2]`
    pub alpha: f64,
    pub n_change_points: ChangePointCount,
    pub penalty: EaggloPenalty,
}

impl Default for EaggloParameters {
    fn default() -> Self {
        Self {
            initial_block_size: 1,
            alpha: 1.0,
            n_change_points: ChangePointCount::Auto,
            penalty: EaggloPenalty::None,
        }
    }
}

impl EaggloParameters {
    pub fn with_initial_block_size(mut self, size: usize) -> Self {
        self.initial_block_size = size;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_n_change_points(mut self, n: ChangePointCount) -> Self {
        self.n_change_points = n;
        self
    }

    pub fn with_penalty(mut self, penalty: EaggloPenalty) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_block_size == 0 {
            return Err(Error::out_of_range(
                "initial_block_size",
                self.initial_block_size,
                ">= 1",
            ));
        }
        if !(self.alpha > 0.0 && self.alpha <= 2.0) {
            return Err(Error::out_of_range("alpha", self.alpha, "(0, 2]"));
        }
        match self.penalty {
            EaggloPenalty::SegmentCount(w) | EaggloPenalty::MeanSegmentLength(w)
                if !w.is_finite() =>
            {
                Err(Error::InvalidParameter(format!(
                    "penalty weight must be finite, got {w}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Merge history of an E-Agglo run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EaggloDiagnostics {
    /// `(number of clusters, goodness-of-fit)` before the first merge and
    /// after each merge
    pub fit_history: Vec<(usize, f64)>,
    /// Penalized fit for each history entry
    pub penalized: Vec<f64>,
}

/// E-Agglo segmenter
#[derive(Debug, Clone)]
pub struct EAgglo {
    params: EaggloParameters,
    cancel: Option<CancellationToken>,
}

impl EAgglo {
    pub fn new(params: EaggloParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            cancel: None,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn params(&self) -> &EaggloParameters {
        &self.params
    }

    #[instrument(skip_all, fields(n = series.len(), alpha = self.params.alpha))]
    fn run(&self, series: &Series) -> Result<Segmentation<EaggloDiagnostics>> {
        let n = series.len();
        self.params.n_change_points.check(n)?;

        let block = self.params.initial_block_size;
        let starts: Vec<usize> = (0..n).step_by(block).collect();
        if let Some(k) = self.params.n_change_points.fixed() {
            if k + 1 > starts.len() {
                return Err(Error::InsufficientData {
                    expected: (k + 1) * block,
                    actual: n,
                });
            }
        }

        let rows = series.to_row_major();
        let mut state = ClusterState::new(&rows, &starts, self.params.alpha);
        let target = self.params.n_change_points.fixed().map(|k| k + 1);

        let mut history = vec![(state.active.len(), state.fit)];
        let mut removed = Vec::new();
        let mut status = FitStatus::Converged;

        while state.active.len() > target.unwrap_or(1) {
            if is_cancelled(self.cancel.as_ref()) {
                status = FitStatus::Cancelled;
                break;
            }
            let (pos, fit) = state.best_merge();
            let boundary = state.start[state.active[pos + 1]];
            state.merge(pos, fit);
            debug!(boundary, clusters = state.active.len(), fit, "merged");
            removed.push(boundary);
            history.push((state.active.len(), fit));
        }

        let penalized: Vec<f64> = history
            .iter()
            .map(|&(c, fit)| fit + self.params.penalty.apply(c, n))
            .collect();

        // number of merges to replay from the initial clustering
        let merges = match target {
            Some(_) => removed.len(),
            None => {
                // ties go to the later entry, i.e. fewer change points
                let mut best = 0;
                for (i, &p) in penalized.iter().enumerate() {
                    if p >= penalized[best] {
                        best = i;
                    }
                }
                best
            }
        };

        let breakpoints = match target {
            Some(t) if state.active.len() > t => state.strongest_boundaries(t - 1),
            _ => {
                let dropped: std::collections::HashSet<usize> =
                    removed[..merges].iter().copied().collect();
                starts[1..]
                    .iter()
                    .copied()
                    .filter(|s| !dropped.contains(s))
                    .collect()
            }
        };

        Ok(Segmentation {
            breakpoints: BreakpointSet::new(breakpoints, n)?,
            status,
            warnings: Vec::new(),
            diagnostics: EaggloDiagnostics {
                fit_history: history,
                penalized,
            },
        })
    }
}

/// Energy divergence between two clusters from their within/between sums
#[inline]
fn energy(nx: f64, ny: f64, wxy: f64, wxx: f64, wyy: f64) -> f64 {
    nx * ny / (nx + ny) * (2.0 * wxy / (nx * ny) - wxx / (nx * nx) - wyy / (ny * ny))
}

struct ClusterState {
    /// Pairwise distance sums between clusters, indexed by initial cluster id
    w: Vec<Vec<f64>>,
    size: Vec<f64>,
    start: Vec<usize>,
    /// Surviving cluster ids in time order
    active: Vec<usize>,
    fit: f64,
}

impl ClusterState {
    fn new(rows: &[Vec<f64>], starts: &[usize], alpha: f64) -> Self {
        let n = rows.len();
        let c = starts.len();
        let block = starts.get(1).copied().unwrap_or(n).max(1);

        // ordered pairs: within-cluster sums count each pair twice
        let mut w = vec![vec![0.0; c]; c];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = euclidean(&rows[i], &rows[j]).powf(alpha);
                let (a, b) = (i / block, j / block);
                w[a][b] += d;
                w[b][a] += d;
            }
        }

        let size: Vec<f64> = (0..c)
            .map(|a| {
                let end = starts.get(a + 1).copied().unwrap_or(n);
                (end - starts[a]) as f64
            })
            .collect();

        let mut state = Self {
            w,
            size,
            start: starts.to_vec(),
            active: (0..c).collect(),
            fit: 0.0,
        };
        state.fit = (0..c.saturating_sub(1))
            .map(|p| state.pair_energy(p, p + 1))
            .sum();
        state
    }

    fn pair_energy(&self, a: usize, b: usize) -> f64 {
        energy(
            self.size[a],
            self.size[b],
            self.w[a][b],
            self.w[a][a],
            self.w[b][b],
        )
    }

    /// Fit after merging the clusters at positions `pos` and `pos + 1`
    fn merged_fit(&self, pos: usize) -> f64 {
        let a = self.active[pos];
        let b = self.active[pos + 1];
        let nm = self.size[a] + self.size[b];
        let wmm = self.w[a][a] + 2.0 * self.w[a][b] + self.w[b][b];

        let mut fit = self.fit - self.pair_energy(a, b);
        if pos > 0 {
            let l = self.active[pos - 1];
            fit -= self.pair_energy(l, a);
            fit += energy(self.size[l], nm, self.w[l][a] + self.w[l][b], self.w[l][l], wmm);
        }
        if let Some(&r) = self.active.get(pos + 2) {
            fit -= self.pair_energy(b, r);
            fit += energy(nm, self.size[r], self.w[a][r] + self.w[b][r], wmm, self.w[r][r]);
        }
        fit
    }

    /// Adjacent pair whose merge leaves the largest fit, lowest position on ties
    fn best_merge(&self) -> (usize, f64) {
        let mut best = (0, self.merged_fit(0));
        for pos in 1..self.active.len() - 1 {
            let fit = self.merged_fit(pos);
            if fit > best.1 {
                best = (pos, fit);
            }
        }
        best
    }

    /// The `k` boundaries between surviving clusters with the largest
    /// energy divergence, in time order
    fn strongest_boundaries(&self, k: usize) -> Vec<usize> {
        let mut ranked: Vec<(usize, f64)> = self
            .active
            .windows(2)
            .map(|p| (self.start[p[1]], self.pair_energy(p[0], p[1])))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut kept: Vec<usize> = ranked.into_iter().take(k).map(|(s, _)| s).collect();
        kept.sort_unstable();
        kept
    }

    /// Fold cluster `pos + 1` into cluster `pos`
    fn merge(&mut self, pos: usize, fit: f64) {
        let a = self.active[pos];
        let b = self.active.remove(pos + 1);
        let wab = self.w[a][b];
        for x in 0..self.w.len() {
            if x != a && x != b {
                let merged = self.w[a][x] + self.w[b][x];
                self.w[a][x] = merged;
                self.w[x][a] = merged;
            }
        }
        self.w[a][a] += 2.0 * wab + self.w[b][b];
        self.size[a] += self.size[b];
        self.fit = fit;
    }
}

impl AnnotatorProperties for EAgglo {
    fn algorithm_name(&self) -> &'static str {
        "E-Agglo"
    }

    fn minimum_sample_size(&self) -> usize {
        let k = self.params.n_change_points.fixed().unwrap_or(1);
        (k + 1) * self.params.initial_block_size
    }
}

impl Segmenter for EAgglo {
    type Diagnostics = EaggloDiagnostics;

    fn segment(&self, series: &Series) -> Result<Segmentation<EaggloDiagnostics>> {
        self.run(series)
    }
}

impl SeriesAnnotator for EAgglo {
    type Fitted = FittedSegmenter<Self>;

    fn fit(&self, series: &Series) -> Result<Self::Fitted> {
        FittedSegmenter::fit(self, series)
    }
}
