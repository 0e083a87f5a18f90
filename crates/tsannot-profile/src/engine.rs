//! Diagonal-traversal profile computation
//!
//! For every subsequence start `i` the engine finds the nearest (or k
//! nearest) non-trivial matches `j` with `|i − j| > ceil(L/2)`. Pairs are
//! visited along diagonals `j = i + d` of the distance matrix, updating the
//! window dot product with
//! `QT[i][j] = QT[i−1][j−1] − T[i−1]·T[j−1] + T[i+L−1]·T[j+L−1]`,
//! so only the first row needs a full sliding dot product.

use crate::dot::sliding_dot_product;
use crate::metric::{Metric, RollingStats};
use crate::topk::TopKAccumulator;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use tsannot_core::{Error, ExecutionEngine, Result, SequentialEngine, Series};

/// Minimum number of subsequences before fanning diagonals out
const MIN_PARALLEL_SUBS: usize = 256;

/// Exclusion zone radius for window length `L`: `ceil(L/2)`
pub fn exclusion_zone(window_length: usize) -> usize {
    window_length.div_ceil(2)
}

/// Check that `window_length` is usable on a series of length `n`
///
/// Requires `2 ≤ L` and `L < n/2`.
pub fn validate_window(window_length: usize, n: usize) -> Result<()> {
    if window_length < 2 {
        return Err(Error::window(window_length, n, "window length must be at least 2"));
    }
    if 2 * window_length >= n {
        return Err(Error::window(
            window_length,
            n,
            "window length must be below half the series length",
        ));
    }
    Ok(())
}

/// Profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub window_length: usize,
    #[serde(default)]
    pub metric: Metric,
}

impl ProfileConfig {
    pub fn new(window_length: usize) -> Self {
        Self {
            window_length,
            metric: Metric::default(),
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }
}

/// Nearest non-trivial match of every subsequence
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    distances: Vec<f64>,
    indices: Vec<Option<usize>>,
    window_length: usize,
    exclusion_zone: usize,
}

impl Profile {
    /// Number of subsequences, `N − L + 1`
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Nearest match per subsequence; `None` when every other window lies
    /// inside the exclusion zone
    pub fn indices(&self) -> &[Option<usize>] {
        &self.indices
    }

    pub fn get(&self, i: usize) -> Option<(f64, Option<usize>)> {
        Some((*self.distances.get(i)?, self.indices[i]))
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn exclusion_zone(&self) -> usize {
        self.exclusion_zone
    }
}

/// The k nearest non-trivial matches of every subsequence
#[derive(Debug, Clone, PartialEq)]
pub struct KnnProfile {
    neighbors: Vec<Vec<(f64, usize)>>,
    k: usize,
    window_length: usize,
    exclusion_zone: usize,
}

impl KnnProfile {
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Up to `k` `(distance, index)` pairs for subsequence `i`, ascending by
    /// distance then index
    pub fn neighbors(&self, i: usize) -> &[(f64, usize)] {
        &self.neighbors[i]
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn exclusion_zone(&self) -> usize {
        self.exclusion_zone
    }

    /// Restrict to subsequences and neighbours inside `[start, end)`,
    /// re-indexed relative to `start`
    ///
    /// Neighbours outside the range are dropped rather than replaced.
    pub fn restrict(&self, start: usize, end: usize) -> KnnProfile {
        let neighbors = self.neighbors[start..end]
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|(_, j)| (start..end).contains(j))
                    .map(|&(d, j)| (d, j - start))
                    .collect()
            })
            .collect();
        KnnProfile {
            neighbors,
            k: self.k,
            window_length: self.window_length,
            exclusion_zone: self.exclusion_zone,
        }
    }
}

/// Profile engine parameterized by execution strategy
#[derive(Debug, Clone)]
pub struct ProfileEngine<E: ExecutionEngine = SequentialEngine> {
    config: ProfileConfig,
    engine: E,
}

impl ProfileEngine<SequentialEngine> {
    pub fn new(config: ProfileConfig) -> Self {
        Self::with_engine(config, SequentialEngine)
    }
}

impl<E: ExecutionEngine> ProfileEngine<E> {
    pub fn with_engine(config: ProfileConfig, engine: E) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Nearest-neighbour profile of a univariate series
    pub fn compute(&self, series: &Series) -> Result<Profile> {
        let ts = series.values()?;
        let knn = self.compute_knn_values(ts, 1)?;
        let (distances, indices) = knn
            .neighbors
            .iter()
            .map(|row| match row.first() {
                Some(&(d, j)) => (d, Some(j)),
                None => (f64::INFINITY, None),
            })
            .unzip();
        Ok(Profile {
            distances,
            indices,
            window_length: knn.window_length,
            exclusion_zone: knn.exclusion_zone,
        })
    }

    /// Top-`k` neighbour profile of a univariate series
    pub fn compute_knn(&self, series: &Series, k: usize) -> Result<KnnProfile> {
        self.compute_knn_values(series.values()?, k)
    }

    /// Top-`k` neighbour profile of raw values
    #[instrument(skip_all, fields(n = ts.len(), window_length = self.config.window_length, k = k))]
    pub fn compute_knn_values(&self, ts: &[f64], k: usize) -> Result<KnnProfile> {
        let m = self.config.window_length;
        let n = ts.len();
        validate_window(m, n)?;
        if k == 0 {
            return Err(Error::InvalidParameter("k must be at least 1".to_string()));
        }

        let n_subs = n + 1 - m;
        let zone = exclusion_zone(m);
        let stats = RollingStats::compute(ts, m);
        let qt_first = sliding_dot_product(&ts[..m], ts)?;
        let first_diag = zone + 1;

        let ctx = DiagonalContext {
            ts,
            m,
            n_subs,
            k,
            metric: self.config.metric,
            stats: &stats,
            qt_first: &qt_first,
        };

        let acc = if self.engine.is_parallel() && n_subs >= MIN_PARALLEL_SUBS {
            let ranges = diagonal_ranges(first_diag, n_subs, self.engine.num_threads());
            debug!(chunks = ranges.len(), "parallel diagonal traversal");
            let partials = self
                .engine
                .execute_batch(ranges.len(), |c| ctx.accumulate(ranges[c].0, ranges[c].1));
            let mut iter = partials.into_iter();
            let mut acc = iter.next().unwrap_or_else(|| TopKAccumulator::new(n_subs, k));
            for partial in iter {
                acc.merge(&partial);
            }
            acc
        } else {
            ctx.accumulate(first_diag, n_subs)
        };

        Ok(KnnProfile {
            neighbors: acc.into_rows(),
            k,
            window_length: m,
            exclusion_zone: zone,
        })
    }
}

struct DiagonalContext<'a> {
    ts: &'a [f64],
    m: usize,
    n_subs: usize,
    k: usize,
    metric: Metric,
    stats: &'a RollingStats,
    qt_first: &'a [f64],
}

impl DiagonalContext<'_> {
    /// Visit diagonals `first..last`
    fn accumulate(&self, first: usize, last: usize) -> TopKAccumulator {
        let (ts, m) = (self.ts, self.m);
        let mut acc = TopKAccumulator::new(self.n_subs, self.k);
        for diag in first..last {
            let mut qt = self.qt_first[diag];
            let d = self.metric.qt_to_distance(qt, 0, diag, m, self.stats);
            acc.update(0, d, diag);
            acc.update(diag, d, 0);

            for i in 1..(self.n_subs - diag) {
                let j = i + diag;
                qt = qt - ts[i - 1] * ts[j - 1] + ts[i + m - 1] * ts[j + m - 1];
                let d = self.metric.qt_to_distance(qt, i, j, m, self.stats);
                acc.update(i, d, j);
                acc.update(j, d, i);
            }
        }
        acc
    }
}

/// Split diagonals `first_diag..n_subs` into `n_chunks` ranges of roughly
/// equal work; diagonal `d` has `n_subs − d` cells
pub fn diagonal_ranges(first_diag: usize, n_subs: usize, n_chunks: usize) -> Vec<(usize, usize)> {
    let n_diags = n_subs.saturating_sub(first_diag);
    if n_diags == 0 || n_chunks == 0 {
        return vec![];
    }
    let n_chunks = n_chunks.min(n_diags);

    // work of the first i diagonals
    let cumwork = |i: usize| -> usize { i * n_diags - i * i.saturating_sub(1) / 2 };
    let total_work = cumwork(n_diags);

    let mut ranges = Vec::with_capacity(n_chunks);
    let mut prev = 0usize;
    for c in 1..=n_chunks {
        let target = if c == n_chunks {
            n_diags
        } else {
            let threshold = (c as f64 * total_work as f64 / n_chunks as f64).round() as usize;
            let (mut lo, mut hi) = (prev, n_diags);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if cumwork(mid) >= threshold {
                    hi = mid;
                } else {
                    lo = mid + 1;
                }
            }
            lo
        };
        if target > prev {
            ranges.push((first_diag + prev, first_diag + target));
        }
        prev = target;
    }
    ranges
}

/// Nearest-neighbour profile with the default metric
pub fn compute_profile(series: &Series, window_length: usize) -> Result<Profile> {
    ProfileEngine::new(ProfileConfig::new(window_length)).compute(series)
}

/// Top-`k` neighbour profile with the default metric
pub fn compute_knn_profile(series: &Series, window_length: usize, k: usize) -> Result<KnnProfile> {
    ProfileEngine::new(ProfileConfig::new(window_length)).compute_knn(series, k)
}
