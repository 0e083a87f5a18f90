//! STRAY anomaly detection
//!
//! Each point is scored by the distance to its k nearest neighbours at the
//! largest gap in the sorted neighbour distances, so that a small cluster
//! of anomalies far from the bulk still stands out. The flagging threshold
//! comes from an extreme value test on the spacings of the upper tail of
//! the sorted scores: the first spacing that is improbably large relative
//! to a weighted average of the spacings below it marks the cutoff.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use tsannot_core::math::{euclidean, quantile};
use tsannot_core::{
    AnnotationWarning, AnnotatorProperties, AnomalyScoreVector, Error, ExecutionEngine,
    FittedAnnotator, Result, SequentialEngine, Series, SeriesAnnotator,
};

/// Column scaling applied before distances are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrayNormalization {
    /// Min-max scaling to `[0, 1]`
    #[default]
    Unitize,
    /// Subtract the median and divide by the interquartile range
    RobustStandardize,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrayParameters {
    /// Significance level of the spacing test
    pub alpha: f64,
    /// Neighbourhood size; capped at `N − 1`
    pub k: usize,
    /// Fraction of the sorted scores searched for the cutoff
    pub p: f64,
    /// Upper bound on the number of spacings averaged by the test
    pub size_threshold: usize,
    pub normalization: StrayNormalization,
}

impl Default for StrayParameters {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            k: 10,
            p: 0.5,
            size_threshold: 50,
            normalization: StrayNormalization::Unitize,
        }
    }
}

impl StrayParameters {
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_p(mut self, p: f64) -> Self {
        self.p = p;
        self
    }

    pub fn with_size_threshold(mut self, size_threshold: usize) -> Self {
        self.size_threshold = size_threshold;
        self
    }

    pub fn with_normalization(mut self, normalization: StrayNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::out_of_range("alpha", self.alpha, "(0, 1)"));
        }
        if self.k == 0 {
            return Err(Error::out_of_range("k", self.k, ">= 1"));
        }
        if !(self.p > 0.0 && self.p <= 1.0) {
            return Err(Error::out_of_range("p", self.p, "(0, 1]"));
        }
        if self.size_threshold < 2 {
            return Err(Error::out_of_range(
                "size_threshold",
                self.size_threshold,
                ">= 2",
            ));
        }
        Ok(())
    }
}

/// Scores and flags of one STRAY run
#[derive(Debug, Clone, PartialEq)]
pub struct StrayResult {
    pub scores: AnomalyScoreVector,
    /// Neighbourhood size actually used
    pub k_used: usize,
    pub warnings: Vec<AnnotationWarning>,
}

/// Row-major data after column normalization
fn normalized_rows(series: &Series, normalization: StrayNormalization) -> Result<Vec<Vec<f64>>> {
    let scaled = match normalization {
        StrayNormalization::Unitize => series.min_max_scaled()?,
        StrayNormalization::RobustStandardize => series.map_columns(|c| {
            let center = quantile(c, 0.5);
            let iqr = quantile(c, 0.75) - quantile(c, 0.25);
            let scale = if iqr > 0.0 { iqr } else { 1.0 };
            c.iter().map(|v| (v - center) / scale).collect()
        })?,
        StrayNormalization::None => series.clone(),
    };
    Ok(scaled.to_row_major())
}

/// Distance at the largest gap among sorted neighbour distances, measuring
/// the first gap from zero; ties go to the nearest neighbour
fn gap_score(sorted: &[f64]) -> f64 {
    let mut prev = 0.0;
    let mut best = (f64::NEG_INFINITY, 0.0);
    for &d in sorted {
        let gap = d - prev;
        if gap > best.0 {
            best = (gap, d);
        }
        prev = d;
    }
    best.1
}

/// Score cutoff from the spacing test; `+inf` when no spacing is extreme
pub fn spacing_threshold(scores: &[f64], alpha: f64, p: f64, size_threshold: usize) -> f64 {
    let n = scores.len();
    if n < 2 {
        return f64::INFINITY;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut gaps = vec![0.0; n];
    for i in 1..n {
        gaps[i] = sorted[i] - sorted[i - 1];
    }

    let n4 = size_threshold.min(n / 4).max(2);
    // first candidate is the floor(n(1 - p))-th smallest score, counted from one
    let start = ((n as f64 * (1.0 - p)).floor() as usize).max(1) - 1;
    let log_alpha = (1.0 / alpha).ln();
    for i in start..n {
        let ghat: f64 = (2..=n4)
            .filter(|&j| i + 1 >= j)
            .map(|j| j as f64 / (n4 - 1) as f64 * gaps[i + 1 - j])
            .sum();
        if gaps[i] > log_alpha * ghat {
            return sorted[i.saturating_sub(1)];
        }
    }
    f64::INFINITY
}

/// STRAY outlier detector
#[derive(Debug, Clone)]
pub struct Stray<E: ExecutionEngine = SequentialEngine> {
    params: StrayParameters,
    engine: E,
}

impl Stray<SequentialEngine> {
    pub fn new(params: StrayParameters) -> Result<Self> {
        Self::with_engine(params, SequentialEngine)
    }
}

impl<E: ExecutionEngine> Stray<E> {
    pub fn with_engine(params: StrayParameters, engine: E) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, engine })
    }

    pub fn params(&self) -> &StrayParameters {
        &self.params
    }

    /// Score every point of `series` and flag the anomalies
    #[instrument(skip_all, fields(n = series.len(), k = self.params.k))]
    pub fn score(&self, series: &Series) -> Result<StrayResult> {
        let n = series.len();
        if n < 2 {
            return Err(Error::InsufficientData {
                expected: 2,
                actual: n,
            });
        }

        let mut warnings = Vec::new();
        let k = if self.params.k >= n {
            warn!(requested_k = self.params.k, used_k = n - 1, "k capped at N - 1");
            warnings.push(AnnotationWarning::DegenerateNeighborhood {
                requested_k: self.params.k,
                used_k: n - 1,
            });
            n - 1
        } else {
            self.params.k
        };

        let rows = normalized_rows(series, self.params.normalization)?;
        let scores: Vec<f64> = self.engine.execute_batch(n, |i| {
            let mut dist: Vec<f64> = rows
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, row)| euclidean(&rows[i], row))
                .collect();
            dist.sort_by(f64::total_cmp);
            dist.truncate(k);
            gap_score(&dist)
        });

        let threshold = spacing_threshold(
            &scores,
            self.params.alpha,
            self.params.p,
            self.params.size_threshold,
        );
        let scores = AnomalyScoreVector::new(scores, threshold)?;
        debug!(
            threshold,
            flagged = scores.flagged_indices().len(),
            "STRAY scores computed"
        );
        Ok(StrayResult {
            scores,
            k_used: k,
            warnings,
        })
    }
}

impl<E: ExecutionEngine> AnnotatorProperties for Stray<E> {
    fn algorithm_name(&self) -> &'static str {
        "STRAY"
    }

    fn minimum_sample_size(&self) -> usize {
        2
    }
}

impl<E: ExecutionEngine> SeriesAnnotator for Stray<E> {
    type Fitted = FittedStray<E>;

    fn fit(&self, series: &Series) -> Result<FittedStray<E>> {
        let result = self.score(series)?;
        Ok(FittedStray {
            detector: self.clone(),
            view: series.clone(),
            result,
        })
    }
}

/// STRAY scores of the fitted view
///
/// Other views are scored afresh; STRAY has no parameters to learn.
#[derive(Debug, Clone)]
pub struct FittedStray<E: ExecutionEngine = SequentialEngine> {
    detector: Stray<E>,
    view: Series,
    result: StrayResult,
}

impl<E: ExecutionEngine> FittedStray<E> {
    pub fn result(&self) -> &StrayResult {
        &self.result
    }
}

impl<E: ExecutionEngine> FittedAnnotator for FittedStray<E> {
    type Output = AnomalyScoreVector;

    fn annotate(&self, series: &Series) -> Result<AnomalyScoreVector> {
        if series.shares_view(&self.view) {
            return Ok(self.result.scores.clone());
        }
        Ok(self.detector.score(series)?.scores)
    }

    fn warnings(&self) -> &[AnnotationWarning] {
        &self.result.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_spike() {
        let series =
            Series::univariate(vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 100.0, 1.0, 1.0]).unwrap();
        let stray = Stray::new(StrayParameters::default().with_k(3)).unwrap();
        let scores = stray.fit_annotate(&series).unwrap();
        assert_eq!(scores.flagged_indices(), vec![7]);
        assert_relative_eq!(scores.scores()[7], 1.0);
        assert_relative_eq!(scores.threshold(), 0.0);
    }

    #[test]
    fn test_gap_score() {
        assert_relative_eq!(gap_score(&[0.1, 0.2, 0.3]), 0.1);
        assert_relative_eq!(gap_score(&[0.1, 0.15, 0.9, 1.0]), 0.9);
        assert_relative_eq!(gap_score(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_threshold_without_extreme_spacing() {
        let scores: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(spacing_threshold(&scores, 0.01, 0.5, 50), f64::INFINITY);
    }

    #[test]
    fn test_threshold_finds_jump() {
        let mut scores: Vec<f64> = (0..20).map(|i| i as f64 * 0.01).collect();
        scores.push(5.0);
        assert_relative_eq!(spacing_threshold(&scores, 0.01, 0.5, 50), 0.19, epsilon = 1e-12);
    }

    #[test]
    fn test_threshold_checks_first_tail_gap() {
        // nine low scores, then eleven high ones; with p = 0.5 the jump into
        // the upper half is the first spacing examined
        let mut scores: Vec<f64> = (0..9).map(|i| i as f64 * 0.01).collect();
        scores.extend((0..11).map(|i| 10.0 + i as f64 * 0.01));
        assert_relative_eq!(spacing_threshold(&scores, 0.01, 0.5, 10), 0.08, epsilon = 1e-12);
    }

    #[test]
    fn test_k_is_capped() {
        let series = Series::univariate(vec![0.0, 0.1, 0.2, 5.0]).unwrap();
        let stray = Stray::new(StrayParameters::default()).unwrap();
        let fitted = stray.fit(&series).unwrap();
        assert_eq!(fitted.result().k_used, 3);
        assert_eq!(
            fitted.warnings(),
            &[AnnotationWarning::DegenerateNeighborhood {
                requested_k: 10,
                used_k: 3
            }]
        );
    }

    #[test]
    fn test_too_short() {
        let series = Series::univariate(vec![1.0]).unwrap();
        let stray = Stray::new(StrayParameters::default()).unwrap();
        assert!(matches!(
            stray.fit(&series).unwrap_err(),
            Error::InsufficientData {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Stray::new(StrayParameters::default().with_alpha(1.5)).is_err());
        assert!(Stray::new(StrayParameters::default().with_k(0)).is_err());
        assert!(Stray::new(StrayParameters::default().with_p(0.0)).is_err());
        assert!(Stray::new(StrayParameters::default().with_size_threshold(1)).is_err());
    }

    #[test]
    fn test_robust_standardization() {
        let series = Series::multivariate(vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![7.0, 7.0, 7.0, 7.0, 7.0],
        ])
        .unwrap();
        let rows = normalized_rows(&series, StrayNormalization::RobustStandardize).unwrap();
        assert_relative_eq!(rows[0][0], -1.0);
        assert_relative_eq!(rows[4][0], 1.0);
        assert!(rows.iter().all(|r| r[1] == 0.0));
    }

    #[test]
    fn test_multivariate_outlier() {
        let mut columns = vec![Vec::new(), Vec::new()];
        for i in 0..30 {
            let t = i as f64;
            columns[0].push((t * 0.7).sin() + 0.01 * t);
            columns[1].push((t * 0.3).cos());
        }
        columns[0][12] = 9.0;
        columns[1][12] = -8.0;
        let series = Series::multivariate(columns).unwrap();
        let scores = Stray::new(StrayParameters::default())
            .unwrap()
            .fit_annotate(&series)
            .unwrap();
        let top = scores
            .scores()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(top, Some(12));
        assert!(scores.flags()[12]);
    }
}
