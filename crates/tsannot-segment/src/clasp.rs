//! Classification Score Profile (ClaSP) segmentation
//!
//! For a candidate split `s` every window left of `s` is labelled 0 and
//! every window right of it 1. Each window's label is then predicted by a
//! majority vote of its k nearest neighbours; how well those predictions
//! recover the labels is the split's score. The best split is accepted and
//! both halves are searched again, best score first.

use crate::fitted::{FittedSegmenter, Segmentation, Segmenter};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{debug, instrument};
use tsannot_core::cancel::is_cancelled;
use tsannot_core::{
    AnnotatorProperties, BreakpointSet, CancellationToken, ChangePointCount, Error,
    ExecutionEngine, FitStatus, Result, SequentialEngine, Series, SeriesAnnotator,
};
use tsannot_profile::{validate_window, KnnProfile, Metric, ProfileConfig, ProfileEngine};

/// How predicted window labels are scored against the split labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaspScore {
    /// ROC-AUC of hard predictions, i.e. balanced accuracy
    #[default]
    RocAuc,
    /// Macro-averaged F1 over both classes
    F1,
}

/// ClaSP configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaspParameters {
    /// Subsequence length `L`
    pub window_length: usize,
    pub n_change_points: ChangePointCount,
    /// Neighbours per window in the vote
    pub k_neighbors: usize,
    pub score: ClaspScore,
    pub metric: Metric,
    /// Minimum segment length as a fraction of the series length
    pub exclusion_radius: f64,
    /// Minimum segment length in multiples of `L`
    pub min_segment_windows: usize,
    /// Splits scoring below this are rejected
    pub score_threshold: f64,
}

impl Default for ClaspParameters {
    fn default() -> Self {
        Self {
            window_length: 10,
            n_change_points: ChangePointCount::Fixed(1),
            k_neighbors: 3,
            score: ClaspScore::RocAuc,
            metric: Metric::AbsoluteEuclidean,
            exclusion_radius: 0.05,
            min_segment_windows: 1,
            score_threshold: 0.75,
        }
    }
}

impl ClaspParameters {
    pub fn with_window_length(mut self, window_length: usize) -> Self {
        self.window_length = window_length;
        self
    }

    pub fn with_n_change_points(mut self, n: ChangePointCount) -> Self {
        self.n_change_points = n;
        self
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k;
        self
    }

    pub fn with_score(mut self, score: ClaspScore) -> Self {
        self.score = score;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_exclusion_radius(mut self, radius: f64) -> Self {
        self.exclusion_radius = radius;
        self
    }

    pub fn with_min_segment_windows(mut self, windows: usize) -> Self {
        self.min_segment_windows = windows;
        self
    }

    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_length < 2 {
            return Err(Error::out_of_range("window_length", self.window_length, ">= 2"));
        }
        if self.k_neighbors == 0 {
            return Err(Error::out_of_range("k_neighbors", self.k_neighbors, ">= 1"));
        }
        if self.min_segment_windows == 0 {
            return Err(Error::out_of_range(
                "min_segment_windows",
                self.min_segment_windows,
                ">= 1",
            ));
        }
        if !(0.0..0.5).contains(&self.exclusion_radius) {
            return Err(Error::out_of_range(
                "exclusion_radius",
                self.exclusion_radius,
                "[0, 0.5)",
            ));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(Error::out_of_range(
                "score_threshold",
                self.score_threshold,
                "[0, 1]",
            ));
        }
        Ok(())
    }

    /// Shortest admissible segment for a series of length `n`
    fn min_segment(&self, n: usize) -> usize {
        let by_radius = (self.exclusion_radius * n as f64).ceil() as usize;
        (self.min_segment_windows * self.window_length).max(by_radius)
    }
}

/// By-products of a ClaSP run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaspDiagnostics {
    /// Score of every admissible split of the whole series
    pub profile: Vec<f64>,
    /// Split position of `profile[0]`
    pub profile_offset: usize,
    /// Accepted `(breakpoint, score)` pairs in acceptance order
    pub accepted: Vec<(usize, f64)>,
}

/// ClaSP segmenter
#[derive(Debug, Clone)]
pub struct ClaspSegmenter<E: ExecutionEngine = SequentialEngine> {
    params: ClaspParameters,
    engine: E,
    cancel: Option<CancellationToken>,
}

impl ClaspSegmenter<SequentialEngine> {
    pub fn new(params: ClaspParameters) -> Result<Self> {
        Self::with_engine(params, SequentialEngine)
    }
}

impl<E: ExecutionEngine> ClaspSegmenter<E> {
    pub fn with_engine(params: ClaspParameters, engine: E) -> Result<Self> {
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

    pub fn params(&self) -> &ClaspParameters {
        &self.params
    }

    /// Best split of the `n` values covered by `knn`, with its score and
    /// the full score profile
    ///
    /// Returns `None` when the range is too short to split.
    fn best_split(&self, knn: &KnnProfile, n: usize, min_seg: usize) -> Option<SplitProfile> {
        if n < 2 * min_seg || validate_window(self.params.window_length, n).is_err() {
            return None;
        }

        let first = min_seg;
        let last = n - min_seg;
        let score_kind = self.params.score;
        let scores = self
            .engine
            .execute_batch(last + 1 - first, |c| split_score(knn, first + c, score_kind));

        let best = scores
            .iter()
            .enumerate()
            .fold(None::<(f64, usize)>, |best, (c, &score)| match best {
                Some((b, _)) if score <= b => best,
                _ => Some((score, c)),
            });

        best.map(|(score, c)| SplitProfile {
            split: first + c,
            score,
            offset: first,
            scores,
        })
    }

    /// Best split of the values in `[lo, hi)`, searched on the whole-series
    /// profile restricted to the windows inside the range
    fn best_split_in(
        &self,
        knn: &KnnProfile,
        lo: usize,
        hi: usize,
        min_seg: usize,
    ) -> Option<SplitProfile> {
        let m = self.params.window_length;
        if hi - lo < m {
            return None;
        }
        self.best_split(&knn.restrict(lo, hi + 1 - m), hi - lo, min_seg)
    }

    #[instrument(skip_all, fields(n = series.len(), window_length = self.params.window_length))]
    fn run(&self, series: &Series) -> Result<Segmentation<ClaspDiagnostics>> {
        let n = series.len();
        self.params.n_change_points.check(n)?;
        validate_window(self.params.window_length, n)?;
        let values = series.values()?;

        let target = self.params.n_change_points.fixed();
        let min_seg = self.params.min_segment(n);
        let mut diagnostics = ClaspDiagnostics::default();
        let mut breakpoints = Vec::new();
        let mut status = FitStatus::Converged;

        // max-heap on score, then lowest position
        let mut queue: BinaryHeap<(OrderedFloat<f64>, Reverse<usize>, usize, usize)> =
            BinaryHeap::new();

        let knn = ProfileEngine::with_engine(
            ProfileConfig::new(self.params.window_length).with_metric(self.params.metric),
            self.engine.clone(),
        )
        .compute_knn_values(values, self.params.k_neighbors)?;

        if let Some(top) = self.best_split(&knn, n, min_seg) {
            diagnostics.profile_offset = top.offset;
            diagnostics.profile = top.scores;
            queue.push((OrderedFloat(top.score), Reverse(top.split), 0, n));
        }

        while let Some((OrderedFloat(score), Reverse(split), start, end)) = queue.pop() {
            if target.is_some_and(|k| breakpoints.len() >= k) {
                break;
            }
            if score < self.params.score_threshold {
                debug!(split, score, "best remaining split below threshold");
                break;
            }
            if is_cancelled(self.cancel.as_ref()) {
                status = FitStatus::Cancelled;
                break;
            }

            debug!(split, score, start, end, "accepted split");
            breakpoints.push(split);
            diagnostics.accepted.push((split, score));

            for (lo, hi) in [(start, split), (split, end)] {
                if let Some(child) = self.best_split_in(&knn, lo, hi, min_seg) {
                    queue.push((
                        OrderedFloat(child.score),
                        Reverse(lo + child.split),
                        lo,
                        hi,
                    ));
                }
            }
        }

        Ok(Segmentation {
            breakpoints: BreakpointSet::from_unsorted(breakpoints, n)?,
            status,
            warnings: Vec::new(),
            diagnostics,
        })
    }
}

struct SplitProfile {
    split: usize,
    score: f64,
    offset: usize,
    scores: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Label of window `j` for split `s`; windows straddling `s` are unlabelled
#[inline]
fn window_side(j: usize, split: usize, m: usize) -> Option<Side> {
    if j + m <= split {
        Some(Side::Left)
    } else if j >= split {
        Some(Side::Right)
    } else {
        None
    }
}

/// Score the split at `split` against the neighbour votes
///
/// Only labelled neighbours vote. A window is predicted right when right
/// votes strictly outnumber left votes.
fn split_score(knn: &KnnProfile, split: usize, kind: ClaspScore) -> f64 {
    let m = knn.window_length();
    // [true][predicted]
    let mut confusion = [[0usize; 2]; 2];
    for j in 0..knn.len() {
        let Some(truth) = window_side(j, split, m) else {
            continue;
        };
        let (mut left, mut right) = (0usize, 0usize);
        for &(_, nb) in knn.neighbors(j) {
            match window_side(nb, split, m) {
                Some(Side::Left) => left += 1,
                Some(Side::Right) => right += 1,
                None => {}
            }
        }
        let predicted = if right > left { Side::Right } else { Side::Left };
        confusion[(truth == Side::Right) as usize][(predicted == Side::Right) as usize] += 1;
    }

    match kind {
        ClaspScore::RocAuc => {
            let tpr = |c: usize| {
                let total = confusion[c][0] + confusion[c][1];
                if total == 0 {
                    0.0
                } else {
                    confusion[c][c] as f64 / total as f64
                }
            };
            0.5 * (tpr(0) + tpr(1))
        }
        ClaspScore::F1 => {
            let f1 = |c: usize| {
                let tp = confusion[c][c];
                let fn_ = confusion[c][1 - c];
                let fp = confusion[1 - c][c];
                let denom = 2 * tp + fp + fn_;
                if denom == 0 {
                    0.0
                } else {
                    2.0 * tp as f64 / denom as f64
                }
            };
            0.5 * (f1(0) + f1(1))
        }
    }
}

impl<E: ExecutionEngine> AnnotatorProperties for ClaspSegmenter<E> {
    fn algorithm_name(&self) -> &'static str {
        "ClaSP"
    }

    fn minimum_sample_size(&self) -> usize {
        let k = self.params.n_change_points.fixed().unwrap_or(1);
        (2 * self.params.window_length + 1).max(k + 1)
    }
}

impl<E: ExecutionEngine> Segmenter for ClaspSegmenter<E> {
    type Diagnostics = ClaspDiagnostics;

    fn segment(&self, series: &Series) -> Result<Segmentation<ClaspDiagnostics>> {
        self.run(series)
    }
}

impl<E: ExecutionEngine> SeriesAnnotator for ClaspSegmenter<E> {
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
    use tsannot_core::FittedAnnotator;

    fn step_series() -> Series {
        Series::univariate(vec![0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0, 10.0]).unwrap()
    }

    fn small_params() -> ClaspParameters {
        ClaspParameters::default().with_window_length(2)
    }

    #[test]
    fn test_step_splits_at_five() {
        let clasp = ClaspSegmenter::new(small_params()).unwrap();
        let fitted = clasp.fit(&step_series()).unwrap();
        assert_eq!(fitted.breakpoints().as_slice(), &[5]);
        assert_eq!(fitted.status(), FitStatus::Converged);

        let diag = fitted.diagnostics();
        assert_eq!(diag.accepted.len(), 1);
        assert_relative_eq!(diag.accepted[0].1, 0.75);
    }

    #[test]
    fn test_step_score_profile() {
        let clasp = ClaspSegmenter::new(small_params()).unwrap();
        let fitted = clasp.fit(&step_series()).unwrap();
        let diag = fitted.diagnostics();
        assert_eq!(diag.profile_offset, 2);
        assert_eq!(diag.profile.len(), 7);
        let best = diag.profile_offset + tsannot_core::utils::argmax(&diag.profile).unwrap();
        assert_eq!(best, 5);
    }

    #[test]
    fn test_too_many_change_points() {
        let clasp = ClaspSegmenter::new(
            small_params().with_n_change_points(ChangePointCount::Fixed(10)),
        )
        .unwrap();
        let err = clasp.fit(&step_series()).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientData {
                expected: 11,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_window_too_long() {
        let clasp = ClaspSegmenter::new(small_params().with_window_length(5)).unwrap();
        assert!(matches!(
            clasp.fit(&step_series()).unwrap_err(),
            Error::Window { .. }
        ));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(ClaspSegmenter::new(small_params().with_k_neighbors(0)).is_err());
        assert!(ClaspSegmenter::new(small_params().with_window_length(1)).is_err());
        assert!(ClaspSegmenter::new(small_params().with_score_threshold(1.5)).is_err());
    }

    #[test]
    fn test_two_regimes_with_noise() {
        let values = TestSeries::piecewise_constant(&[0.0, 8.0, 16.0], 60, 0.5, 7);
        let series = Series::univariate(values).unwrap();
        let clasp = ClaspSegmenter::new(
            ClaspParameters::default()
                .with_window_length(8)
                .with_n_change_points(ChangePointCount::Fixed(2)),
        )
        .unwrap();
        let breaks = clasp.fit_annotate(&series).unwrap();
        assert_eq!(breaks.len(), 2);
        assert!(breaks.as_slice()[0].abs_diff(60) <= 8);
        assert!(breaks.as_slice()[1].abs_diff(120) <= 8);
    }

    #[test]
    fn test_score_equal_to_threshold_is_accepted() {
        // the clean step scores exactly 0.75
        let at = ClaspSegmenter::new(small_params().with_score_threshold(0.75)).unwrap();
        let fitted = at.fit(&step_series()).unwrap();
        assert_eq!(fitted.breakpoints().as_slice(), &[5]);
        assert_relative_eq!(fitted.diagnostics().accepted[0].1, 0.75);

        let above = ClaspSegmenter::new(small_params().with_score_threshold(0.76)).unwrap();
        let fitted = above.fit(&step_series()).unwrap();
        assert!(fitted.breakpoints().is_empty());
        assert_eq!(fitted.status(), FitStatus::Converged);
        assert_eq!(fitted.diagnostics().profile.len(), 7);
    }

    #[test]
    fn test_child_splits_searched_on_whole_series_profile() {
        let values = TestSeries::piecewise_constant(&[0.0, 8.0, 16.0], 60, 0.5, 7);
        let series = Series::univariate(values).unwrap();
        let params = ClaspParameters::default()
            .with_window_length(8)
            .with_n_change_points(ChangePointCount::Fixed(2));
        let clasp = ClaspSegmenter::new(params.clone()).unwrap();
        let fitted = clasp.fit(&series).unwrap();
        let accepted = &fitted.diagnostics().accepted;
        assert_eq!(accepted.len(), 2);

        let n = series.len();
        let min_seg = params.min_segment(n);
        let knn = ProfileEngine::new(ProfileConfig::new(8).with_metric(params.metric))
            .compute_knn_values(series.values().unwrap(), params.k_neighbors)
            .unwrap();
        let top = clasp.best_split(&knn, n, min_seg).unwrap();
        assert_eq!(top.split, accepted[0].0);
        assert_eq!(top.scores, fitted.diagnostics().profile);

        let (first, (second, second_score)) = (accepted[0].0, accepted[1]);
        let (lo, hi) = if second < first { (0, first) } else { (first, n) };
        let restricted = knn.restrict(lo, hi + 1 - 8);
        let child = clasp.best_split(&restricted, hi - lo, min_seg).unwrap();
        assert_eq!(lo + child.split, second);
        assert_relative_eq!(child.score, second_score);
        assert_relative_eq!(
            split_score(&restricted, second - lo, params.score),
            second_score
        );
    }

    #[test]
    fn test_f1_score_agrees_on_step() {
        let clasp = ClaspSegmenter::new(small_params().with_score(ClaspScore::F1)).unwrap();
        let breaks = clasp.fit_annotate(&step_series()).unwrap();
        assert_eq!(breaks.as_slice(), &[5]);
    }

    #[test]
    fn test_cancelled_before_first_split() {
        let token = CancellationToken::new();
        token.cancel();
        let clasp = ClaspSegmenter::new(small_params())
            .unwrap()
            .with_cancellation(token);
        let fitted = clasp.fit(&step_series()).unwrap();
        assert_eq!(fitted.status(), FitStatus::Cancelled);
        assert!(fitted.breakpoints().is_empty());
    }

    #[test]
    fn test_annotate_other_view_reruns() {
        let values = TestSeries::piecewise_constant(&[0.0, 5.0], 40, 0.2, 3);
        let series = Series::univariate(values).unwrap();
        let clasp = ClaspSegmenter::new(ClaspParameters::default().with_window_length(5)).unwrap();
        let fitted = clasp.fit(&series).unwrap();
        assert_eq!(fitted.annotate(&series).unwrap(), *fitted.breakpoints());

        let view = series.slice(10, 80).unwrap();
        let breaks = fitted.annotate(&view).unwrap();
        assert_eq!(breaks.series_len(), 70);
        assert!(breaks.as_slice()[0].abs_diff(30) <= 5);
    }

    #[test]
    fn test_window_side() {
        assert_eq!(window_side(3, 5, 2), Some(Side::Left));
        assert_eq!(window_side(4, 5, 2), None);
        assert_eq!(window_side(5, 5, 2), Some(Side::Right));
    }

    #[test]
    fn test_multivariate_rejected() {
        let series = Series::multivariate(vec![vec![0.0; 20], vec![1.0; 20]]).unwrap();
        let clasp = ClaspSegmenter::new(small_params()).unwrap();
        assert!(matches!(clasp.fit(&series).unwrap_err(), Error::Shape(_)));
    }
}
