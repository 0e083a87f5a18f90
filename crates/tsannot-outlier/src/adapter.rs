//! Bridge from third-party point scorers to the annotator interface
//!
//! An [`ExternalScorer`] only has to learn from row-major training data and
//! return one raw score per row. [`ScorerAdapter`] handles the rest: series
//! conversion, length checks, shifting raw scores so the smallest training
//! score is zero, and turning scores into flags.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use tsannot_core::math::quantile;
use tsannot_core::{
    AnnotatorProperties, AnomalyScoreVector, Error, FittedAnnotator, Result, Series,
    SeriesAnnotator,
};

/// A point scorer implemented outside this workspace
///
/// Higher scores mean more anomalous. Errors are reported through `anyhow`
/// and surface as [`Error::Other`].
pub trait ExternalScorer: Send + Sync {
    fn fit(&mut self, rows: &[Vec<f64>]) -> anyhow::Result<()>;

    fn score(&self, rows: &[Vec<f64>]) -> anyhow::Result<Vec<f64>>;
}

/// How scores become flags
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagRule {
    /// Expected fraction of anomalies in the training data, in `(0, 0.5]`
    Contamination(f64),
    /// Fixed cutoff on the raw scorer output
    Threshold(f64),
}

impl Default for FlagRule {
    fn default() -> Self {
        Self::Contamination(0.1)
    }
}

/// Values reported per point by [`AdapterOutput::from_scores`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterLabels {
    /// 1.0 for flagged points, 0.0 otherwise
    #[default]
    Indicator,
    Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One value per point
    #[default]
    Dense,
    /// Flagged points only
    Sparse,
}

/// Anomaly output in the requested layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterOutput {
    Dense(Vec<f64>),
    Sparse { indices: Vec<usize>, values: Vec<f64> },
}

impl AdapterOutput {
    pub fn from_scores(
        scores: &AnomalyScoreVector,
        format: OutputFormat,
        labels: AdapterLabels,
    ) -> Self {
        let value = |i: usize| match labels {
            AdapterLabels::Indicator => f64::from(u8::from(scores.flags()[i])),
            AdapterLabels::Score => scores.scores()[i],
        };
        match format {
            OutputFormat::Dense => Self::Dense((0..scores.len()).map(value).collect()),
            OutputFormat::Sparse => {
                let indices = scores.flagged_indices();
                let values = indices.iter().map(|&i| value(i)).collect();
                Self::Sparse { indices, values }
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Dense(v) => v.len(),
            Self::Sparse { indices, .. } => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs an [`ExternalScorer`] as a [`SeriesAnnotator`]
#[derive(Debug, Clone)]
pub struct ScorerAdapter<S> {
    scorer: S,
    rule: FlagRule,
}

impl<S: ExternalScorer + Clone> ScorerAdapter<S> {
    pub fn new(scorer: S, rule: FlagRule) -> Result<Self> {
        match rule {
            FlagRule::Contamination(c) if !(c > 0.0 && c <= 0.5) => {
                return Err(Error::out_of_range("contamination", c, "(0, 0.5]"));
            }
            FlagRule::Threshold(t) if !t.is_finite() => {
                return Err(Error::InvalidParameter(format!(
                    "threshold must be finite, got {t}"
                )));
            }
            _ => {}
        }
        Ok(Self { scorer, rule })
    }

    pub fn rule(&self) -> FlagRule {
        self.rule
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }
}

/// Raw scores for `rows`, one finite value per row
fn raw_scores<S: ExternalScorer>(scorer: &S, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
    let scores = scorer.score(rows)?;
    if scores.len() != rows.len() {
        return Err(Error::size_mismatch(rows.len(), scores.len(), "external scores"));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(Error::non_finite("external scores"));
    }
    Ok(scores)
}

impl<S> AnnotatorProperties for ScorerAdapter<S> {
    fn algorithm_name(&self) -> &'static str {
        "ScorerAdapter"
    }

    fn minimum_sample_size(&self) -> usize {
        1
    }
}

impl<S: ExternalScorer + Clone> SeriesAnnotator for ScorerAdapter<S> {
    type Fitted = FittedScorer<S>;

    #[instrument(skip_all, fields(n = series.len(), d = series.n_columns()))]
    fn fit(&self, series: &Series) -> Result<FittedScorer<S>> {
        let rows = series.to_row_major();
        let mut scorer = self.scorer.clone();
        scorer.fit(&rows)?;
        let raw = raw_scores(&scorer, &rows)?;

        let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
        let offset = if min < 0.0 { -min } else { 0.0 };
        let shifted: Vec<f64> = raw.iter().map(|s| (s + offset).max(0.0)).collect();
        let threshold = match self.rule {
            FlagRule::Contamination(c) => quantile(&shifted, 1.0 - c),
            FlagRule::Threshold(t) => t + offset,
        };
        let training = AnomalyScoreVector::new(shifted, threshold)?;
        debug!(
            offset,
            threshold,
            flagged = training.flagged_indices().len(),
            "external scorer fitted"
        );

        Ok(FittedScorer {
            scorer,
            offset,
            view: series.clone(),
            training,
        })
    }
}

/// A fitted [`ScorerAdapter`]
#[derive(Debug, Clone)]
pub struct FittedScorer<S> {
    scorer: S,
    offset: f64,
    view: Series,
    training: AnomalyScoreVector,
}

impl<S: ExternalScorer> FittedScorer<S> {
    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Amount added to raw scores so the training minimum is zero
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Cutoff on shifted scores
    pub fn threshold(&self) -> f64 {
        self.training.threshold()
    }

    /// Annotate `series` and lay the result out as requested
    pub fn transform(
        &self,
        series: &Series,
        format: OutputFormat,
        labels: AdapterLabels,
    ) -> Result<AdapterOutput> {
        let scores = self.annotate(series)?;
        Ok(AdapterOutput::from_scores(&scores, format, labels))
    }
}

impl<S: ExternalScorer> FittedAnnotator for FittedScorer<S> {
    type Output = AnomalyScoreVector;

    fn annotate(&self, series: &Series) -> Result<AnomalyScoreVector> {
        if series.shares_view(&self.view) {
            return Ok(self.training.clone());
        }
        if series.n_columns() != self.view.n_columns() {
            return Err(Error::size_mismatch(
                self.view.n_columns(),
                series.n_columns(),
                "series columns",
            ));
        }
        let raw = raw_scores(&self.scorer, &series.to_row_major())?;
        let shifted = raw.iter().map(|s| (s + self.offset).max(0.0)).collect();
        AnomalyScoreVector::new(shifted, self.training.threshold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tsannot_core::test_data::TestSeries;

    /// Sum of absolute per-column z-scores
    #[derive(Debug, Clone, Default)]
    struct ZScore {
        center: Vec<f64>,
        scale: Vec<f64>,
    }

    impl ExternalScorer for ZScore {
        fn fit(&mut self, rows: &[Vec<f64>]) -> anyhow::Result<()> {
            let d = rows.first().map_or(0, Vec::len);
            let n = rows.len() as f64;
            self.center = (0..d).map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n).collect();
            self.scale = (0..d)
                .map(|j| {
                    let var = rows
                        .iter()
                        .map(|r| (r[j] - self.center[j]).powi(2))
                        .sum::<f64>()
                        / n;
                    var.sqrt().max(1e-12)
                })
                .collect();
            Ok(())
        }

        fn score(&self, rows: &[Vec<f64>]) -> anyhow::Result<Vec<f64>> {
            Ok(rows
                .iter()
                .map(|r| {
                    r.iter()
                        .zip(self.center.iter().zip(&self.scale))
                        .map(|(x, (c, s))| ((x - c) / s).abs())
                        .sum::<f64>()
                })
                .collect())
        }
    }

    /// Raw score is minus the first column
    #[derive(Debug, Clone)]
    struct Negated;

    impl ExternalScorer for Negated {
        fn fit(&mut self, _rows: &[Vec<f64>]) -> anyhow::Result<()> {
            Ok(())
        }

        fn score(&self, rows: &[Vec<f64>]) -> anyhow::Result<Vec<f64>> {
            Ok(rows.iter().map(|r| -r[0]).collect())
        }
    }

    #[derive(Debug, Clone)]
    enum Broken {
        FailsToFit,
        DropsRow,
        ReturnsNan,
    }

    impl ExternalScorer for Broken {
        fn fit(&mut self, _rows: &[Vec<f64>]) -> anyhow::Result<()> {
            if matches!(self, Self::FailsToFit) {
                anyhow::bail!("backend unavailable");
            }
            Ok(())
        }

        fn score(&self, rows: &[Vec<f64>]) -> anyhow::Result<Vec<f64>> {
            Ok(match self {
                Self::DropsRow => vec![0.0; rows.len() - 1],
                _ => vec![f64::NAN; rows.len()],
            })
        }
    }

    #[test]
    fn test_contamination_flags_spikes() {
        let series =
            Series::univariate(TestSeries::with_outliers(100, &[20, 70], 10.0, 5)).unwrap();
        let adapter = ScorerAdapter::new(ZScore::default(), FlagRule::Contamination(0.02)).unwrap();
        let fitted = adapter.fit(&series).unwrap();
        let scores = fitted.annotate(&series).unwrap();
        assert_eq!(scores.flagged_indices(), vec![20, 70]);
        assert_eq!(fitted.offset(), 0.0);
        assert!(scores.scores().iter().all(|&s| s >= 0.0));
    }

    #[test]
    fn test_negative_scores_are_shifted() {
        let train = Series::univariate(vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let adapter = ScorerAdapter::new(Negated, FlagRule::Threshold(-2.5)).unwrap();
        let fitted = adapter.fit(&train).unwrap();
        assert_relative_eq!(fitted.offset(), 5.0);
        assert_relative_eq!(fitted.threshold(), 2.5);

        let scores = fitted.annotate(&train).unwrap();
        assert_eq!(scores.scores(), &[4.0, 3.0, 2.0, 1.0, 0.0]);
        assert_eq!(scores.flagged_indices(), vec![0, 1]);

        let fresh = Series::univariate(vec![10.0, 0.0]).unwrap();
        let scores = fitted.annotate(&fresh).unwrap();
        assert_eq!(scores.scores(), &[0.0, 5.0]);
        assert_eq!(scores.flags(), &[false, true]);
    }

    #[test]
    fn test_scorer_failures() {
        let series = Series::univariate(vec![1.0, 2.0, 3.0]).unwrap();
        let rule = FlagRule::Threshold(0.0);

        let err = ScorerAdapter::new(Broken::FailsToFit, rule)
            .unwrap()
            .fit(&series)
            .unwrap_err();
        assert!(matches!(err, Error::Other(_)));
        assert!(err.to_string().contains("backend unavailable"));

        let err = ScorerAdapter::new(Broken::DropsRow, rule)
            .unwrap()
            .fit(&series)
            .unwrap_err();
        assert!(matches!(err, Error::Shape(_)));

        let err = ScorerAdapter::new(Broken::ReturnsNan, rule)
            .unwrap()
            .fit(&series)
            .unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn test_rule_validation() {
        assert!(ScorerAdapter::new(Negated, FlagRule::Contamination(0.0)).is_err());
        assert!(ScorerAdapter::new(Negated, FlagRule::Contamination(0.7)).is_err());
        assert!(ScorerAdapter::new(Negated, FlagRule::Threshold(f64::NAN)).is_err());
        assert!(ScorerAdapter::new(Negated, FlagRule::default()).is_ok());
    }

    #[test]
    fn test_column_mismatch() {
        let train = Series::univariate(vec![1.0, 2.0, 3.0]).unwrap();
        let fitted = ScorerAdapter::new(ZScore::default(), FlagRule::Threshold(1.0))
            .unwrap()
            .fit(&train)
            .unwrap();
        let wide = Series::multivariate(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert!(matches!(fitted.annotate(&wide).unwrap_err(), Error::Shape(_)));
    }

    #[test]
    fn test_output_layouts() {
        let scores = AnomalyScoreVector::new(vec![0.1, 2.0, 0.3, 5.0], 1.0).unwrap();
        assert_eq!(
            AdapterOutput::from_scores(&scores, OutputFormat::Dense, AdapterLabels::Indicator),
            AdapterOutput::Dense(vec![0.0, 1.0, 0.0, 1.0])
        );
        assert_eq!(
            AdapterOutput::from_scores(&scores, OutputFormat::Dense, AdapterLabels::Score),
            AdapterOutput::Dense(vec![0.1, 2.0, 0.3, 5.0])
        );
        assert_eq!(
            AdapterOutput::from_scores(&scores, OutputFormat::Sparse, AdapterLabels::Indicator),
            AdapterOutput::Sparse {
                indices: vec![1, 3],
                values: vec![1.0, 1.0]
            }
        );
        assert_eq!(
            AdapterOutput::from_scores(&scores, OutputFormat::Sparse, AdapterLabels::Score),
            AdapterOutput::Sparse {
                indices: vec![1, 3],
                values: vec![2.0, 5.0]
            }
        );
    }

    #[test]
    fn test_transform_uses_fitted_threshold() {
        let train = Series::univariate(vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let fitted = ScorerAdapter::new(Negated, FlagRule::Threshold(-2.5))
            .unwrap()
            .fit(&train)
            .unwrap();
        let out = fitted
            .transform(&train, OutputFormat::Sparse, AdapterLabels::Score)
            .unwrap();
        assert_eq!(
            out,
            AdapterOutput::Sparse {
                indices: vec![0, 1],
                values: vec![4.0, 3.0]
            }
        );
        assert_eq!(out.len(), 2);
    }
}
