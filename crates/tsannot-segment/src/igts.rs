//! Information Gain-based Temporal Segmentation (IGTS)
//!
//! Columns are min-max scaled and augmented with their complements `1 − x`,
//! so every row sums to the number of original columns. A segment's entropy
//! is the Shannon entropy of its column-sum proportions, and the information
//! gain of a segmentation is the whole-series entropy minus the
//! length-weighted segment entropies. Splits are added greedily on a grid.

use crate::fitted::{FittedSegmenter, Segmentation, Segmenter};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use tsannot_core::cancel::is_cancelled;
use tsannot_core::{
    AnnotatorProperties, BreakpointSet, CancellationToken, ChangePointCount, Error, FitStatus,
    Result, Series, SeriesAnnotator,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgtsParameters {
    /// Maximum number of breakpoints
    pub k_max: usize,
    /// Candidate breakpoints are the multiples of `step`
    pub step: usize,
    /// Additions gaining no more than this stop the search
    pub min_gain: f64,
    pub min_segment_length: usize,
}

impl Default for IgtsParameters {
    fn default() -> Self {
        Self {
            k_max: 10,
            step: 5,
            min_gain: 0.0,
            min_segment_length: 1,
        }
    }
}

impl IgtsParameters {
    pub fn with_k_max(mut self, k_max: usize) -> Self {
        self.k_max = k_max;
        self
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
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
        if self.step == 0 {
            return Err(Error::out_of_range("step", self.step, ">= 1"));
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

/// One greedy step of an IGTS run
#[derive(Debug, Clone, PartialEq)]
pub struct IgtsStep {
    pub breakpoints: Vec<usize>,
    pub information_gain: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IgtsDiagnostics {
    /// Intermediate segmentations in insertion order
    pub steps: Vec<IgtsStep>,
}

/// Column prefix sums of the scaled and complemented series
struct EntropyTable {
    /// `prefix[t][c]`, sum over rows `0..t` of column `c`
    prefix: Vec<Vec<f64>>,
    n: usize,
}

impl EntropyTable {
    fn new(series: &Series) -> Result<Self> {
        let scaled = series.min_max_scaled()?;
        let mut columns: Vec<&[f64]> = scaled.columns().collect();
        let complements: Vec<Vec<f64>> = columns
            .iter()
            .map(|c| c.iter().map(|v| 1.0 - v).collect())
            .collect();
        columns.extend(complements.iter().map(Vec::as_slice));

        let n = series.len();
        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(vec![0.0; columns.len()]);
        for t in 0..n {
            let next: Vec<f64> = prefix[t]
                .iter()
                .zip(&columns)
                .map(|(acc, col)| acc + col[t])
                .collect();
            prefix.push(next);
        }
        Ok(Self { prefix, n })
    }

    /// Entropy of the column-sum proportions over rows `[a, b)`
    fn entropy(&self, a: usize, b: usize) -> f64 {
        let sums: Vec<f64> = self.prefix[b]
            .iter()
            .zip(&self.prefix[a])
            .map(|(hi, lo)| (hi - lo).max(0.0))
            .collect();
        let total: f64 = sums.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        sums.iter()
            .filter(|&&s| s > 0.0)
            .map(|&s| {
                let p = s / total;
                -p * p.ln()
            })
            .sum()
    }

    /// Information gain of the segmentation defined by sorted `breakpoints`
    fn information_gain(&self, breakpoints: &[usize]) -> f64 {
        let n = self.n as f64;
        let mut weighted = 0.0;
        let mut start = 0;
        for &end in breakpoints.iter().chain(std::iter::once(&self.n)) {
            weighted += (end - start) as f64 / n * self.entropy(start, end);
            start = end;
        }
        self.entropy(0, self.n) - weighted
    }
}

/// IGTS segmenter
#[derive(Debug, Clone)]
pub struct InformationGainSegmenter {
    params: IgtsParameters,
    cancel: Option<CancellationToken>,
}

impl InformationGainSegmenter {
    pub fn new(params: IgtsParameters) -> Result<Self> {
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

    pub fn params(&self) -> &IgtsParameters {
        &self.params
    }

    fn admissible(&self, breakpoints: &[usize], t: usize, n: usize) -> bool {
        let pos = breakpoints.partition_point(|&x| x < t);
        if breakpoints.get(pos) == Some(&t) {
            return false;
        }
        let prev = if pos == 0 { 0 } else { breakpoints[pos - 1] };
        let next = breakpoints.get(pos).copied().unwrap_or(n);
        t - prev >= self.params.min_segment_length && next - t >= self.params.min_segment_length
    }

    #[instrument(skip_all, fields(n = series.len(), k_max = self.params.k_max, step = self.params.step))]
    fn run(&self, series: &Series) -> Result<Segmentation<IgtsDiagnostics>> {
        let n = series.len();
        ChangePointCount::Fixed(self.params.k_max).check(n)?;

        let table = EntropyTable::new(series)?;
        let candidates: Vec<usize> = (self.params.step..n).step_by(self.params.step).collect();

        let mut breakpoints: Vec<usize> = Vec::new();
        let mut current = 0.0;
        let mut diagnostics = IgtsDiagnostics::default();
        let mut status = FitStatus::Converged;

        while breakpoints.len() < self.params.k_max {
            if is_cancelled(self.cancel.as_ref()) {
                status = FitStatus::Cancelled;
                break;
            }

            let mut best: Option<(usize, f64)> = None;
            for &t in &candidates {
                if !self.admissible(&breakpoints, t, n) {
                    continue;
                }
                let mut trial = breakpoints.clone();
                trial.insert(trial.partition_point(|&x| x < t), t);
                let ig = table.information_gain(&trial);
                if best.map_or(true, |(_, b)| ig > b) {
                    best = Some((t, ig));
                }
            }

            let Some((t, ig)) = best else {
                break;
            };
            if ig - current <= self.params.min_gain {
                debug!(t, gain = ig - current, "best split below minimum gain");
                break;
            }

            breakpoints.insert(breakpoints.partition_point(|&x| x < t), t);
            debug!(t, information_gain = ig, "added split");
            current = ig;
            diagnostics.steps.push(IgtsStep {
                breakpoints: breakpoints.clone(),
                information_gain: ig,
            });
        }

        Ok(Segmentation {
            breakpoints: BreakpointSet::new(breakpoints, n)?,
            status,
            warnings: Vec::new(),
            diagnostics,
        })
    }
}

impl AnnotatorProperties for InformationGainSegmenter {
    fn algorithm_name(&self) -> &'static str {
        "IGTS"
    }

    fn minimum_sample_size(&self) -> usize {
        self.params.k_max + 1
    }
}

impl Segmenter for InformationGainSegmenter {
    type Diagnostics = IgtsDiagnostics;

    fn segment(&self, series: &Series) -> Result<Segmentation<IgtsDiagnostics>> {
        self.run(series)
    }
}

impl SeriesAnnotator for InformationGainSegmenter {
    type Fitted = FittedSegmenter<Self>;

    fn fit(&self, series: &Series) -> Result<Self::Fitted> {
        FittedSegmenter::fit(self, series)
    }
}
