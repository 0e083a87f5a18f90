//! Viterbi decoding with user-supplied model parameters

use crate::inference::{ln_matrix, viterbi, ViterbiPath};
use statrs::distribution::{Continuous, Normal};
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use tsannot_core::math::safe_ln;
use tsannot_core::{
    AnnotatorProperties, Error, FittedAnnotator, LatentStateSequence, Result, Series,
    SeriesAnnotator,
};

/// Tolerance on transition row sums before renormalization
const ROW_SUM_RTOL: f64 = 5e-2;
const INITIAL_SUM_TOL: f64 = 1e-8;

/// Emission density of one hidden state
pub type DensityFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// A hidden Markov model whose parameters are known in advance
///
/// Fitting only records the view; annotation is Viterbi decoding with the
/// given densities, transition matrix and initial probabilities.
/// Univariate series only.
///
/// ```rust
/// use tsannot_core::{Series, SeriesAnnotator};
/// use tsannot_hmm::FixedHmm;
///
/// let hmm = FixedHmm::gaussian(
///     &[3.5, -5.0],
///     &[0.25, 0.25],
///     vec![vec![0.25, 0.75], vec![0.666, 0.333]],
///     None,
/// )
/// .unwrap();
/// let obs = Series::univariate(vec![3.7, 3.2, 3.4, 3.6, -5.1, -5.2, -4.9]).unwrap();
/// let labels = hmm.fit_annotate(&obs).unwrap();
/// assert_eq!(labels.labels(), &[0, 0, 0, 0, 1, 1, 1]);
/// ```
#[derive(Clone)]
pub struct FixedHmm {
    densities: Vec<DensityFn>,
    transitions: Vec<Vec<f64>>,
    initial: Vec<f64>,
}

impl fmt::Debug for FixedHmm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedHmm")
            .field("n_states", &self.densities.len())
            .field("transitions", &self.transitions)
            .field("initial", &self.initial)
            .finish()
    }
}

impl FixedHmm {
    /// `transitions[i][j]` is the probability of moving from state `i` to
    /// `j`. Rows must sum to one within 5% and are renormalized. Initial
    /// probabilities default to uniform.
    pub fn new(
        densities: Vec<DensityFn>,
        transitions: Vec<Vec<f64>>,
        initial: Option<Vec<f64>>,
    ) -> Result<Self> {
        let k = densities.len();
        if k == 0 {
            return Err(Error::InvalidParameter(
                "at least one emission density is required".to_string(),
            ));
        }
        if transitions.len() != k || transitions.iter().any(|row| row.len() != k) {
            return Err(Error::Shape(format!(
                "transition matrix must be {k} x {k} to match the emission densities"
            )));
        }

        let mut normalized = Vec::with_capacity(k);
        for (i, row) in transitions.into_iter().enumerate() {
            if row.iter().any(|p| !(0.0..=1.0).contains(p)) {
                return Err(Error::InvalidParameter(format!(
                    "transition row {i} has entries outside [0, 1]"
                )));
            }
            let total: f64 = row.iter().sum();
            if (total - 1.0).abs() > ROW_SUM_RTOL {
                return Err(Error::InvalidParameter(format!(
                    "transition row {i} sums to {total}, expected 1"
                )));
            }
            normalized.push(row.into_iter().map(|p| p / total).collect());
        }

        let initial = match initial {
            Some(p) => {
                if p.len() != k {
                    return Err(Error::size_mismatch(k, p.len(), "initial probabilities"));
                }
                let total: f64 = p.iter().sum();
                if p.iter().any(|v| *v < 0.0) || (total - 1.0).abs() > INITIAL_SUM_TOL {
                    return Err(Error::InvalidParameter(format!(
                        "initial probabilities must be non-negative and sum to 1, got {total}"
                    )));
                }
                p
            }
            None => vec![1.0 / k as f64; k],
        };

        Ok(Self {
            densities,
            transitions: normalized,
            initial,
        })
    }

    /// Normal emission densities with the given means and standard deviations
    pub fn gaussian(
        means: &[f64],
        sds: &[f64],
        transitions: Vec<Vec<f64>>,
        initial: Option<Vec<f64>>,
    ) -> Result<Self> {
        if means.len() != sds.len() {
            return Err(Error::size_mismatch(means.len(), sds.len(), "standard deviations"));
        }
        let densities = means
            .iter()
            .zip(sds)
            .map(|(&mean, &sd)| {
                let normal = Normal::new(mean, sd).map_err(|e| {
                    Error::InvalidParameter(format!("normal({mean}, {sd}): {e}"))
                })?;
                Ok(Arc::new(move |x: f64| normal.pdf(x)) as DensityFn)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(densities, transitions, initial)
    }

    pub fn n_states(&self) -> usize {
        self.densities.len()
    }

    pub fn transitions(&self) -> &[Vec<f64>] {
        &self.transitions
    }

    pub fn initial_probabilities(&self) -> &[f64] {
        &self.initial
    }

    /// Most likely state path for a univariate series
    pub fn decode(&self, series: &Series) -> Result<ViterbiPath> {
        let values = series.values()?;
        let log_b: Vec<Vec<f64>> = values
            .iter()
            .map(|&x| self.densities.iter().map(|f| safe_ln(f(x))).collect())
            .collect();
        let log_start: Vec<f64> = self.initial.iter().map(|&p| safe_ln(p)).collect();
        let path = viterbi(&log_start, &ln_matrix(&self.transitions), &log_b);
        if !path.feasible {
            warn!(
                n = values.len(),
                "every state path has zero probability; adjust the model parameters"
            );
        }
        Ok(path)
    }
}

impl AnnotatorProperties for FixedHmm {
    fn algorithm_name(&self) -> &'static str {
        "FixedHMM"
    }

    fn minimum_sample_size(&self) -> usize {
        1
    }
}

impl SeriesAnnotator for FixedHmm {
    type Fitted = FittedFixedHmm;

    fn fit(&self, series: &Series) -> Result<FittedFixedHmm> {
        series.values()?;
        Ok(FittedFixedHmm {
            model: self.clone(),
            view: series.clone(),
        })
    }
}

/// A [`FixedHmm`] bound to the view it was fitted on
#[derive(Debug, Clone)]
pub struct FittedFixedHmm {
    model: FixedHmm,
    view: Series,
}

impl FittedFixedHmm {
    pub fn model(&self) -> &FixedHmm {
        &self.model
    }

    pub fn view(&self) -> &Series {
        &self.view
    }
}

impl FittedAnnotator for FittedFixedHmm {
    type Output = LatentStateSequence;

    fn annotate(&self, series: &Series) -> Result<LatentStateSequence> {
        let path = self.model.decode(series)?;
        LatentStateSequence::new(path.labels, self.model.n_states())
    }
}
