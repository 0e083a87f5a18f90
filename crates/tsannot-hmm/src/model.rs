//! Hidden Markov models fitted by expectation-maximization

use crate::emission::Emission;
use crate::inference::{self, ln_matrix, posterior, viterbi, Posterior};
use crate::params::{CovarianceKind, DegeneratePolicy, EmissionKind, HmmParameters};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use tsannot_core::cancel::is_cancelled;
use tsannot_core::math::safe_ln;
use tsannot_core::{
    AnnotationWarning, AnnotatorProperties, CancellationToken, Error, ExecutionEngine, FitStatus,
    FittedAnnotator, LatentStateSequence, Result, SequentialEngine, Series, SeriesAnnotator,
};

/// Which values an emission family accepts
#[derive(Debug, Clone, Copy)]
enum Support {
    Real,
    Counts,
    Symbols(Option<usize>),
}

fn is_count(v: f64) -> bool {
    v >= 0.0 && v.fract() == 0.0
}

/// Row-major observations after checking them against the emission support
fn observations(series: &Series, support: Support, n_features: Option<usize>) -> Result<Vec<Vec<f64>>> {
    if let Some(d) = n_features {
        if series.n_columns() != d {
            return Err(Error::size_mismatch(d, series.n_columns(), "observation columns"));
        }
    }
    match support {
        Support::Real => {}
        Support::Counts => {
            for column in series.columns() {
                if let Some(v) = column.iter().find(|&&v| !is_count(v)) {
                    return Err(Error::InvalidInput(format!(
                        "Poisson observations must be non-negative integers, got {v}"
                    )));
                }
            }
        }
        Support::Symbols(n_symbols) => {
            if !series.is_univariate() {
                return Err(Error::Shape(format!(
                    "categorical observations must be univariate, got {} columns",
                    series.n_columns()
                )));
            }
            let values = series.values()?;
            if let Some(v) = values.iter().find(|&&v| !is_count(v)) {
                return Err(Error::InvalidInput(format!(
                    "categorical symbols must be non-negative integers, got {v}"
                )));
            }
            if let Some(limit) = n_symbols {
                if let Some(v) = values.iter().find(|&&v| v as usize >= limit) {
                    return Err(Error::InvalidInput(format!(
                        "symbol {v} outside the alphabet of {limit} symbols"
                    )));
                }
            }
        }
    }
    Ok(series.to_row_major())
}

/// Parameters of a hidden Markov model
#[derive(Debug, Clone, PartialEq)]
pub struct HmmModel {
    start: Vec<f64>,
    transitions: Vec<Vec<f64>>,
    emission: Emission,
}

impl HmmModel {
    fn initial(rows: &[Vec<f64>], n_states: usize, params: &HmmParameters) -> Self {
        let uniform = 1.0 / n_states as f64;
        Self {
            start: vec![uniform; n_states],
            transitions: vec![vec![uniform; n_states]; n_states],
            emission: Emission::init(rows, n_states, params),
        }
    }

    pub fn n_states(&self) -> usize {
        self.start.len()
    }

    pub fn start_probabilities(&self) -> &[f64] {
        &self.start
    }

    /// Row-stochastic transition matrix, `transitions[from][to]`
    pub fn transitions(&self) -> &[Vec<f64>] {
        &self.transitions
    }

    pub fn emission(&self) -> &Emission {
        &self.emission
    }

    fn support(&self) -> Support {
        match &self.emission {
            Emission::Gaussian(_) | Emission::Gmm(_) => Support::Real,
            Emission::Poisson(_) => Support::Counts,
            Emission::Categorical(c) => Support::Symbols(Some(c.n_symbols())),
        }
    }

    fn maximize(&mut self, rows: &[Vec<f64>], post: &Posterior, min_covar: f64) -> Result<()> {
        let total: f64 = post.gamma[0].iter().sum();
        self.start = post.gamma[0].iter().map(|g| g / total).collect();

        for (row, xi) in self.transitions.iter_mut().zip(&post.xi_sum) {
            let total: f64 = xi.iter().sum();
            // a state never left keeps its previous row
            if total > 0.0 {
                *row = xi.iter().map(|v| v / total).collect();
            }
        }

        self.emission.update(rows, &post.gamma, min_covar)
    }
}

/// How an EM fit went
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Log-likelihood after each E-step
    pub log_likelihood_history: Vec<f64>,
    pub iterations: usize,
    pub status: FitStatus,
    /// States in the final model
    pub n_states: usize,
    pub warnings: Vec<AnnotationWarning>,
}

impl TrainingReport {
    pub fn converged(&self) -> bool {
        self.status == FitStatus::Converged
    }

    pub fn final_log_likelihood(&self) -> Option<f64> {
        self.log_likelihood_history.last().copied()
    }
}

struct EmRun {
    model: HmmModel,
    history: Vec<f64>,
    iterations: usize,
    status: FitStatus,
    last_change: f64,
    /// Largest posterior mass each state reached over all E-steps
    peak_mass: Vec<f64>,
}

/// Hidden Markov model estimator
///
/// Use the family constructors ([`GaussianHmm`], [`GmmHmm`], [`PoissonHmm`],
/// [`CategoricalHmm`]) or build one from [`HmmParameters`]. Fitting runs
/// Baum-Welch from a k-means initialization that is deterministic given
/// the seed; the fitted view is labelled by Viterbi decoding.
#[derive(Debug, Clone)]
pub struct Hmm<E: ExecutionEngine = SequentialEngine> {
    params: HmmParameters,
    engine: E,
    cancel: Option<CancellationToken>,
}

impl Hmm<SequentialEngine> {
    pub fn new(params: HmmParameters) -> Result<Self> {
        Self::with_engine(params, SequentialEngine)
    }
}

impl<E: ExecutionEngine> Hmm<E> {
    pub fn with_engine(params: HmmParameters, engine: E) -> Result<Self> {
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

    pub fn params(&self) -> &HmmParameters {
        &self.params
    }

    fn support(&self) -> Support {
        match self.params.emission {
            EmissionKind::Gaussian { .. } | EmissionKind::Gmm { .. } => Support::Real,
            EmissionKind::Poisson => Support::Counts,
            EmissionKind::Categorical { n_symbols } => Support::Symbols(n_symbols),
        }
    }

    fn run_em(&self, rows: &[Vec<f64>], n_states: usize) -> Result<EmRun> {
        let mut model = HmmModel::initial(rows, n_states, &self.params);
        let mut history: Vec<f64> = Vec::new();
        let mut peak_mass = vec![0.0_f64; n_states];
        let mut status = FitStatus::ConvergenceWarning;
        let mut last_change = f64::INFINITY;
        let mut iterations = 0;

        for iteration in 0..self.params.max_iterations {
            if is_cancelled(self.cancel.as_ref()) {
                status = FitStatus::Cancelled;
                break;
            }

            let log_b = model.emission.log_likelihoods(rows, &self.engine)?;
            let post = posterior(&model.start, &model.transitions, &log_b)?;
            iterations = iteration + 1;

            for (k, peak) in peak_mass.iter_mut().enumerate() {
                let mass: f64 = post.gamma.iter().map(|g| g[k]).sum();
                *peak = peak.max(mass);
            }
            if let Some(prev) = history.last() {
                last_change = post.log_likelihood - prev;
            }
            history.push(post.log_likelihood);
            debug!(
                iteration,
                log_likelihood = post.log_likelihood,
                change = last_change,
                "EM step"
            );

            if last_change < self.params.tolerance {
                status = FitStatus::Converged;
                break;
            }
            model.maximize(rows, &post, self.params.min_covar)?;
        }

        Ok(EmRun {
            model,
            history,
            iterations,
            status,
            last_change,
            peak_mass,
        })
    }

    #[instrument(skip_all, fields(n = rows.len(), n_states = self.params.n_states))]
    fn fit_rows(&self, rows: &[Vec<f64>]) -> Result<(HmmModel, TrainingReport)> {
        let threshold = self.params.degenerate_threshold * rows.len() as f64;
        let mut n_states = self.params.n_states;
        let mut warnings = Vec::new();

        let run = loop {
            let run = self.run_em(rows, n_states)?;
            if run.status == FitStatus::Cancelled || n_states == 1 {
                break run;
            }
            let degenerate: Vec<usize> = (0..n_states)
                .filter(|&k| run.peak_mass[k] < threshold)
                .collect();
            if degenerate.is_empty() {
                break run;
            }
            match self.params.degenerate_policy {
                DegeneratePolicy::Error => {
                    return Err(Error::DegenerateModel(format!(
                        "states {degenerate:?} never reached a posterior mass of {threshold:.3}"
                    )));
                }
                DegeneratePolicy::ReduceStates => {
                    warn!(
                        from = n_states,
                        to = n_states - 1,
                        ?degenerate,
                        "dropping degenerate state and refitting"
                    );
                    warnings.push(AnnotationWarning::StatesReduced {
                        from: n_states,
                        to: n_states - 1,
                    });
                    n_states -= 1;
                }
            }
        };

        if run.status == FitStatus::ConvergenceWarning {
            warn!(
                iterations = run.iterations,
                last_change = run.last_change,
                "EM reached the iteration cap"
            );
            warnings.push(AnnotationWarning::Convergence {
                iterations: run.iterations,
                last_change: run.last_change,
            });
        }

        let report = TrainingReport {
            log_likelihood_history: run.history,
            iterations: run.iterations,
            status: run.status,
            n_states,
            warnings,
        };
        Ok((run.model, report))
    }
}

impl<E: ExecutionEngine> AnnotatorProperties for Hmm<E> {
    fn algorithm_name(&self) -> &'static str {
        match self.params.emission {
            EmissionKind::Gaussian { .. } => "GaussianHMM",
            EmissionKind::Gmm { .. } => "GMMHMM",
            EmissionKind::Poisson => "PoissonHMM",
            EmissionKind::Categorical { .. } => "CategoricalHMM",
        }
    }

    fn minimum_sample_size(&self) -> usize {
        self.params.n_states
    }
}

impl<E: ExecutionEngine> SeriesAnnotator for Hmm<E> {
    type Fitted = FittedHmm<E>;

    fn fit(&self, series: &Series) -> Result<FittedHmm<E>> {
        let n = series.len();
        if n < self.params.n_states {
            return Err(Error::InsufficientData {
                expected: self.params.n_states,
                actual: n,
            });
        }
        let rows = observations(series, self.support(), None)?;
        let (model, mut report) = self.fit_rows(&rows)?;

        let (labels, feasible) = decode(&model, &self.engine, &rows)?;
        if !feasible {
            report.warnings.push(AnnotationWarning::InfeasiblePath);
        }
        debug!(
            algorithm = self.algorithm_name(),
            iterations = report.iterations,
            status = ?report.status,
            change_points = labels.breakpoints().len(),
            "HMM fitted"
        );
        Ok(FittedHmm {
            model,
            report,
            engine: self.engine.clone(),
            view: series.clone(),
            labels,
        })
    }
}

/// Viterbi labels for `rows` and whether any path was feasible
fn decode<E: ExecutionEngine>(
    model: &HmmModel,
    engine: &E,
    rows: &[Vec<f64>],
) -> Result<(LatentStateSequence, bool)> {
    let log_b = model.emission.log_likelihoods(rows, engine)?;
    let log_start: Vec<f64> = model.start.iter().map(|&p| safe_ln(p)).collect();
    let path = viterbi(&log_start, &ln_matrix(&model.transitions), &log_b);
    if !path.feasible {
        warn!(n = rows.len(), "every state path has zero probability");
    }
    let labels = LatentStateSequence::new(path.labels, model.n_states())?;
    Ok((labels, path.feasible))
}

/// An HMM fitted on one series view
#[derive(Debug, Clone)]
pub struct FittedHmm<E: ExecutionEngine = SequentialEngine> {
    model: HmmModel,
    report: TrainingReport,
    engine: E,
    view: Series,
    labels: LatentStateSequence,
}

impl<E: ExecutionEngine> FittedHmm<E> {
    pub fn model(&self) -> &HmmModel {
        &self.model
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    pub fn n_states(&self) -> usize {
        self.model.n_states()
    }

    pub fn start_probabilities(&self) -> &[f64] {
        self.model.start_probabilities()
    }

    pub fn transitions(&self) -> &[Vec<f64>] {
        self.model.transitions()
    }

    pub fn emission(&self) -> &Emission {
        self.model.emission()
    }

    fn observations(&self, series: &Series) -> Result<Vec<Vec<f64>>> {
        observations(
            series,
            self.model.support(),
            Some(self.model.emission.n_features()),
        )
    }

    /// Most likely state sequence for `series` (Viterbi)
    pub fn predict(&self, series: &Series) -> Result<LatentStateSequence> {
        let rows = self.observations(series)?;
        Ok(decode(&self.model, &self.engine, &rows)?.0)
    }

    /// Per-step state posteriors, indexed `[t][state]`
    pub fn posteriors(&self, series: &Series) -> Result<Vec<Vec<f64>>> {
        let rows = self.observations(series)?;
        let log_b = self.model.emission.log_likelihoods(&rows, &self.engine)?;
        Ok(posterior(&self.model.start, &self.model.transitions, &log_b)?.gamma)
    }

    /// Log-likelihood of `series` under the model; `-inf` if impossible
    pub fn log_likelihood(&self, series: &Series) -> Result<f64> {
        let rows = self.observations(series)?;
        let log_b = self.model.emission.log_likelihoods(&rows, &self.engine)?;
        Ok(inference::log_likelihood(
            &self.model.start,
            &self.model.transitions,
            &log_b,
        ))
    }
}

impl<E: ExecutionEngine> FittedAnnotator for FittedHmm<E> {
    type Output = LatentStateSequence;

    fn annotate(&self, series: &Series) -> Result<LatentStateSequence> {
        if series.shares_view(&self.view) {
            return Ok(self.labels.clone());
        }
        self.predict(series)
    }

    fn status(&self) -> FitStatus {
        self.report.status
    }

    fn warnings(&self) -> &[AnnotationWarning] {
        &self.report.warnings
    }
}

/// Gaussian emissions
pub struct GaussianHmm;

impl GaussianHmm {
    pub fn new(n_states: usize, covariance: CovarianceKind) -> Result<Hmm> {
        Hmm::new(HmmParameters::new(
            n_states,
            EmissionKind::Gaussian { covariance },
        ))
    }
}

/// Gaussian-mixture emissions with `n_mix` components per state
pub struct GmmHmm;

impl GmmHmm {
    pub fn new(n_states: usize, n_mix: usize, covariance: CovarianceKind) -> Result<Hmm> {
        Hmm::new(HmmParameters::new(
            n_states,
            EmissionKind::Gmm { n_mix, covariance },
        ))
    }
}

/// Poisson count emissions
pub struct PoissonHmm;

impl PoissonHmm {
    pub fn new(n_states: usize) -> Result<Hmm> {
        Hmm::new(HmmParameters::new(n_states, EmissionKind::Poisson))
    }
}

/// Categorical symbol emissions
pub struct CategoricalHmm;

impl CategoricalHmm {
    /// `n_symbols = None` takes the alphabet size from the training data
    pub fn new(n_states: usize, n_symbols: Option<usize>) -> Result<Hmm> {
        Hmm::new(HmmParameters::new(
            n_states,
            EmissionKind::Categorical { n_symbols },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tsannot_core::test_data::TestSeries;

    fn two_halves() -> Series {
        let mut values = vec![0.0; 50];
        values.extend(vec![10.0; 50]);
        Series::univariate(values).unwrap()
    }

    #[test]
    fn test_two_constant_halves() {
        let hmm = GaussianHmm::new(2, CovarianceKind::Diagonal).unwrap();
        let fitted = hmm.fit(&two_halves()).unwrap();
        let labels = fitted.annotate(&two_halves()).unwrap();
        assert_eq!(labels.breakpoints().as_slice(), &[50]);
        assert_eq!(fitted.status(), FitStatus::Converged);
    }

    #[test]
    fn test_transition_rows_are_stochastic() {
        let values = TestSeries::piecewise_constant(&[0.0, 3.0, -2.0, 3.0], 40, 0.7, 3);
        let series = Series::univariate(values).unwrap();
        for covariance in [
            CovarianceKind::Diagonal,
            CovarianceKind::Full,
            CovarianceKind::Spherical,
            CovarianceKind::Tied,
        ] {
            let fitted = GaussianHmm::new(3, covariance).unwrap().fit(&series).unwrap();
            for row in fitted.transitions() {
                assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            }
            assert!((fitted.start_probabilities().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_log_likelihood_history_increases() {
        let values = TestSeries::piecewise_constant(&[0.0, 2.0, 0.0], 50, 1.0, 9);
        let series = Series::univariate(values).unwrap();
        let fitted = GaussianHmm::new(2, CovarianceKind::Diagonal)
            .unwrap()
            .fit(&series)
            .unwrap();
        let history = &fitted.report().log_likelihood_history;
        assert!(history.len() >= 2);
        for w in history.windows(2) {
            assert!(w[1] >= w[0] - 1e-3, "log-likelihood decreased: {w:?}");
        }
        assert!(fitted.log_likelihood(&series).unwrap() >= history[history.len() - 1] - 1e-3);
    }

    #[test]
    fn test_posteriors_are_distributions() {
        let fitted = GaussianHmm::new(2, CovarianceKind::Full)
            .unwrap()
            .fit(&two_halves())
            .unwrap();
        let gamma = fitted.posteriors(&two_halves()).unwrap();
        assert_eq!(gamma.len(), 100);
        for row in gamma {
            assert_relative_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_iteration_cap_is_a_warning() {
        let values = TestSeries::piecewise_constant(&[0.0, 1.0], 60, 1.0, 4);
        let series = Series::univariate(values).unwrap();
        let hmm = Hmm::new(
            HmmParameters::new(2, EmissionKind::default())
                .with_max_iterations(1)
                .with_tolerance(0.0),
        )
        .unwrap();
        let fitted = hmm.fit(&series).unwrap();
        assert_eq!(fitted.status(), FitStatus::ConvergenceWarning);
        assert!(matches!(
            fitted.warnings(),
            [AnnotationWarning::Convergence { iterations: 1, .. }]
        ));
        assert_eq!(fitted.annotate(&series).unwrap().len(), 120);
    }

    fn duplicated_cluster() -> Series {
        let mut values = vec![0.0; 30];
        values.extend(vec![5.0; 30]);
        Series::univariate(values).unwrap()
    }

    #[test]
    fn test_degenerate_state_is_an_error_by_default() {
        let hmm = Hmm::new(HmmParameters::new(3, EmissionKind::default()).with_degenerate_threshold(0.4))
            .unwrap();
        assert!(matches!(
            hmm.fit(&duplicated_cluster()).unwrap_err(),
            Error::DegenerateModel(_)
        ));
    }

    #[test]
    fn test_degenerate_state_can_be_dropped() {
        let hmm = Hmm::new(
            HmmParameters::new(3, EmissionKind::default())
                .with_degenerate_threshold(0.4)
                .with_degenerate_policy(DegeneratePolicy::ReduceStates),
        )
        .unwrap();
        let fitted = hmm.fit(&duplicated_cluster()).unwrap();
        assert_eq!(fitted.n_states(), 2);
        assert_eq!(fitted.report().n_states, 2);
        assert!(fitted
            .warnings()
            .contains(&AnnotationWarning::StatesReduced { from: 3, to: 2 }));
        let labels = fitted.annotate(&duplicated_cluster()).unwrap();
        assert_eq!(labels.breakpoints().as_slice(), &[30]);
    }

    #[test]
    fn test_poisson_regimes() {
        let values = TestSeries::poisson_regimes(&[2.0, 15.0], 60, 8);
        let series = Series::univariate(values).unwrap();
        let fitted = PoissonHmm::new(2).unwrap().fit(&series).unwrap();
        let labels = fitted.annotate(&series).unwrap();
        let b = labels.breakpoints().as_slice();
        assert_eq!(b.len(), 1, "{b:?}");
        assert!(b[0].abs_diff(60) <= 3);

        let Emission::Poisson(p) = fitted.emission() else {
            panic!("expected Poisson emission");
        };
        let mut rates: Vec<f64> = p.rates().iter().map(|r| r[0]).collect();
        rates.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((rates[0] - 2.0).abs() < 1.0);
        assert!((rates[1] - 15.0).abs() < 2.5);
    }

    #[test]
    fn test_categorical_regimes() {
        let values = TestSeries::categorical_regimes(
            &[vec![0.9, 0.05, 0.05], vec![0.05, 0.05, 0.9]],
            100,
            21,
        );
        let series = Series::univariate(values).unwrap();
        let fitted = CategoricalHmm::new(2, None).unwrap().fit(&series).unwrap();
        let labels = fitted.annotate(&series).unwrap();
        let first = labels.labels()[..100].iter().filter(|&&l| l == labels.labels()[0]).count();
        let second = labels.labels()[100..]
            .iter()
            .filter(|&&l| l != labels.labels()[0])
            .count();
        assert!(first + second >= 180, "agreement {}", first + second);
    }

    #[test]
    fn test_input_validation() {
        let negative = Series::univariate(vec![1.0, -1.0, 2.0]).unwrap();
        assert!(matches!(
            PoissonHmm::new(2).unwrap().fit(&negative).unwrap_err(),
            Error::InvalidInput(_)
        ));

        let fractional = Series::univariate(vec![0.0, 1.5, 2.0]).unwrap();
        assert!(matches!(
            CategoricalHmm::new(2, None).unwrap().fit(&fractional).unwrap_err(),
            Error::InvalidInput(_)
        ));

        let out_of_alphabet = Series::univariate(vec![0.0, 1.0, 3.0]).unwrap();
        assert!(matches!(
            CategoricalHmm::new(2, Some(3)).unwrap().fit(&out_of_alphabet).unwrap_err(),
            Error::InvalidInput(_)
        ));

        let bivariate = Series::multivariate(vec![vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        assert!(matches!(
            CategoricalHmm::new(2, None).unwrap().fit(&bivariate).unwrap_err(),
            Error::Shape(_)
        ));

        let short = Series::univariate(vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            GaussianHmm::new(3, CovarianceKind::Diagonal).unwrap().fit(&short).unwrap_err(),
            Error::InsufficientData {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_predict_checks_dimensions() {
        let fitted = GaussianHmm::new(2, CovarianceKind::Diagonal)
            .unwrap()
            .fit(&two_halves())
            .unwrap();
        let bivariate = Series::multivariate(vec![vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        assert!(matches!(fitted.predict(&bivariate).unwrap_err(), Error::Shape(_)));
    }

    #[test]
    fn test_other_view_is_decoded() {
        let series = two_halves();
        let fitted = GaussianHmm::new(2, CovarianceKind::Diagonal)
            .unwrap()
            .fit(&series)
            .unwrap();
        let view = series.slice(40, 70).unwrap();
        let labels = fitted.annotate(&view).unwrap();
        assert_eq!(labels.len(), 30);
        assert_eq!(labels.breakpoints().as_slice(), &[10]);
    }

    #[test]
    fn test_cancelled_fit_keeps_initial_model() {
        let token = CancellationToken::new();
        token.cancel();
        let hmm = GaussianHmm::new(2, CovarianceKind::Diagonal)
            .unwrap()
            .with_cancellation(token);
        let fitted = hmm.fit(&two_halves()).unwrap();
        assert_eq!(fitted.status(), FitStatus::Cancelled);
        assert!(fitted.report().log_likelihood_history.is_empty());
        assert_eq!(fitted.annotate(&two_halves()).unwrap().len(), 100);
    }

    #[test]
    fn test_gmm_hmm_fits() {
        let values = TestSeries::piecewise_constant(&[0.0, 8.0], 60, 0.5, 12);
        let series = Series::univariate(values).unwrap();
        let fitted = GmmHmm::new(2, 2, CovarianceKind::Diagonal)
            .unwrap()
            .fit(&series)
            .unwrap();
        let b = fitted.annotate(&series).unwrap().breakpoints().as_slice().to_vec();
        assert_eq!(b, vec![60]);
    }
}
