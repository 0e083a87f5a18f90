//! Algorithm selection by configuration
//!
//! [`AnnotatorConfig`] names one algorithm together with its parameters and
//! builds it behind [`DynAnnotator`], so a pipeline can pick detectors from
//! JSON and run them through the same contract.

use serde::{Deserialize, Serialize};
use tracing::debug;
use tsannot_core::{
    Annotation, CancellationToken, DynAnnotator, Error, ExecutionEngine, Result, SequentialEngine,
    Series,
};
use tsannot_hmm::{Hmm, HmmParameters};
use tsannot_outlier::{Stray, StrayParameters};
use tsannot_segment::{
    ClaspParameters, ClaspSegmenter, EAgglo, EaggloParameters, GgsParameters,
    GreedyGaussianSegmenter, IgtsParameters, InformationGainSegmenter, KernelCpd,
    KernelCpdParameters,
};

/// One configured annotation algorithm
///
/// Serialized with an `"algorithm"` tag next to the parameter fields:
///
/// ```rust
/// use tsannot::AnnotatorConfig;
///
/// let config = AnnotatorConfig::from_json(
///     r#"{"algorithm": "kernel_cpd", "n_change_points": 2, "kernel": {"kind": "linear"}}"#,
/// )
/// .unwrap();
/// assert_eq!(config.name(), "kernel_cpd");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum AnnotatorConfig {
    Clasp(ClaspParameters),
    #[serde(rename = "eagglo")]
    EAgglo(EaggloParameters),
    Ggs(GgsParameters),
    Igts(IgtsParameters),
    KernelCpd(KernelCpdParameters),
    Hmm(HmmParameters),
    Stray(StrayParameters),
}

impl AnnotatorConfig {
    /// Tag used in serialized form
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clasp(_) => "clasp",
            Self::EAgglo(_) => "eagglo",
            Self::Ggs(_) => "ggs",
            Self::Igts(_) => "igts",
            Self::KernelCpd(_) => "kernel_cpd",
            Self::Hmm(_) => "hmm",
            Self::Stray(_) => "stray",
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidParameter(format!("annotator config: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::InvalidParameter(format!("annotator config: {e}")))
    }

    /// Build the annotator with sequential execution
    pub fn build(&self) -> Result<Box<dyn DynAnnotator>> {
        self.build_with_engine(SequentialEngine, None)
    }

    /// Build the annotator on `engine`, optionally observing `cancel`
    ///
    /// Algorithms without data-parallel stages ignore the engine; STRAY
    /// ignores the token.
    pub fn build_with_engine<E>(
        &self,
        engine: E,
        cancel: Option<&CancellationToken>,
    ) -> Result<Box<dyn DynAnnotator>>
    where
        E: ExecutionEngine + 'static,
    {
        debug!(algorithm = self.name(), "building annotator");
        let annotator: Box<dyn DynAnnotator> = match self {
            Self::Clasp(p) => {
                let a = ClaspSegmenter::with_engine(p.clone(), engine)?;
                Box::new(with_token(a, cancel, ClaspSegmenter::with_cancellation))
            }
            Self::EAgglo(p) => {
                let a = EAgglo::new(p.clone())?;
                Box::new(with_token(a, cancel, EAgglo::with_cancellation))
            }
            Self::Ggs(p) => {
                let a = GreedyGaussianSegmenter::with_engine(p.clone(), engine)?;
                Box::new(with_token(a, cancel, GreedyGaussianSegmenter::with_cancellation))
            }
            Self::Igts(p) => {
                let a = InformationGainSegmenter::new(p.clone())?;
                Box::new(with_token(a, cancel, InformationGainSegmenter::with_cancellation))
            }
            Self::KernelCpd(p) => {
                let a = KernelCpd::with_engine(p.clone(), engine)?;
                Box::new(with_token(a, cancel, KernelCpd::with_cancellation))
            }
            Self::Hmm(p) => {
                let a = Hmm::with_engine(p.clone(), engine)?;
                Box::new(with_token(a, cancel, Hmm::with_cancellation))
            }
            Self::Stray(p) => Box::new(Stray::with_engine(p.clone(), engine)?),
        };
        Ok(annotator)
    }

    /// Build, fit on `series` and annotate it
    pub fn fit_annotate(&self, series: &Series) -> Result<Annotation> {
        self.build()?.fit_annotate_dyn(series)
    }
}

fn with_token<A>(
    annotator: A,
    cancel: Option<&CancellationToken>,
    attach: fn(A, CancellationToken) -> A,
) -> A {
    match cancel {
        Some(token) => attach(annotator, token.clone()),
        None => annotator,
    }
}

/// Run every configuration on `series`, keeping per-algorithm failures
pub fn annotate_all(
    configs: &[AnnotatorConfig],
    series: &Series,
) -> Vec<(&'static str, Result<Annotation>)> {
    configs
        .iter()
        .map(|config| (config.name(), config.fit_annotate(series)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsannot_core::ChangePointCount;
    use tsannot_hmm::{CovarianceKind, EmissionKind};

    #[test]
    fn test_json_round_trip_keeps_parameters() {
        let configs = vec![
            AnnotatorConfig::Clasp(ClaspParameters::default().with_window_length(5)),
            AnnotatorConfig::EAgglo(
                EaggloParameters::default().with_n_change_points(ChangePointCount::Auto),
            ),
            AnnotatorConfig::Hmm(HmmParameters::new(
                3,
                EmissionKind::Gmm {
                    n_mix: 2,
                    covariance: CovarianceKind::Full,
                },
            )),
            AnnotatorConfig::Stray(StrayParameters::default().with_k(4)),
        ];
        for config in configs {
            let json = config.to_json().unwrap();
            assert!(json.contains(&format!("\"algorithm\":\"{}\"", config.name())));
            assert_eq!(AnnotatorConfig::from_json(&json).unwrap(), config);
        }
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = AnnotatorConfig::from_json(r#"{"algorithm": "ggs"}"#).unwrap();
        assert_eq!(config, AnnotatorConfig::Ggs(GgsParameters::default()));

        let config =
            AnnotatorConfig::from_json(r#"{"algorithm": "clasp", "n_change_points": "auto"}"#)
                .unwrap();
        match config {
            AnnotatorConfig::Clasp(p) => {
                assert_eq!(p.n_change_points, ChangePointCount::Auto);
                assert_eq!(p.window_length, ClaspParameters::default().window_length);
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn test_bad_config_is_rejected() {
        let unknown = AnnotatorConfig::from_json(r#"{"algorithm": "pelt"}"#).unwrap_err();
        assert!(matches!(unknown, Error::InvalidParameter(_)));

        let invalid = AnnotatorConfig::Stray(StrayParameters::default().with_alpha(2.0));
        assert!(matches!(invalid.build().err(), Some(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_build_reports_algorithm_name() {
        let expected = [
            (AnnotatorConfig::Clasp(ClaspParameters::default()), "ClaSP"),
            (AnnotatorConfig::Hmm(HmmParameters::default()), "GaussianHMM"),
            (AnnotatorConfig::Stray(StrayParameters::default()), "STRAY"),
        ];
        for (config, name) in expected {
            assert_eq!(config.build().unwrap().name(), name);
        }
    }
}
