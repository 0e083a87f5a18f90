//! Time-series annotation
//!
//! Change point detection, segmentation, latent state decoding and point
//! anomaly scoring behind one fit/annotate contract. Every algorithm takes
//! a [`Series`], learns from it with [`SeriesAnnotator::fit`] and labels a
//! view with [`FittedAnnotator::annotate`]; the result is a
//! [`BreakpointSet`], a [`LatentStateSequence`] or an
//! [`AnomalyScoreVector`].
//!
//! # Crates
//!
//! - [`tsannot_core`]: series buffer, annotation types, traits, errors,
//!   execution engines
//! - [`profile`]: k-nearest-neighbour subsequence profiles
//! - [`segment`]: ClaSP, E-Agglo, GGS, IGTS and kernel change points
//! - [`hmm`]: hidden Markov models
//! - [`outlier`]: STRAY and the external scorer adapter
//!
//! # Example
//!
//! ```rust
//! use tsannot::prelude::*;
//! use tsannot::AnnotatorConfig;
//!
//! let mut values = vec![0.0; 30];
//! values.extend(vec![4.0; 30]);
//! let series = Series::univariate(values).unwrap();
//!
//! let config = AnnotatorConfig::from_json(
//!     r#"{"algorithm": "kernel_cpd", "kernel": {"kind": "linear"}}"#,
//! )
//! .unwrap();
//! let annotation = config.fit_annotate(&series).unwrap();
//! assert_eq!(annotation.breakpoints().unwrap().as_slice(), &[30]);
//! ```

pub mod config;

pub use tsannot_hmm as hmm;
pub use tsannot_outlier as outlier;
pub use tsannot_profile as profile;
pub use tsannot_segment as segment;

pub use config::{annotate_all, AnnotatorConfig};
pub use tsannot_core::{
    Annotation, AnnotationWarning, AnnotatorProperties, AnomalyScoreVector, BreakpointSet,
    CancellationToken, ChangePointCount, DynAnnotator, DynFitted, Error, ExecutionEngine,
    FitStatus, FittedAnnotator, LatentStateSequence, Result, SequentialEngine, Series,
    SeriesAnnotator,
};

#[cfg(feature = "parallel")]
pub use tsannot_core::ParallelEngine;

/// Convenience prelude
pub mod prelude {
    pub use tsannot_core::prelude::*;
    pub use tsannot_core::{DynAnnotator, DynFitted};

    pub use crate::config::AnnotatorConfig;
    pub use tsannot_hmm::{FixedHmm, Hmm, HmmParameters};
    pub use tsannot_outlier::{ScorerAdapter, Stray, StrayParameters};
    pub use tsannot_segment::{
        ClaspParameters, ClaspSegmenter, EAgglo, EaggloParameters, GgsParameters,
        GreedyGaussianSegmenter, IgtsParameters, InformationGainSegmenter, KernelCpd,
        KernelCpdParameters,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
