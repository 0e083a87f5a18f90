//! Point anomaly scoring
//!
//! [`Stray`] scores each observation by its k-nearest-neighbour distance at
//! the largest gap and flags the upper tail with an extreme value test on
//! score spacings. [`ScorerAdapter`] wraps any [`ExternalScorer`] so that
//! third-party detectors produce the same [`tsannot_core::AnomalyScoreVector`].
//!
//! # Example
//!
//! ```rust
//! use tsannot_core::{Series, SeriesAnnotator};
//! use tsannot_outlier::{Stray, StrayParameters};
//!
//! let series = Series::univariate(vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 100.0, 1.0, 1.0])
//!     .unwrap();
//! let stray = Stray::new(StrayParameters::default().with_k(3)).unwrap();
//! let scores = stray.fit_annotate(&series).unwrap();
//! assert_eq!(scores.flagged_indices(), vec![7]);
//! ```

pub mod adapter;
pub mod stray;

pub use adapter::{
    AdapterLabels, AdapterOutput, ExternalScorer, FittedScorer, FlagRule, OutputFormat,
    ScorerAdapter,
};
pub use stray::{
    spacing_threshold, FittedStray, Stray, StrayNormalization, StrayParameters, StrayResult,
};
