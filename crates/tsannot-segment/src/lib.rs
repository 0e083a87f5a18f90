//! Breakpoint segmentation of time series
//!
//! Every algorithm is an immutable estimator implementing
//! [`tsannot_core::SeriesAnnotator`]; fitting returns a
//! [`FittedSegmenter`] holding the breakpoints found on the fitted view and
//! the algorithm's diagnostics.
//!
//! - [`ClaspSegmenter`]: classification score profile over k-NN windows
//! - [`EAgglo`]: agglomerative merging with energy statistics
//! - [`GreedyGaussianSegmenter`]: greedy Gaussian segmentation
//! - [`InformationGainSegmenter`]: information gain on a split grid
//! - [`KernelCpd`]: kernel cost with dynamic programming or PELT
//!
//! # Example
//!
//! ```rust
//! use tsannot_core::{Series, SeriesAnnotator};
//! use tsannot_segment::{ClaspParameters, ClaspSegmenter};
//!
//! let series = Series::univariate(vec![0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0, 10.0])
//!     .unwrap();
//! let clasp = ClaspSegmenter::new(ClaspParameters::default().with_window_length(2)).unwrap();
//! let breaks = clasp.fit_annotate(&series).unwrap();
//! assert_eq!(breaks.as_slice(), &[5]);
//! ```

pub mod clasp;
pub mod eagglo;
pub mod fitted;
pub mod ggs;
pub mod igts;
pub mod kernel_cpd;

pub use clasp::{ClaspDiagnostics, ClaspParameters, ClaspScore, ClaspSegmenter};
pub use eagglo::{EAgglo, EaggloDiagnostics, EaggloParameters, EaggloPenalty};
pub use fitted::{FittedSegmenter, Segmentation, Segmenter};
pub use ggs::{GgsDiagnostics, GgsParameters, GreedyGaussianSegmenter};
pub use igts::{IgtsDiagnostics, IgtsParameters, IgtsStep, InformationGainSegmenter};
pub use kernel_cpd::{CpdKernel, KernelCpd, KernelCpdDiagnostics, KernelCpdParameters};
