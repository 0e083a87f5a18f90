//! Hidden Markov model segmentation
//!
//! [`Hmm`] fits a hidden Markov model by Baum-Welch and labels each time
//! step with its Viterbi state; segment boundaries are where the label
//! changes. Emission families are chosen through [`EmissionKind`] or the
//! thin constructors [`GaussianHmm`], [`GmmHmm`], [`PoissonHmm`] and
//! [`CategoricalHmm`]. [`FixedHmm`] skips estimation and decodes with
//! user-supplied densities and transitions.
//!
//! # Example
//!
//! ```rust
//! use tsannot_core::{Series, SeriesAnnotator};
//! use tsannot_hmm::{CovarianceKind, GaussianHmm};
//!
//! let mut values = vec![0.0; 20];
//! values.extend(vec![10.0; 20]);
//! let series = Series::univariate(values).unwrap();
//!
//! let hmm = GaussianHmm::new(2, CovarianceKind::Diagonal).unwrap();
//! let states = hmm.fit_annotate(&series).unwrap();
//! assert_eq!(states.breakpoints().as_slice(), &[20]);
//! ```

pub mod emission;
pub mod fixed;
pub mod inference;
mod kmeans;
pub mod model;
pub mod params;

pub use emission::{CategoricalEmission, Emission, GaussianEmission, GmmEmission, PoissonEmission};
pub use fixed::{DensityFn, FittedFixedHmm, FixedHmm};
pub use inference::ViterbiPath;
pub use model::{
    CategoricalHmm, FittedHmm, GaussianHmm, GmmHmm, Hmm, HmmModel, PoissonHmm, TrainingReport,
};
pub use params::{CovarianceKind, DegeneratePolicy, EmissionKind, HmmParameters};
