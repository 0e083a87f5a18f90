//! Distance profiles for time-series annotation
//!
//! Computes, for every length-`L` subsequence of a univariate series, its
//! nearest (or `k` nearest) non-trivial match under z-normalized or absolute
//! Euclidean distance. Matches closer than the exclusion zone `ceil(L/2)`
//! are trivial and never reported.
//!
//! # Example
//!
//! ```rust
//! use tsannot_core::Series;
//! use tsannot_profile::{compute_profile, Metric, ProfileConfig, ProfileEngine};
//!
//! let values: Vec<f64> = (0..64).map(|i| (i as f64 * 0.5).sin()).collect();
//! let series = Series::univariate(values).unwrap();
//!
//! let profile = compute_profile(&series, 8).unwrap();
//! assert_eq!(profile.len(), 64 - 8 + 1);
//!
//! let engine = ProfileEngine::new(ProfileConfig::new(8).with_metric(Metric::AbsoluteEuclidean));
//! let knn = engine.compute_knn(&series, 3).unwrap();
//! assert!(knn.neighbors(0).len() <= 3);
//! ```

pub mod dot;
pub mod engine;
pub mod metric;
mod topk;

pub use engine::{
    compute_knn_profile, compute_profile, exclusion_zone, validate_window, KnnProfile, Profile,
    ProfileConfig, ProfileEngine,
};
pub use metric::Metric;
