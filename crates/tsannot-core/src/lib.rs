//! Core types and contract for time-series annotation
//!
//! This crate holds everything the algorithm crates share:
//!
//! - [`Series`]: immutable, `Arc`-shared multivariate series with views
//! - output types: [`BreakpointSet`], [`LatentStateSequence`],
//!   [`AnomalyScoreVector`] and the [`Annotation`] sum type
//! - the contract: [`SeriesAnnotator`] (estimator) producing a
//!   [`FittedAnnotator`] (fitted model), plus object-safe mirrors
//! - execution engines ([`SequentialEngine`], and `ParallelEngine` with the
//!   `parallel` feature) and the [`CancellationToken`]
//! - the [`Error`] taxonomy
//!
//! # Example
//!
//! ```rust
//! use tsannot_core::{BreakpointSet, Series};
//!
//! let series = Series::univariate(vec![0.0, 0.0, 1.0, 1.0]).unwrap();
//! let view = series.slice(1, 4).unwrap();
//! assert_eq!(view.len(), 3);
//!
//! let breaks = BreakpointSet::new(vec![2], series.len()).unwrap();
//! assert_eq!(breaks.to_labels(), vec![0, 0, 1, 1]);
//! ```

pub mod cancel;
pub mod error;
pub mod execution;
pub mod math;
pub mod series;
pub mod traits;
pub mod types;
pub mod utils;

#[cfg(feature = "test-utils")]
pub mod test_data;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use execution::{sequential, ExecutionEngine, ExecutionStrategy, SequentialEngine};
#[cfg(feature = "parallel")]
pub use execution::{parallel, ParallelEngine};
pub use series::Series;
pub use traits::{AnnotatorProperties, DynAnnotator, DynFitted, FittedAnnotator, SeriesAnnotator};
pub use types::{
    Annotation, AnnotationWarning, AnomalyScoreVector, BreakpointSet, ChangePointCount,
    FitStatus, LatentStateSequence,
};

/// Convenience prelude
pub mod prelude {
    pub use crate::{
        Annotation, AnnotationWarning, AnnotatorProperties, AnomalyScoreVector, BreakpointSet,
        CancellationToken, ChangePointCount, Error, ExecutionEngine, FitStatus, FittedAnnotator,
        LatentStateSequence, Result, SequentialEngine, Series, SeriesAnnotator,
    };

    #[cfg(feature = "parallel")]
    pub use crate::ParallelEngine;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
