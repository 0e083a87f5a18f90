//! Fitted model shared by all breakpoint segmenters

use tracing::debug;
use tsannot_core::{
    AnnotationWarning, AnnotatorProperties, BreakpointSet, FitStatus, FittedAnnotator, Result,
    Series,
};

/// A configured breakpoint segmentation algorithm
///
/// Implementors run their search in [`Segmenter::segment`]; fitting and
/// re-annotation are provided by [`FittedSegmenter`].
pub trait Segmenter: AnnotatorProperties + Clone + Send + Sync {
    /// Algorithm-specific by-products (score profiles, traces, ...)
    type Diagnostics: Clone + std::fmt::Debug + Send + Sync;

    fn segment(&self, series: &Series) -> Result<Segmentation<Self::Diagnostics>>;
}

/// Outcome of one segmentation run
#[derive(Debug, Clone)]
pub struct Segmentation<D> {
    pub breakpoints: BreakpointSet,
    pub status: FitStatus,
    pub warnings: Vec<AnnotationWarning>,
    pub diagnostics: D,
}

/// A segmenter fitted on one series view
///
/// Annotating the fitted view returns the stored breakpoints; any other
/// view is segmented afresh with the same configuration.
#[derive(Debug, Clone)]
pub struct FittedSegmenter<A: Segmenter> {
    algorithm: A,
    view: Series,
    result: Segmentation<A::Diagnostics>,
}

impl<A: Segmenter> FittedSegmenter<A> {
    pub fn fit(algorithm: &A, series: &Series) -> Result<Self> {
        let result = algorithm.segment(series)?;
        debug!(
            algorithm = algorithm.algorithm_name(),
            breakpoints = ?result.breakpoints.as_slice(),
            status = ?result.status,
            "segmentation fitted"
        );
        Ok(Self {
            algorithm: algorithm.clone(),
            view: series.clone(),
            result,
        })
    }

    /// Breakpoints found on the fitted view
    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.result.breakpoints
    }

    pub fn diagnostics(&self) -> &A::Diagnostics {
        &self.result.diagnostics
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn segmentation(&self) -> &Segmentation<A::Diagnostics> {
        &self.result
    }
}

impl<A: Segmenter> FittedAnnotator for FittedSegmenter<A> {
    type Output = BreakpointSet;

    fn annotate(&self, series: &Series) -> Result<BreakpointSet> {
        if series.shares_view(&self.view) {
            return Ok(self.result.breakpoints.clone());
        }
        Ok(self.algorithm.segment(series)?.breakpoints)
    }

    fn status(&self) -> FitStatus {
        self.result.status
    }

    fn warnings(&self) -> &[AnnotationWarning] {
        &self.result.warnings
    }
}
