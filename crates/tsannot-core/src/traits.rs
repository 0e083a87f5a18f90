//! The uniform annotation contract
//!
//! Every algorithm is an immutable *estimator* implementing
//! [`SeriesAnnotator`]. Fitting consumes a [`Series`] and produces a
//! separate *fitted* value implementing [`FittedAnnotator`]; the estimator
//! itself is never mutated, so "predict before fit" cannot be expressed.
//!
//! [`DynAnnotator`] is the object-safe mirror used when algorithms are
//! selected at runtime (see the facade crate's configuration layer).

use crate::execution::ExecutionEngine;
use crate::{Annotation, AnnotationWarning, FitStatus, Result, Series};

/// Common properties shared by all annotators
pub trait AnnotatorProperties {
    /// Get the name of the algorithm
    fn algorithm_name(&self) -> &'static str;

    /// Minimum series length this configuration can handle
    fn minimum_sample_size(&self) -> usize;
}

/// An unfitted annotation algorithm with its configuration
pub trait SeriesAnnotator: AnnotatorProperties {
    /// The fitted model produced by [`SeriesAnnotator::fit`]
    type Fitted: FittedAnnotator;

    /// Learn from `series`
    fn fit(&self, series: &Series) -> Result<Self::Fitted>;

    /// Fit on `series` and annotate the same view
    fn fit_annotate(
        &self,
        series: &Series,
    ) -> Result<<Self::Fitted as FittedAnnotator>::Output> {
        let fitted = self.fit(series)?;
        fitted.annotate(series)
    }

    /// Fit and annotate each series independently, results in input order
    fn fit_annotate_batch<E>(
        &self,
        batch: &[Series],
        engine: &E,
    ) -> Vec<Result<<Self::Fitted as FittedAnnotator>::Output>>
    where
        Self: Sync,
        E: ExecutionEngine,
        <Self::Fitted as FittedAnnotator>::Output: Send,
    {
        engine.execute_batch(batch.len(), |i| self.fit_annotate(&batch[i]))
    }
}

/// A fitted, immutable model
pub trait FittedAnnotator {
    /// What [`FittedAnnotator::annotate`] returns
    type Output: Into<Annotation> + Clone;

    /// Annotate `series`
    ///
    /// For the view the model was fitted on this returns the result
    /// computed during fitting.
    fn annotate(&self, series: &Series) -> Result<Self::Output>;

    /// How fitting ended
    fn status(&self) -> FitStatus {
        FitStatus::Converged
    }

    /// Soft signals recorded during fitting
    fn warnings(&self) -> &[AnnotationWarning] {
        &[]
    }
}

/// Object-safe annotator for runtime selection
pub trait DynAnnotator: Send + Sync {
    fn name(&self) -> &'static str;

    fn min_len(&self) -> usize;

    fn fit_dyn(&self, series: &Series) -> Result<Box<dyn DynFitted>>;

    fn fit_annotate_dyn(&self, series: &Series) -> Result<Annotation> {
        self.fit_dyn(series)?.annotate_dyn(series)
    }
}

/// Object-safe fitted model
pub trait DynFitted: Send + Sync {
    fn annotate_dyn(&self, series: &Series) -> Result<Annotation>;

    fn fit_status(&self) -> FitStatus;

    fn fit_warnings(&self) -> Vec<AnnotationWarning>;
}

impl<T> DynAnnotator for T
where
    T: SeriesAnnotator + Send + Sync,
    T::Fitted: Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.algorithm_name()
    }

    fn min_len(&self) -> usize {
        self.minimum_sample_size()
    }

    fn fit_dyn(&self, series: &Series) -> Result<Box<dyn DynFitted>> {
        Ok(Box::new(self.fit(series)?))
    }
}

impl<F> DynFitted for F
where
    F: FittedAnnotator + Send + Sync,
{
    fn annotate_dyn(&self, series: &Series) -> Result<Annotation> {
        self.annotate(series).map(Into::into)
    }

    fn fit_status(&self) -> FitStatus {
        self.status()
    }

    fn fit_warnings(&self) -> Vec<AnnotationWarning> {
        self.warnings().to_vec()
    }
}
