//! Error types for time-series annotation
//!
//! Provides a unified error type for all tsannot crates. Soft signals such
//! as iteration caps are not errors; see [`crate::AnnotationWarning`].

use thiserror::Error;

/// Core error type for annotation operations
#[derive(Error, Debug)]
pub enum Error {
    /// Series construction or slicing with inconsistent dimensions
    #[error("Shape error: {0}")]
    Shape(String),

    /// Window length outside the admissible range for the series
    #[error("Window error: window length {window} is invalid for series of length {len}: {reason}")]
    Window {
        window: usize,
        len: usize,
        reason: String,
    },

    /// Insufficient data for the requested operation
    #[error("Insufficient data: expected at least {expected} samples, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    /// A model component lost all support during fitting
    #[error("Degenerate model: {0}")]
    DegenerateModel(String),

    /// Invalid parameter provided to a function
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Numerical computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Threading or parallelization error
    #[error("Execution error: {0}")]
    Execution(String),

    /// Errors raised by external scorers behind the adapter seam
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error for empty input
    pub fn empty_input(context: &str) -> Self {
        Self::Shape(format!("{context}: input is empty"))
    }

    /// Create a window error
    pub fn window(window: usize, len: usize, reason: impl Into<String>) -> Self {
        Self::Window {
            window,
            len,
            reason: reason.into(),
        }
    }

    /// Create an error for size mismatch
    pub fn size_mismatch(expected: usize, actual: usize, context: &str) -> Self {
        Self::Shape(format!(
            "Size mismatch in {context}: expected {expected}, got {actual}"
        ))
    }

    /// Create an error for NaN/Inf values
    pub fn non_finite(context: &str) -> Self {
        Self::Shape(format!("{context} contains NaN or infinite values"))
    }

    /// Create an error for a parameter outside its range
    pub fn out_of_range(name: &str, value: impl std::fmt::Display, range: &str) -> Self {
        Self::InvalidParameter(format!("{name} = {value} must be in {range}"))
    }

    /// Whether this error was raised by input validation rather than by
    /// the algorithm itself
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Shape(_)
                | Self::Window { .. }
                | Self::InsufficientData { .. }
                | Self::InvalidParameter(_)
                | Self::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Shape("columns differ".to_string());
        assert_eq!(err.to_string(), "Shape error: columns differ");

        let err = Error::window(12, 20, "must be below half the series length");
        assert_eq!(
            err.to_string(),
            "Window error: window length 12 is invalid for series of length 20: must be below half the series length"
        );

        let err = Error::InsufficientData {
            expected: 10,
            actual: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data: expected at least 10 samples, got 5"
        );

        let err = Error::DegenerateModel("state 2 has no support".to_string());
        assert_eq!(err.to_string(), "Degenerate model: state 2 has no support");

        let err = Error::InvalidParameter("alpha must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid parameter: alpha must be positive");

        let err = Error::Computation("cholesky failed".to_string());
        assert_eq!(err.to_string(), "Computation error: cholesky failed");

        let err = Error::Execution("thread pool exhausted".to_string());
        assert_eq!(err.to_string(), "Execution error: thread pool exhausted");
    }

    #[test]
    fn test_error_helper_functions() {
        let err = Error::size_mismatch(100, 50, "column 'b'");
        assert_eq!(
            err.to_string(),
            "Shape error: Size mismatch in column 'b': expected 100, got 50"
        );

        let err = Error::non_finite("column 'a'");
        assert_eq!(
            err.to_string(),
            "Shape error: column 'a' contains NaN or infinite values"
        );

        let err = Error::out_of_range("alpha", 0.0, "(0, 1)");
        assert_eq!(err.to_string(), "Invalid parameter: alpha = 0 must be in (0, 1)");

        assert!(matches!(Error::empty_input("series"), Error::Shape(_)));
    }

    #[test]
    fn test_validation_classification() {
        assert!(Error::window(1, 10, "too short").is_validation());
        assert!(Error::InsufficientData {
            expected: 3,
            actual: 1
        }
        .is_validation());
        assert!(!Error::DegenerateModel("x".into()).is_validation());
        assert!(!Error::Computation("x".into()).is_validation());
    }

    #[test]
    fn test_from_anyhow() {
        let err: Error = anyhow::anyhow!("scorer exploded").into();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "Other error: scorer exploded");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(Error::InvalidParameter("test".to_string()))
        }

        assert_eq!(returns_ok().unwrap(), 42);
        assert!(returns_err().is_err());
    }
}
