//! Annotation output types

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested number of change points
///
/// Serializes as a plain integer or the string `"auto"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangePointCount {
    Fixed(usize),
    Auto,
}

impl Default for ChangePointCount {
    fn default() -> Self {
        Self::Fixed(1)
    }
}

impl ChangePointCount {
    /// Check a fixed count against a series of length `n`
    ///
    /// A series of length N has N−1 admissible breakpoint positions.
    pub fn check(&self, n: usize) -> Result<()> {
        if let Self::Fixed(k) = *self {
            if k + 1 > n {
                return Err(Error::InsufficientData {
                    expected: k + 1,
                    actual: n,
                });
            }
        }
        Ok(())
    }

    pub fn fixed(&self) -> Option<usize> {
        match *self {
            Self::Fixed(k) => Some(k),
            Self::Auto => None,
        }
    }
}

impl Serialize for ChangePointCount {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match *self {
            Self::Fixed(k) => s.serialize_u64(k as u64),
            Self::Auto => s.serialize_str("auto"),
        }
    }
}

impl<'de> Deserialize<'de> for ChangePointCount {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        struct CountVisitor;

        impl serde::de::Visitor<'_> for CountVisitor {
            type Value = ChangePointCount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or \"auto\"")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                Ok(ChangePointCount::Fixed(v as usize))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                usize::try_from(v)
                    .map(ChangePointCount::Fixed)
                    .map_err(|_| E::custom(format!("change point count {v} is negative")))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                if v.eq_ignore_ascii_case("auto") {
                    Ok(ChangePointCount::Auto)
                } else {
                    Err(E::custom(format!("expected \"auto\", got \"{v}\"")))
                }
            }
        }

        d.deserialize_any(CountVisitor)
    }
}

/// Strictly increasing breakpoint indices inside a series of length N
///
/// Every index `i` satisfies `0 < i < N`. A breakpoint at `i` starts a new
/// segment at position `i`; segment edges 0 and N are implicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSet {
    indices: Vec<usize>,
    series_len: usize,
}

impl BreakpointSet {
    pub fn new(indices: Vec<usize>, series_len: usize) -> Result<Self> {
        for (pos, &i) in indices.iter().enumerate() {
            if i == 0 || i >= series_len {
                return Err(Error::InvalidInput(format!(
                    "breakpoint {i} outside (0, {series_len})"
                )));
            }
            if pos > 0 && indices[pos - 1] >= i {
                return Err(Error::InvalidInput(
                    "breakpoints must be strictly increasing".to_string(),
                ));
            }
        }
        Ok(Self {
            indices,
            series_len,
        })
    }

    /// Build from unsorted, possibly duplicated candidates
    pub fn from_unsorted(mut indices: Vec<usize>, series_len: usize) -> Result<Self> {
        indices.sort_unstable();
        indices.dedup();
        Self::new(indices, series_len)
    }

    pub fn empty(series_len: usize) -> Self {
        Self {
            indices: Vec::new(),
            series_len,
        }
    }

    /// Breakpoints at every position where the label changes
    pub fn from_labels<L: PartialEq>(labels: &[L]) -> Self {
        let indices = labels
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] != w[1])
            .map(|(t, _)| t + 1)
            .collect();
        Self {
            indices,
            series_len: labels.len(),
        }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.indices
    }

    /// Number of breakpoints
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn series_len(&self) -> usize {
        self.series_len
    }

    pub fn n_segments(&self) -> usize {
        self.indices.len() + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// `[start, end)` ranges of each segment
    pub fn segments(&self) -> Vec<(usize, usize)> {
        let mut edges = Vec::with_capacity(self.indices.len() + 2);
        edges.push(0);
        edges.extend_from_slice(&self.indices);
        edges.push(self.series_len);
        edges.windows(2).map(|w| (w[0], w[1])).collect()
    }

    /// Dense segment labels `0, 0, ..., 1, 1, ...`
    pub fn to_labels(&self) -> Vec<usize> {
        let mut labels = Vec::with_capacity(self.series_len);
        for (seg, (start, end)) in self.segments().into_iter().enumerate() {
            labels.extend(std::iter::repeat(seg).take(end - start));
        }
        labels
    }

    /// Shift every breakpoint by `offset`, for mapping a sub-view result
    /// back into its parent
    pub fn offset(&self, offset: usize, parent_len: usize) -> Result<Self> {
        Self::new(
            self.indices.iter().map(|i| i + offset).collect(),
            parent_len,
        )
    }
}

impl fmt::Display for BreakpointSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (n = {})", self.indices, self.series_len)
    }
}

/// Per-time-step latent state labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatentStateSequence {
    labels: Vec<usize>,
    n_states: usize,
    breakpoints: BreakpointSet,
}

impl LatentStateSequence {
    pub fn new(labels: Vec<usize>, n_states: usize) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::empty_input("state sequence"));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_states) {
            return Err(Error::InvalidInput(format!(
                "state label {bad} out of range for {n_states} states"
            )));
        }
        let breakpoints = BreakpointSet::from_labels(&labels);
        Ok(Self {
            labels,
            n_states,
            breakpoints,
        })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Positions where the label differs from its predecessor
    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Per-point anomaly scores with the flags derived from a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScoreVector {
    scores: Vec<f64>,
    flags: Vec<bool>,
    threshold: f64,
}

impl AnomalyScoreVector {
    /// Flags are `score > threshold`
    pub fn new(scores: Vec<f64>, threshold: f64) -> Result<Self> {
        if let Some(&bad) = scores.iter().find(|s| !(**s >= 0.0) || !s.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "anomaly scores must be finite and non-negative, got {bad}"
            )));
        }
        let flags = scores.iter().map(|&s| s > threshold).collect();
        Ok(Self {
            scores,
            flags,
            threshold,
        })
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Sparse view: indices of flagged points
    pub fn flagged_indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Soft signals recorded on a fitted model or result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnotationWarning {
    /// An iteration cap was reached before the stopping criterion
    Convergence { iterations: usize, last_change: f64 },
    /// Neighbourhood size was reduced to fit the sample
    DegenerateNeighborhood { requested_k: usize, used_k: usize },
    /// Hidden states were dropped after losing posterior mass
    StatesReduced { from: usize, to: usize },
    /// No state path has non-zero probability
    InfeasiblePath,
}

impl fmt::Display for AnnotationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Convergence {
                iterations,
                last_change,
            } => write!(
                f,
                "did not converge after {iterations} iterations (last change {last_change:.3e})"
            ),
            Self::DegenerateNeighborhood {
                requested_k,
                used_k,
            } => write!(f, "k = {requested_k} reduced to {used_k}"),
            Self::StatesReduced { from, to } => write!(f, "states reduced from {from} to {to}"),
            Self::InfeasiblePath => write!(f, "every state path has zero probability"),
        }
    }
}

/// How fitting ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitStatus {
    #[default]
    Converged,
    /// Iteration cap reached; the best model so far was kept
    ConvergenceWarning,
    /// Cancelled through a [`crate::CancellationToken`]; best result so far
    Cancelled,
}

/// Any annotation produced through the uniform contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Breakpoints(BreakpointSet),
    States(LatentStateSequence),
    Anomalies(AnomalyScoreVector),
}

impl Annotation {
    /// Breakpoints, when the annotation implies segment boundaries
    pub fn breakpoints(&self) -> Option<&BreakpointSet> {
        match self {
            Self::Breakpoints(b) => Some(b),
            Self::States(s) => Some(s.breakpoints()),
            Self::Anomalies(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Breakpoints(_) => "breakpoints",
            Self::States(_) => "states",
            Self::Anomalies(_) => "anomalies",
        }
    }
}

impl From<BreakpointSet> for Annotation {
    fn from(b: BreakpointSet) -> Self {
        Self::Breakpoints(b)
    }
}

impl From<LatentStateSequence> for Annotation {
    fn from(s: LatentStateSequence) -> Self {
        Self::States(s)
    }
}

impl From<AnomalyScoreVector> for Annotation {
    fn from(a: AnomalyScoreVector) -> Self {
        Self::Anomalies(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_breakpoint_validation() {
        assert!(BreakpointSet::new(vec![3, 7], 10).is_ok());
        assert!(BreakpointSet::new(vec![0], 10).is_err());
        assert!(BreakpointSet::new(vec![10], 10).is_err());
        assert!(BreakpointSet::new(vec![5, 5], 10).is_err());
        assert!(BreakpointSet::new(vec![7, 3], 10).is_err());
        assert_eq!(
            BreakpointSet::from_unsorted(vec![7, 3, 7], 10)
                .unwrap()
                .as_slice(),
            &[3, 7]
        );
    }

    #[test]
    fn test_segments_and_labels() {
        let b = BreakpointSet::new(vec![2, 5], 7).unwrap();
        assert_eq!(b.segments(), vec![(0, 2), (2, 5), (5, 7)]);
        assert_eq!(b.to_labels(), vec![0, 0, 1, 1, 1, 2, 2]);
        assert_eq!(b.n_segments(), 3);
        assert_eq!(BreakpointSet::from_labels(&b.to_labels()), b);

        let e = BreakpointSet::empty(4);
        assert_eq!(e.segments(), vec![(0, 4)]);
        assert_eq!(e.to_labels(), vec![0; 4]);
    }

    #[test]
    fn test_offset() {
        let b = BreakpointSet::new(vec![2], 5).unwrap();
        assert_eq!(b.offset(10, 20).unwrap().as_slice(), &[12]);
        assert!(b.offset(10, 12).is_err());
    }

    #[test]
    fn test_change_point_count() {
        assert!(ChangePointCount::Fixed(9).check(10).is_ok());
        assert!(matches!(
            ChangePointCount::Fixed(10).check(10),
            Err(Error::InsufficientData {
                expected: 11,
                actual: 10
            })
        ));
        assert!(ChangePointCount::Auto.check(1).is_ok());

        let auto: ChangePointCount = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, ChangePointCount::Auto);
        let three: ChangePointCount = serde_json::from_str("3").unwrap();
        assert_eq!(three, ChangePointCount::Fixed(3));
        assert_eq!(serde_json::to_string(&ChangePointCount::Auto).unwrap(), "\"auto\"");
        assert!(serde_json::from_str::<ChangePointCount>("\"many\"").is_err());
    }

    #[test]
    fn test_latent_state_sequence() {
        let s = LatentStateSequence::new(vec![0, 0, 1, 1, 0], 2).unwrap();
        assert_eq!(s.breakpoints().as_slice(), &[2, 4]);
        assert!(LatentStateSequence::new(vec![0, 2], 2).is_err());
        assert!(LatentStateSequence::new(vec![], 2).is_err());
    }

    #[test]
    fn test_anomaly_vector() {
        let a = AnomalyScoreVector::new(vec![0.1, 2.0, 0.3], 1.0).unwrap();
        assert_eq!(a.flags(), &[false, true, false]);
        assert_eq!(a.flagged_indices(), vec![1]);
        assert!(AnomalyScoreVector::new(vec![-1.0], 0.0).is_err());
        assert!(AnomalyScoreVector::new(vec![f64::NAN], 0.0).is_err());

        let inf = AnomalyScoreVector::new(vec![5.0], f64::INFINITY).unwrap();
        assert!(inf.flagged_indices().is_empty());
    }

    #[test]
    fn test_annotation_breakpoints() {
        let states = LatentStateSequence::new(vec![1, 1, 0], 2).unwrap();
        let a: Annotation = states.into();
        assert_eq!(a.breakpoints().unwrap().as_slice(), &[2]);
        assert_eq!(a.kind(), "states");

        let anomalies: Annotation = AnomalyScoreVector::new(vec![0.0], 1.0).unwrap().into();
        assert!(anomalies.breakpoints().is_none());
    }

    proptest! {
        #[test]
        fn prop_labels_roundtrip(labels in prop::collection::vec(0usize..3, 1..60)) {
            let b = BreakpointSet::from_labels(&labels);
            prop_assert!(BreakpointSet::new(b.as_slice().to_vec(), labels.len()).is_ok());
            let dense = b.to_labels();
            prop_assert_eq!(dense.len(), labels.len());
            prop_assert_eq!(BreakpointSet::from_labels(&dense), b);
        }
    }
}
