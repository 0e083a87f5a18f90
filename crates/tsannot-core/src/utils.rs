//! Deterministic selection helpers
//!
//! All algorithms resolve ties towards the lowest index so that results do
//! not depend on evaluation order.

use num_traits::Float;

/// Index of the largest value, lowest index on ties; NaN is never selected
///
/// ```rust
/// use tsannot_core::utils::argmax;
///
/// assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some(1));
/// assert_eq!(argmax::<f64>(&[]), None);
/// ```
pub fn argmax<T: Float>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the smallest value, lowest index on ties; NaN is never selected
pub fn argmin<T: Float>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
