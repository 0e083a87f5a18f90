//! Numeric helpers shared by the annotation algorithms

use statrs::function::gamma::ln_gamma;

/// `ln(Σ exp(x_i))` without overflow; `-inf` for empty or all `-inf` input
pub fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Shift log-weights in place so that they sum to one in probability
/// space, returning the normalizer
pub fn log_normalize(values: &mut [f64]) -> f64 {
    let norm = logsumexp(values);
    if norm.is_finite() {
        for v in values.iter_mut() {
            *v -= norm;
        }
    }
    norm
}

/// `ln P(X = k)` for `X ~ Poisson(rate)`
pub fn poisson_ln_pmf(k: f64, rate: f64) -> f64 {
    if rate <= 0.0 {
        return if k == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    k * rate.ln() - rate - ln_gamma(k + 1.0)
}

/// Natural log of a probability, with `ln 0 = -inf`
pub fn safe_ln(p: f64) -> f64 {
    if p > 0.0 {
        p.ln()
    } else {
        f64::NEG_INFINITY
    }
}

pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_euclidean(a, b).sqrt()
}

/// Arithmetic mean; 0.0 for empty input
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population variance; 0.0 for empty input
pub fn variance(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / data.len() as f64
}

/// Linear-interpolation quantile of unsorted data, `p` in `[0, 1]`
///
/// Returns NaN for empty input.
pub fn quantile(data: &[f64], p: f64) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

pub fn median(data: &[f64]) -> f64 {
    quantile(data, 0.5)
}
