//! Subsequence distance metrics
//!
//! Both metrics are evaluated from the dot product `QT` of two windows plus
//! per-window statistics, which is what makes the diagonal recurrence in
//! [`crate::engine`] O(1) per pair.

use serde::{Deserialize, Serialize};

/// Windows with a standard deviation below this are treated as constant
const CONSTANT_SIGMA: f64 = 1e-12;

/// Distance between two length-`L` windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Euclidean distance of the z-normalized windows, `sqrt(2L(1 − r))`
    ///
    /// Two constant windows are at distance 0; a constant and a varying
    /// window are at `sqrt(2L)`.
    #[default]
    ZNormalizedEuclidean,
    /// Plain Euclidean distance of the raw windows
    AbsoluteEuclidean,
}

/// Rolling per-window statistics computed from cumulative sums
#[derive(Debug, Clone)]
pub struct RollingStats {
    pub mean: Vec<f64>,
    /// `1 / (sqrt(L) σ)`, zero for constant windows
    pub m_sigma_inv: Vec<f64>,
    /// `Σ x²` over each window
    pub sum_sq: Vec<f64>,
}

impl RollingStats {
    pub fn compute(ts: &[f64], m: usize) -> Self {
        let n = ts.len();
        let n_subs = n + 1 - m;

        let mut cumsum = vec![0.0; n + 1];
        let mut cumsum_sq = vec![0.0; n + 1];
        for i in 0..n {
            cumsum[i + 1] = cumsum[i] + ts[i];
            cumsum_sq[i + 1] = cumsum_sq[i] + ts[i] * ts[i];
        }

        let m_f = m as f64;
        let sqrt_m = m_f.sqrt();
        let mut mean = Vec::with_capacity(n_subs);
        let mut m_sigma_inv = Vec::with_capacity(n_subs);
        let mut sum_sq = Vec::with_capacity(n_subs);
        for i in 0..n_subs {
            let sum = cumsum[i + m] - cumsum[i];
            let sq = cumsum_sq[i + m] - cumsum_sq[i];
            let mu = sum / m_f;
            // direct pass for the variance; cumulative E[x²] − μ² cancels badly
            let var = ts[i..i + m].iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / m_f;
            let sigma = var.sqrt();
            mean.push(mu);
            sum_sq.push(sq);
            m_sigma_inv.push(if sigma < CONSTANT_SIGMA * mu.abs().max(1.0) {
                0.0
            } else {
                1.0 / (sqrt_m * sigma)
            });
        }

        Self {
            mean,
            m_sigma_inv,
            sum_sq,
        }
    }
}

impl Metric {
    /// Distance between windows `i` and `j` given their dot product
    #[inline]
    pub fn qt_to_distance(self, qt: f64, i: usize, j: usize, m: usize, stats: &RollingStats) -> f64 {
        match self {
            Metric::ZNormalizedEuclidean => {
                let msi = stats.m_sigma_inv[i];
                let msj = stats.m_sigma_inv[j];
                let m_f = m as f64;
                if msi == 0.0 && msj == 0.0 {
                    return 0.0;
                }
                if msi == 0.0 || msj == 0.0 {
                    return (2.0 * m_f).sqrt();
                }
                let r = ((qt - m_f * stats.mean[i] * stats.mean[j]) * msi * msj).clamp(-1.0, 1.0);
                (2.0 * m_f * (1.0 - r)).max(0.0).sqrt()
            }
            Metric::AbsoluteEuclidean => {
                (stats.sum_sq[i] + stats.sum_sq[j] - 2.0 * qt).max(0.0).sqrt()
            }
        }
    }

    /// Direct O(L) distance, used as a reference
    pub fn distance(self, ts: &[f64], i: usize, j: usize, m: usize) -> f64 {
        let a = &ts[i..i + m];
        let b = &ts[j..j + m];
        match self {
            Metric::AbsoluteEuclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            Metric::ZNormalizedEuclidean => {
                let za = znormalize(a);
                let zb = znormalize(b);
                match (za, zb) {
                    (None, None) => 0.0,
                    (None, Some(_)) | (Some(_), None) => (2.0 * m as f64).sqrt(),
                    (Some(za), Some(zb)) => za
                        .iter()
                        .zip(&zb)
                        .map(|(x, y)| (x - y) * (x - y))
                        .sum::<f64>()
                        .sqrt(),
                }
            }
        }
    }
}

fn znormalize(w: &[f64]) -> Option<Vec<f64>> {
    let n = w.len() as f64;
    let mu = w.iter().sum::<f64>() / n;
    let sd = (w.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / n).sqrt();
    (sd >= CONSTANT_SIGMA * mu.abs().max(1.0)).then(|| w.iter().map(|v| (v - mu) / sd).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_qt_matches_direct() {
        let ts = [1.0, 3.0, 2.0, 5.0, 4.0, 4.0, 0.0, 1.0];
        let m = 3;
        let stats = RollingStats::compute(&ts, m);
        for metric in [Metric::ZNormalizedEuclidean, Metric::AbsoluteEuclidean] {
            for i in 0..6 {
                for j in (0..6).filter(|&j| j != i) {
                    let qt = dot(&ts[i..i + m], &ts[j..j + m]);
                    assert_relative_eq!(
                        metric.qt_to_distance(qt, i, j, m, &stats),
                        metric.distance(&ts, i, j, m),
                        epsilon = 1e-9
                    );
                }
            }
        }
    }

    #[test]
    fn test_constant_windows() {
        let ts = [2.0, 2.0, 2.0, 2.0, 1.0, 5.0];
        let m = 2;
        let stats = RollingStats::compute(&ts, m);
        let z = Metric::ZNormalizedEuclidean;
        assert_eq!(z.qt_to_distance(8.0, 0, 2, m, &stats), 0.0);
        assert_relative_eq!(z.qt_to_distance(0.0, 0, 4, m, &stats), 2.0);
        assert_relative_eq!(z.distance(&ts, 0, 4, m), 2.0);

        let a = Metric::AbsoluteEuclidean;
        assert_eq!(a.distance(&ts, 0, 1, m), 0.0);
        assert_relative_eq!(a.distance(&ts, 0, 4, m), (1.0f64 + 9.0).sqrt());
    }
}
