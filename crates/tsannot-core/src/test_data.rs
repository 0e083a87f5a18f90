//! Seeded synthetic series for tests and benchmarks
//!
//! Available with the `test-utils` feature. Every generator takes an explicit
//! seed so that tests are reproducible.

use crate::Series;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson, Uniform, WeightedIndex};

/// Standard synthetic series with known segment structure
pub struct TestSeries;

impl TestSeries {
    /// Consecutive segments of `segment_len` points around each level, with
    /// Gaussian noise of standard deviation `noise_sd`
    pub fn piecewise_constant(
        levels: &[f64],
        segment_len: usize,
        noise_sd: f64,
        seed: u64,
    ) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, noise_sd.max(0.0)).unwrap();
        levels
            .iter()
            .flat_map(|&level| std::iter::repeat(level).take(segment_len))
            .map(|level| level + noise.sample(&mut rng))
            .collect()
    }

    /// Zero-mean segments whose standard deviation changes per segment
    pub fn variance_shift(sds: &[f64], segment_len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(sds.len() * segment_len);
        for &sd in sds {
            let normal = Normal::new(0.0, sd).unwrap();
            out.extend((0..segment_len).map(|_| normal.sample(&mut rng)));
        }
        out
    }

    /// Sine segments with a different period each, plus light noise
    pub fn frequency_shift(periods: &[f64], segment_len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.05).unwrap();
        let mut out = Vec::with_capacity(periods.len() * segment_len);
        for &period in periods {
            out.extend((0..segment_len).map(|t| {
                (2.0 * std::f64::consts::PI * t as f64 / period).sin() + noise.sample(&mut rng)
            }));
        }
        out
    }

    /// Multivariate Gaussian segments; `means[s]` is the mean vector of
    /// segment `s`
    pub fn piecewise_multivariate(
        means: &[Vec<f64>],
        segment_len: usize,
        noise_sd: f64,
        seed: u64,
    ) -> Series {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, noise_sd).unwrap();
        let d = means.first().map_or(1, Vec::len);
        let mut columns = vec![Vec::with_capacity(means.len() * segment_len); d];
        for mean in means {
            for _ in 0..segment_len {
                for (c, column) in columns.iter_mut().enumerate() {
                    column.push(mean[c] + noise.sample(&mut rng));
                }
            }
        }
        Series::multivariate(columns).unwrap()
    }

    /// Poisson counts with a different rate per segment
    pub fn poisson_regimes(rates: &[f64], segment_len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(rates.len() * segment_len);
        for &rate in rates {
            let poisson = Poisson::new(rate).unwrap();
            out.extend((0..segment_len).map(|_| poisson.sample(&mut rng)));
        }
        out
    }

    /// Symbols drawn from a different categorical distribution per segment
    pub fn categorical_regimes(weights: &[Vec<f64>], segment_len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(weights.len() * segment_len);
        for w in weights {
            let dist = WeightedIndex::new(w).unwrap();
            out.extend((0..segment_len).map(|_| dist.sample(&mut rng) as f64));
        }
        out
    }

    /// Uniform background in `[0, 1)` with spikes of `magnitude` at the
    /// given positions
    pub fn with_outliers(n: usize, positions: &[usize], magnitude: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let uniform = Uniform::new(0.0, 1.0);
        let mut out: Vec<f64> = (0..n).map(|_| uniform.sample(&mut rng)).collect();
        for &p in positions {
            if p < n {
                out[p] += magnitude;
            }
        }
        out
    }

    /// Gaussian random walk
    pub fn random_walk(n: usize, step_sd: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let step = Normal::new(0.0, step_sd).unwrap();
        let mut level = 0.0;
        (0..n)
            .map(|_| {
                level += step.sample(&mut rng);
                level
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generators_are_reproducible() {
        let a = TestSeries::piecewise_constant(&[0.0, 5.0], 20, 0.1, 7);
        let b = TestSeries::piecewise_constant(&[0.0, 5.0], 20, 0.1, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a[..20].iter().all(|v| v.abs() < 1.0));
        assert!(a[20..].iter().all(|v| (v - 5.0).abs() < 1.0));
    }

    #[test]
    fn test_shapes() {
        assert_eq!(TestSeries::variance_shift(&[1.0, 3.0], 10, 1).len(), 20);
        assert_eq!(TestSeries::frequency_shift(&[5.0, 20.0], 50, 1).len(), 100);
        let mv = TestSeries::piecewise_multivariate(&[vec![0.0, 0.0], vec![3.0, -3.0]], 15, 0.5, 3);
        assert_eq!(mv.len(), 30);
        assert_eq!(mv.n_columns(), 2);
        let counts = TestSeries::poisson_regimes(&[1.0, 20.0], 25, 4);
        assert!(counts.iter().all(|c| *c >= 0.0 && c.fract() == 0.0));
        let symbols = TestSeries::categorical_regimes(&[vec![1.0, 0.0], vec![0.0, 1.0]], 5, 5);
        assert_eq!(symbols, vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let spiky = TestSeries::with_outliers(30, &[10], 50.0, 6);
        assert!(spiky[10] > 50.0);
        assert_eq!(TestSeries::random_walk(12, 1.0, 8).len(), 12);
    }
}
