//! Seeded k-means used to place initial emission parameters

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tsannot_core::math::squared_euclidean;
use tsannot_core::utils::argmin;

const MAX_LLOYD_ITERATIONS: usize = 50;

#[derive(Debug, Clone)]
pub(crate) struct KMeans {
    pub centroids: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

/// Nearest centroid, lowest index on ties
fn nearest(row: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let dist: Vec<f64> = centroids
        .iter()
        .map(|centroid| squared_euclidean(row, centroid))
        .collect();
    argmin(&dist).map_or((0, f64::INFINITY), |c| (c, dist[c]))
}

/// k-means++ seeding followed by Lloyd iterations
///
/// `rows` must be non-empty and `k >= 1`. When there are fewer distinct rows
/// than `k`, the surplus centroids duplicate existing ones.
pub(crate) fn kmeans(rows: &[Vec<f64>], k: usize, seed: u64) -> KMeans {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = rows.len();

    let mut centroids = Vec::with_capacity(k);
    centroids.push(rows[rng.gen_range(0..n)].clone());
    let mut dist: Vec<f64> = rows
        .iter()
        .map(|r| squared_euclidean(r, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = dist.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = n - 1;
            for (i, &d) in dist.iter().enumerate() {
                if target < d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..n)
        };
        centroids.push(rows[next].clone());
        for (d, row) in dist.iter_mut().zip(rows) {
            *d = d.min(squared_euclidean(row, &rows[next]));
        }
    }

    let dim = rows[0].len();
    let mut labels = vec![0; n];
    for _ in 0..MAX_LLOYD_ITERATIONS {
        let mut changed = false;
        for (label, row) in labels.iter_mut().zip(rows) {
            let (c, _) = nearest(row, &centroids);
            if *label != c {
                *label = c;
                changed = true;
            }
        }

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (&label, row) in labels.iter().zip(rows) {
            counts[label] += 1;
            for (s, v) in sums[label].iter_mut().zip(row) {
                *s += v;
            }
        }
        for ((centroid, sum), &count) in centroids.iter_mut().zip(sums).zip(&counts) {
            // empty clusters keep their previous centroid
            if count > 0 {
                *centroid = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }

        if !changed {
            break;
        }
    }

    KMeans { centroids, labels }
}
