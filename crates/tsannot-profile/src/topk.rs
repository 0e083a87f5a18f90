//! Flat top-k accumulator
//!
//! Candidates are ordered lexicographically by `(distance, neighbour)`, so
//! the retained set does not depend on the order pairs are visited in. This
//! is what makes the parallel diagonal split reproduce sequential results.

#[derive(Debug, Clone)]
pub(crate) struct TopKAccumulator {
    distances: Vec<f64>,
    indices: Vec<usize>,
    k: usize,
}

#[inline]
fn precedes(d: f64, i: usize, other_d: f64, other_i: usize) -> bool {
    d < other_d || (d == other_d && i < other_i)
}

impl TopKAccumulator {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            distances: vec![f64::INFINITY; n * k],
            indices: vec![usize::MAX; n * k],
            k,
        }
    }

    /// Offer `neighbor` at `dist` to position `idx`
    #[inline]
    pub fn update(&mut self, idx: usize, dist: f64, neighbor: usize) {
        let base = idx * self.k;
        let worst = base + self.k - 1;
        if !precedes(dist, neighbor, self.distances[worst], self.indices[worst]) {
            return;
        }

        let mut pos = worst;
        while pos > base
            && precedes(
                dist,
                neighbor,
                self.distances[pos - 1],
                self.indices[pos - 1],
            )
        {
            self.distances[pos] = self.distances[pos - 1];
            self.indices[pos] = self.indices[pos - 1];
            pos -= 1;
        }
        self.distances[pos] = dist;
        self.indices[pos] = neighbor;
    }

    /// Fold another accumulator over disjoint pairs into this one
    pub fn merge(&mut self, other: &TopKAccumulator) {
        let n = self.distances.len() / self.k;
        for idx in 0..n {
            let base = idx * self.k;
            for slot in base..base + self.k {
                if other.indices[slot] == usize::MAX {
                    break;
                }
                self.update(idx, other.distances[slot], other.indices[slot]);
            }
        }
    }

    /// Filled `(distance, neighbour)` entries for each position, ascending
    pub fn into_rows(self) -> Vec<Vec<(f64, usize)>> {
        self.distances
            .chunks(self.k)
            .zip(self.indices.chunks(self.k))
            .map(|(d, i)| {
                d.iter()
                    .zip(i)
                    .take_while(|(_, &j)| j != usize::MAX)
                    .map(|(&d, &j)| (d, j))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_k_smallest_sorted() {
        let mut acc = TopKAccumulator::new(1, 3);
        for (d, j) in [(5.0, 1), (1.0, 2), (3.0, 3), (0.5, 4), (9.0, 5)] {
            acc.update(0, d, j);
        }
        assert_eq!(acc.into_rows()[0], vec![(0.5, 4), (1.0, 2), (3.0, 3)]);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let mut acc = TopKAccumulator::new(1, 2);
        acc.update(0, 1.0, 7);
        acc.update(0, 1.0, 3);
        acc.update(0, 1.0, 5);
        assert_eq!(acc.into_rows()[0], vec![(1.0, 3), (1.0, 5)]);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let pairs = [(2.0, 1), (2.0, 0), (1.0, 9), (3.0, 4), (1.0, 2)];
        let mut whole = TopKAccumulator::new(1, 3);
        for &(d, j) in &pairs {
            whole.update(0, d, j);
        }

        let mut left = TopKAccumulator::new(1, 3);
        let mut right = TopKAccumulator::new(1, 3);
        for &(d, j) in &pairs[..2] {
            left.update(0, d, j);
        }
        for &(d, j) in &pairs[2..] {
            right.update(0, d, j);
        }
        right.merge(&left);
        assert_eq!(right.into_rows(), whole.into_rows());
    }

    #[test]
    fn test_partial_rows() {
        let mut acc = TopKAccumulator::new(2, 3);
        acc.update(1, 4.0, 0);
        let rows = acc.into_rows();
        assert!(rows[0].is_empty());
        assert_eq!(rows[1], vec![(4.0, 0)]);
    }
}
