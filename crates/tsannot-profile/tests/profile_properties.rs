use approx::assert_relative_eq;
use proptest::prelude::*;
use tsannot_core::test_data::TestSeries;
use tsannot_core::Series;
use tsannot_profile::{Metric, ProfileConfig, ProfileEngine};

fn reversed(values: &[f64]) -> Vec<f64> {
    values.iter().rev().copied().collect()
}

#[test]
fn test_time_reversal_symmetry_both_metrics() {
    let values = TestSeries::frequency_shift(&[7.0, 13.0], 60, 3);
    let forward = Series::univariate(values.clone()).unwrap();
    let backward = Series::univariate(reversed(&values)).unwrap();

    for metric in [Metric::ZNormalizedEuclidean, Metric::AbsoluteEuclidean] {
        let engine = ProfileEngine::new(ProfileConfig::new(10).with_metric(metric));
        let f = engine.compute(&forward).unwrap();
        let b = engine.compute(&backward).unwrap();
        let n_subs = f.len();
        for i in 0..n_subs {
            assert_relative_eq!(
                f.distances()[i],
                b.distances()[n_subs - 1 - i],
                epsilon = 1e-6,
                max_relative = 1e-6
            );
        }
    }
}

#[test]
fn test_repeated_motif_has_zero_distance() {
    let motif = [0.0, 2.0, 5.0, 1.0, -3.0];
    let mut values = TestSeries::piecewise_constant(&[0.0], 40, 0.5, 9);
    values[5..10].copy_from_slice(&motif);
    values[30..35].copy_from_slice(&motif);
    let series = Series::univariate(values).unwrap();
    let profile = ProfileEngine::new(ProfileConfig::new(5).with_metric(Metric::AbsoluteEuclidean))
        .compute(&series)
        .unwrap();
    assert!(profile.distances()[5] < 1e-6);
    assert_eq!(profile.indices()[5], Some(30));
    assert_eq!(profile.indices()[30], Some(5));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_reversal_symmetry(values in prop::collection::vec(-100.0f64..100.0, 12..60), m in 2usize..6) {
        prop_assume!(2 * m < values.len());
        let engine = ProfileEngine::new(ProfileConfig::new(m).with_metric(Metric::AbsoluteEuclidean));
        let f = engine.compute(&Series::univariate(values.clone()).unwrap()).unwrap();
        let b = engine.compute(&Series::univariate(reversed(&values)).unwrap()).unwrap();
        let n_subs = f.len();
        for i in 0..n_subs {
            let (x, y) = (f.distances()[i], b.distances()[n_subs - 1 - i]);
            if x.is_finite() || y.is_finite() {
                prop_assert!((x - y).abs() <= 1e-6 * (1.0 + x.abs()));
            }
        }
    }

    #[test]
    fn prop_neighbours_outside_exclusion_zone(values in prop::collection::vec(-10.0f64..10.0, 20..80), k in 1usize..5) {
        let engine = ProfileEngine::new(ProfileConfig::new(4));
        let knn = engine.compute_knn(&Series::univariate(values).unwrap(), k).unwrap();
        for i in 0..knn.len() {
            let row = knn.neighbors(i);
            prop_assert!(row.len() <= k);
            for &(d, j) in row {
                prop_assert!(i.abs_diff(j) > knn.exclusion_zone());
                prop_assert!(d >= 0.0);
            }
        }
    }
}
