use proptest::prelude::*;
use tsannot_core::test_data::TestSeries;
use tsannot_core::{DynAnnotator, FittedAnnotator, Series, SeriesAnnotator};
use tsannot_hmm::{
    CategoricalHmm, CovarianceKind, EmissionKind, GaussianHmm, Hmm, HmmParameters, PoissonHmm,
};

#[test]
fn test_constant_halves_give_one_change_point() {
    for covariance in [
        CovarianceKind::Diagonal,
        CovarianceKind::Full,
        CovarianceKind::Spherical,
    ] {
        let mut values = vec![-3.0; 40];
        values.extend(vec![4.0; 40]);
        let series = Series::univariate(values).unwrap();
        let states = GaussianHmm::new(2, covariance)
            .unwrap()
            .fit_annotate(&series)
            .unwrap();
        assert_eq!(states.breakpoints().as_slice(), &[40], "{covariance:?}");
    }
}

#[test]
fn test_multivariate_regimes() {
    let series = TestSeries::piecewise_multivariate(
        &[vec![0.0, 0.0], vec![5.0, -5.0], vec![0.0, 0.0]],
        50,
        0.5,
        17,
    );
    let fitted = GaussianHmm::new(2, CovarianceKind::Full)
        .unwrap()
        .fit(&series)
        .unwrap();
    let states = fitted.annotate(&series).unwrap();
    assert_eq!(states.breakpoints().as_slice(), &[50, 100]);
    assert_eq!(states.labels()[0], states.labels()[149]);
}

#[test]
fn test_seed_makes_fits_reproducible() {
    let values = TestSeries::piecewise_constant(&[0.0, 2.0, 4.0], 40, 0.8, 5);
    let series = Series::univariate(values).unwrap();
    let hmm = Hmm::new(HmmParameters::new(3, EmissionKind::default()).with_seed(11)).unwrap();
    let a = hmm.fit(&series).unwrap();
    let b = hmm.fit(&series).unwrap();
    assert_eq!(a.model(), b.model());
    assert_eq!(a.report(), b.report());
}

#[test]
fn test_dyn_dispatch() {
    let counts = TestSeries::poisson_regimes(&[1.0, 12.0], 50, 2);
    let series = Series::univariate(counts).unwrap();
    let algorithms: Vec<Box<dyn DynAnnotator>> = vec![
        Box::new(PoissonHmm::new(2).unwrap()),
        Box::new(GaussianHmm::new(2, CovarianceKind::Diagonal).unwrap()),
        Box::new(CategoricalHmm::new(2, None).unwrap()),
    ];
    for algo in algorithms {
        let annotation = algo.fit_annotate_dyn(&series).unwrap();
        assert_eq!(annotation.kind(), "states", "{}", algo.name());
        assert!(annotation.breakpoints().is_some());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_transition_rows_sum_to_one(
        values in prop::collection::vec(-20.0f64..20.0, 12..60),
        n_states in 1usize..4,
    ) {
        let series = Series::univariate(values).unwrap();
        let hmm = GaussianHmm::new(n_states, CovarianceKind::Diagonal).unwrap();
        if let Ok(fitted) = hmm.fit(&series) {
            for row in fitted.transitions() {
                prop_assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn prop_predict_is_idempotent(values in prop::collection::vec(0u8..4, 20..50)) {
        let symbols: Vec<f64> = values.into_iter().map(f64::from).collect();
        let series = Series::univariate(symbols).unwrap();
        let fitted = CategoricalHmm::new(2, Some(4)).unwrap().fit(&series).unwrap();
        let first = fitted.predict(&series).unwrap();
        let second = fitted.predict(&series).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, fitted.annotate(&series).unwrap());
    }
}
