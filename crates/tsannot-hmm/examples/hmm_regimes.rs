//! Fit Gaussian and Poisson HMMs to regime-switching data and decode a
//! fixed-parameter model

use tracing_subscriber::EnvFilter;
use tsannot_core::test_data::TestSeries;
use tsannot_core::{FittedAnnotator, Series, SeriesAnnotator};
use tsannot_hmm::{CovarianceKind, Emission, FixedHmm, GaussianHmm, PoissonHmm};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let values = TestSeries::piecewise_constant(&[0.0, 3.0, 0.0, 3.0], 75, 0.9, 7);
    let series = Series::univariate(values)?;
    let fitted = GaussianHmm::new(2, CovarianceKind::Diagonal)?.fit(&series)?;
    let states = fitted.annotate(&series)?;
    println!("Gaussian HMM ({:?})", fitted.status());
    println!("  change points: {}", states.breakpoints());
    println!("  transitions:   {:?}", fitted.transitions());
    println!(
        "  EM iterations: {} (log-likelihood {:.2})",
        fitted.report().iterations,
        fitted.report().final_log_likelihood().unwrap_or(f64::NAN)
    );

    let counts = Series::univariate(TestSeries::poisson_regimes(&[1.5, 9.0, 3.0], 80, 3))?;
    let fitted = PoissonHmm::new(3)?.fit(&counts)?;
    if let Emission::Poisson(p) = fitted.emission() {
        println!("Poisson HMM rates: {:?}", p.rates());
    }
    println!("  change points: {}", fitted.annotate(&counts)?.breakpoints());

    let fixed = FixedHmm::gaussian(
        &[3.5, -5.0],
        &[0.25, 0.25],
        vec![vec![0.25, 0.75], vec![0.666, 0.333]],
        None,
    )?;
    let obs = Series::univariate(vec![3.7, 3.2, 3.4, 3.6, -5.1, -5.2, -4.9])?;
    let path = fixed.decode(&obs)?;
    println!("Fixed HMM path: {:?} (log p = {:.2})", path.labels, path.log_prob);
    Ok(())
}
