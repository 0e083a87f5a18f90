//! Run every segmenter on the same three-regime series

use tracing_subscriber::EnvFilter;
use tsannot_core::test_data::TestSeries;
use tsannot_core::{ChangePointCount, DynAnnotator, Series};
use tsannot_segment::{
    ClaspParameters, ClaspSegmenter, EAgglo, EaggloParameters, GgsParameters,
    GreedyGaussianSegmenter, IgtsParameters, InformationGainSegmenter, KernelCpd,
    KernelCpdParameters,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let values = TestSeries::piecewise_constant(&[0.0, 4.0, -2.0], 100, 0.8, 42);
    let series = Series::univariate(values)?;
    let two = ChangePointCount::Fixed(2);

    let algorithms: Vec<Box<dyn DynAnnotator>> = vec![
        Box::new(ClaspSegmenter::new(
            ClaspParameters::default().with_n_change_points(two),
        )?),
        Box::new(EAgglo::new(
            EaggloParameters::default()
                .with_initial_block_size(5)
                .with_n_change_points(two),
        )?),
        Box::new(GreedyGaussianSegmenter::new(GgsParameters::default().with_k_max(2))?),
        Box::new(InformationGainSegmenter::new(IgtsParameters::default().with_k_max(2))?),
        Box::new(KernelCpd::new(KernelCpdParameters::default().with_n_change_points(two))?),
    ];

    println!("true breakpoints: [100, 200]");
    for algo in &algorithms {
        let fitted = algo.fit_dyn(&series)?;
        let annotation = fitted.annotate_dyn(&series)?;
        if let Some(breaks) = annotation.breakpoints() {
            println!("{:>10}: {} ({:?})", algo.name(), breaks, fitted.fit_status());
        }
    }
    Ok(())
}
