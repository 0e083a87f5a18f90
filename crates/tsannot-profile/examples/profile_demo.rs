//! Nearest-neighbour profile of a series with a repeated pattern

use tracing_subscriber::EnvFilter;
use tsannot_core::test_data::TestSeries;
use tsannot_core::Series;
use tsannot_profile::{Metric, ProfileConfig, ProfileEngine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let values = TestSeries::frequency_shift(&[10.0, 25.0], 200, 1);
    let series = Series::univariate(values)?;

    for metric in [Metric::ZNormalizedEuclidean, Metric::AbsoluteEuclidean] {
        let engine = ProfileEngine::new(ProfileConfig::new(20).with_metric(metric));
        let profile = engine.compute(&series)?;
        let (worst, dist) = profile
            .distances()
            .iter()
            .enumerate()
            .fold((0, 0.0f64), |acc, (i, &d)| if d > acc.1 { (i, d) } else { acc });
        println!("{metric:?}: {} subsequences, most unusual at {worst} (distance {dist:.3})", profile.len());
    }
    Ok(())
}
