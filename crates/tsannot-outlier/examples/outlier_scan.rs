//! Score a noisy series with STRAY and with an external z-score detector

use tracing_subscriber::EnvFilter;
use tsannot_core::test_data::TestSeries;
use tsannot_core::{FittedAnnotator, Series, SeriesAnnotator};
use tsannot_outlier::{
    AdapterLabels, ExternalScorer, FlagRule, OutputFormat, ScorerAdapter, Stray, StrayParameters,
};

#[derive(Debug, Clone, Default)]
struct ZScore {
    mean: f64,
    sd: f64,
}

impl ExternalScorer for ZScore {
    fn fit(&mut self, rows: &[Vec<f64>]) -> anyhow::Result<()> {
        anyhow::ensure!(!rows.is_empty(), "no training rows");
        let n = rows.len() as f64;
        self.mean = rows.iter().map(|r| r[0]).sum::<f64>() / n;
        let var = rows.iter().map(|r| (r[0] - self.mean).powi(2)).sum::<f64>() / n;
        self.sd = var.sqrt().max(f64::EPSILON);
        Ok(())
    }

    fn score(&self, rows: &[Vec<f64>]) -> anyhow::Result<Vec<f64>> {
        Ok(rows.iter().map(|r| ((r[0] - self.mean) / self.sd).abs()).collect())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let series = Series::univariate(TestSeries::with_outliers(200, &[30, 31, 150], 6.0, 42))?;

    let stray = Stray::new(StrayParameters::default())?;
    let result = stray.score(&series)?;
    println!(
        "STRAY (k = {}, threshold = {:.3}): {:?}",
        result.k_used,
        result.scores.threshold(),
        result.scores.flagged_indices()
    );

    let adapter = ScorerAdapter::new(ZScore::default(), FlagRule::Contamination(0.02))?;
    let fitted = adapter.fit(&series)?;
    println!(
        "z-score (threshold = {:.3}): {:?}",
        fitted.threshold(),
        fitted.annotate(&series)?.flagged_indices()
    );
    println!(
        "sparse scores: {:?}",
        fitted.transform(&series, OutputFormat::Sparse, AdapterLabels::Score)?
    );
    Ok(())
}
