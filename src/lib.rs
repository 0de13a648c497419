pub mod checks;
pub mod clap_args;
pub mod config;
pub mod metrics;
pub mod pacing;
pub mod profile;
pub mod runner;
pub mod sink;
pub mod summary;
pub mod thresholds;

use colored::Colorize;
use config::Config;
use metrics::{Collector, RunStats};
use sink::JsonLinesSink;
use std::path::Path;
use thresholds::MetricVerdict;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything a finished run produced: the aggregated stats, one verdict per
/// threshold assertion, and the run id raw records were tagged with.
pub struct RunReport {
    pub run_id: String,
    pub stats: RunStats,
    pub verdicts: Vec<MetricVerdict>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }
}

/// Executes one load-test run end to end: drive the ramp profile against the
/// target, collect samples, evaluate thresholds and print the summary.
///
/// # Arguments
///
/// * config - The validated run configuration.
/// * out - Optional path for raw per-request records (JSON lines).
/// * cancel - Cancelling this token ends the run early; virtual users drain
///   gracefully within the profile's grace period.
pub async fn run(
    config: &Config,
    out: Option<&Path>,
    cancel: CancellationToken,
) -> anyhow::Result<RunReport> {
    let run_id = nanoid::nanoid!(5, &nanoid::alphabet::SAFE);
    println!(
        "> starting run {} against {} ({} mode)",
        run_id.green(),
        config.effective_base_url(),
        config.target.mode
    );

    let sink = match out {
        Some(path) => {
            info!("writing raw request records to {}", path.display());
            Some(JsonLinesSink::create(path)?)
        }
        None => None,
    };

    let client = reqwest::Client::new();
    let (tx, collector) = Collector::start(sink);

    runner::drive(config, &client, tx, cancel).await?;

    let stats = collector.stop().await?;
    let verdicts = config.thresholds.evaluate(&stats);
    summary::print(&run_id, &config.target.mode.to_string(), &stats, &verdicts);

    Ok(RunReport {
        run_id,
        stats,
        verdicts,
    })
}
