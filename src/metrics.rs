use crate::{checks::Checks, sink::JsonLinesSink};
use itertools::Itertools;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

/// One raw per-request record. Samples are append-only: virtual users send
/// them over a channel and never read them back, so no locking is needed in
/// user code. The collector aggregates them after the run.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSample {
    pub timestamp_ms: i64,
    pub scenario: String,
    pub mode: String,
    /// None when the request never produced a response.
    pub status: Option<u16>,
    pub duration_ms: f64,
    pub status_ok: bool,
    pub duration_ok: bool,
    /// Network error or non-2xx status.
    pub failed: bool,
}

impl RequestSample {
    /// Whether any check on this sample failed. Feeds the run-level
    /// `errors` rate, mirroring the per-response error counter scenarios
    /// keep alongside the built-in failure rate.
    pub fn errored(&self) -> bool {
        !(self.status_ok && self.duration_ok)
    }
}

/// Receives samples from all virtual users for the lifetime of the run and
/// optionally streams each one to a raw-record sink. Stops once every sender
/// has been dropped.
pub struct Collector {
    handle: JoinHandle<RunStats>,
}

impl Collector {
    pub fn start(mut sink: Option<JsonLinesSink>) -> (mpsc::UnboundedSender<RequestSample>, Self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RequestSample>();

        let handle = tokio::spawn(async move {
            let mut samples = vec![];
            while let Some(sample) = rx.recv().await {
                if let Some(sink) = sink.as_mut() {
                    if let Err(e) = sink.write(&sample) {
                        warn!("failed to write sample to output sink: {e}");
                    }
                }
                samples.push(sample);
            }

            if let Some(sink) = sink.as_mut() {
                if let Err(e) = sink.flush() {
                    warn!("failed to flush output sink: {e}");
                }
            }

            RunStats::new(samples)
        });

        (tx, Collector { handle })
    }

    /// Waits for the collector to drain. All senders must be dropped first
    /// or this will wait forever.
    pub async fn stop(self) -> anyhow::Result<RunStats> {
        let stats = self.handle.await?;
        Ok(stats)
    }
}

/// Aggregated view over all samples of a run. Every accessor returns `None`
/// on an empty sample set rather than panicking; thresholds treat that as a
/// vacuous pass reported as "no data".
#[derive(Debug)]
pub struct RunStats {
    samples: Vec<RequestSample>,
    sorted_durations_ms: Vec<f64>,
}

impl RunStats {
    pub fn new(samples: Vec<RequestSample>) -> Self {
        let sorted_durations_ms = samples
            .iter()
            .map(|sample| sample.duration_ms)
            .sorted_by(|a, b| a.total_cmp(b))
            .collect();

        RunStats {
            samples,
            sorted_durations_ms,
        }
    }

    pub fn samples(&self) -> &[RequestSample] {
        &self.samples
    }

    pub fn sample_count(&self) -> u64 {
        self.samples.len() as u64
    }

    /// Nearest-rank percentile of request duration, `0.0 < p <= 100.0`.
    pub fn duration_percentile(&self, p: f64) -> Option<f64> {
        if self.sorted_durations_ms.is_empty() {
            return None;
        }

        let n = self.sorted_durations_ms.len();
        let rank = ((p / 100.0) * n as f64).ceil() as usize;
        let idx = rank.clamp(1, n) - 1;
        Some(self.sorted_durations_ms[idx])
    }

    pub fn duration_avg(&self) -> Option<f64> {
        if self.sorted_durations_ms.is_empty() {
            return None;
        }
        let sum: f64 = self.sorted_durations_ms.iter().sum();
        Some(sum / self.sorted_durations_ms.len() as f64)
    }

    pub fn duration_max(&self) -> Option<f64> {
        self.sorted_durations_ms.last().copied()
    }

    /// Fraction of requests that failed outright (network error or non-2xx).
    pub fn failed_rate(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let failed = self.samples.iter().filter(|s| s.failed).count();
        Some(failed as f64 / self.samples.len() as f64)
    }

    /// Fraction of individual checks that passed across all samples.
    pub fn checks_rate(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let passed: u64 = self
            .samples
            .iter()
            .map(|s| s.status_ok as u64 + s.duration_ok as u64)
            .sum();
        Some(passed as f64 / (self.samples.len() as u64 * Checks::COUNT) as f64)
    }

    /// Fraction of samples with at least one failed check.
    pub fn errors_rate(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let errored = self.samples.iter().filter(|s| s.errored()).count();
        Some(errored as f64 / self.samples.len() as f64)
    }

    /// Per-scenario breakdown for the summary table, ordered by scenario
    /// name.
    pub fn by_scenario(&self) -> Vec<ScenarioStats> {
        let scenario_names = self
            .samples
            .iter()
            .map(|s| &s.scenario)
            .unique()
            .sorted()
            .collect::<Vec<_>>();

        scenario_names
            .into_iter()
            .map(|name| {
                let scoped = self
                    .samples
                    .iter()
                    .filter(|s| &s.scenario == name)
                    .cloned()
                    .collect::<Vec<_>>();
                let failed = scoped.iter().filter(|s| s.failed).count() as u64;
                let status_passes = scoped.iter().filter(|s| s.status_ok).count() as u64;
                let duration_passes = scoped.iter().filter(|s| s.duration_ok).count() as u64;
                let scoped_stats = RunStats::new(scoped);

                ScenarioStats {
                    scenario: name.clone(),
                    requests: scoped_stats.sample_count(),
                    p95_ms: scoped_stats.duration_percentile(95.0),
                    failed,
                    status_passes,
                    duration_passes,
                }
            })
            .collect()
    }
}

#[derive(Debug, PartialEq)]
pub struct ScenarioStats {
    pub scenario: String,
    pub requests: u64,
    pub p95_ms: Option<f64>,
    pub failed: u64,
    /// How many of this scenario's samples passed the status check.
    pub status_passes: u64,
    /// How many passed the response-time check.
    pub duration_passes: u64,
}
