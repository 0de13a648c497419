use crate::metrics::RunStats;
use anyhow::{anyhow, bail};
use serde::{Deserialize, Deserializer};
use std::{fmt, str::FromStr};

/// Statistical aggregator a threshold asserts on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    /// Percentile of request duration, e.g. `p(95)`.
    Percentile(f64),
    Avg,
    Max,
    /// Pass/fail fraction of a rate metric.
    Rate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Lt,
    Gt,
}

/// A single parsed threshold assertion, e.g. `p(95)<500` or `rate<0.01`.
/// Duration bounds are milliseconds, rate bounds are fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    source: String,
    pub aggregate: Aggregate,
    pub op: Op,
    pub bound: f64,
}

impl ThresholdExpr {
    pub fn holds_for(&self, observed: f64) -> bool {
        match self.op {
            Op::Lt => observed < self.bound,
            Op::Gt => observed > self.bound,
        }
    }

    fn observe_duration(&self, stats: &RunStats) -> Option<f64> {
        match self.aggregate {
            Aggregate::Percentile(p) => stats.duration_percentile(p),
            Aggregate::Avg => stats.duration_avg(),
            Aggregate::Max => stats.duration_max(),
            Aggregate::Rate => None,
        }
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl FromStr for ThresholdExpr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let source = s.split_whitespace().collect::<String>();

        let (op, op_idx) = if let Some(idx) = source.find('<') {
            (Op::Lt, idx)
        } else if let Some(idx) = source.find('>') {
            (Op::Gt, idx)
        } else {
            bail!("threshold expression {s} has no comparison operator");
        };

        let (lhs, rhs) = source.split_at(op_idx);
        let bound = rhs[1..]
            .parse::<f64>()
            .map_err(|_| anyhow!("threshold expression {s} has a non-numeric bound"))?;

        let aggregate = match lhs {
            "avg" => Aggregate::Avg,
            "max" => Aggregate::Max,
            "rate" => Aggregate::Rate,
            _ => {
                let p = lhs
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| anyhow!("unknown aggregator in threshold expression {s}"))?
                    .parse::<f64>()
                    .map_err(|_| anyhow!("non-numeric percentile in threshold expression {s}"))?;
                if !(0.0..=100.0).contains(&p) || p == 0.0 {
                    bail!("percentile in threshold expression {s} must be in (0, 100]");
                }
                Aggregate::Percentile(p)
            }
        };

        Ok(ThresholdExpr {
            source,
            aggregate,
            op,
            bound,
        })
    }
}

impl<'de> Deserialize<'de> for ThresholdExpr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Declarative pass/fail boundaries for the whole run, keyed by metric.
/// All assertions for a metric must hold simultaneously for the run to
/// pass. A metric with zero observations passes vacuously and is surfaced
/// as "no data" in the summary.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ThresholdPolicy {
    /// Request duration assertions (percentile/avg/max ceilings, ms).
    #[serde(default)]
    pub http_req_duration: Vec<ThresholdExpr>,

    /// Failure-rate ceiling, e.g. `rate<0.01`.
    #[serde(default)]
    pub http_req_failed: Vec<ThresholdExpr>,

    /// Check pass-rate floor, e.g. `rate>0.99`.
    #[serde(default)]
    pub checks: Vec<ThresholdExpr>,

    /// Ceiling on the custom per-response error rate, e.g. `rate<0.05`.
    #[serde(default)]
    pub errors: Vec<ThresholdExpr>,
}

impl ThresholdPolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        for expr in &self.http_req_duration {
            if expr.aggregate == Aggregate::Rate {
                bail!("http_req_duration thresholds must use p(..), avg or max, got {expr}");
            }
        }
        for (metric, exprs) in [
            ("http_req_failed", &self.http_req_failed),
            ("checks", &self.checks),
            ("errors", &self.errors),
        ] {
            for expr in exprs {
                if expr.aggregate != Aggregate::Rate {
                    bail!("{metric} thresholds must use rate, got {expr}");
                }
                if !(0.0..=1.0).contains(&expr.bound) {
                    bail!("{metric} threshold bound must be a fraction in [0, 1], got {expr}");
                }
            }
        }
        Ok(())
    }

    /// Evaluates every assertion against the aggregated run stats.
    pub fn evaluate(&self, stats: &RunStats) -> Vec<MetricVerdict> {
        let mut verdicts = vec![];

        for expr in &self.http_req_duration {
            verdicts.push(MetricVerdict::new(
                "http_req_duration",
                expr,
                expr.observe_duration(stats),
            ));
        }
        for expr in &self.http_req_failed {
            verdicts.push(MetricVerdict::new(
                "http_req_failed",
                expr,
                stats.failed_rate(),
            ));
        }
        for expr in &self.checks {
            verdicts.push(MetricVerdict::new("checks", expr, stats.checks_rate()));
        }
        for expr in &self.errors {
            verdicts.push(MetricVerdict::new("errors", expr, stats.errors_rate()));
        }

        verdicts
    }
}

/// The outcome of one threshold assertion at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricVerdict {
    pub metric: String,
    pub expr: String,
    /// None when the metric had no observations during the run.
    pub observed: Option<f64>,
    pub passed: bool,
}

impl MetricVerdict {
    fn new(metric: &str, expr: &ThresholdExpr, observed: Option<f64>) -> Self {
        MetricVerdict {
            metric: metric.to_string(),
            expr: expr.to_string(),
            // vacuous pass on an empty sample set
            passed: observed.map(|v| expr.holds_for(v)).unwrap_or(true),
            observed,
        }
    }
}
