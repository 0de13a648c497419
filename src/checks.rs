use anyhow::bail;
use std::time::Duration;

pub const SUCCESS_STATUS: u16 = 200;

/// The observable parts of a completed HTTP exchange that checks assert on.
/// Requests that never produced a response (connection refused, reset, etc)
/// have no `ResponseInfo` and fail every check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseInfo {
    pub status: u16,
    pub duration: Duration,
}

/// Per-request assertions for a single scenario: status must be the success
/// code and the round trip must beat the scenario's duration ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct Checks {
    scenario_name: String,
    max_duration_ms: u64,
}

/// The outcome of evaluating both checks against one response. A fixed-shape
/// record rather than a label-keyed map; labels are formatted separately for
/// reporting via [`Checks::labels`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckOutcome {
    pub status_ok: bool,
    pub duration_ok: bool,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.status_ok && self.duration_ok
    }

    /// Number of individual checks that passed, out of [`Checks::COUNT`].
    pub fn pass_count(&self) -> u64 {
        self.status_ok as u64 + self.duration_ok as u64
    }

    pub fn failed() -> Self {
        CheckOutcome {
            status_ok: false,
            duration_ok: false,
        }
    }
}

/// Human-readable labels for the two checks, prefixed with the scenario name
/// so checks stay distinguishable across scenarios sharing a run.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckLabels {
    pub status: String,
    pub duration: String,
}

impl CheckLabels {
    pub fn new(scenario_name: &str) -> CheckLabels {
        CheckLabels {
            status: format!("{}: status is 200", scenario_name),
            duration: format!("{}: response time OK", scenario_name),
        }
    }

    pub fn as_array(&self) -> [&str; 2] {
        [&self.status, &self.duration]
    }
}

impl Checks {
    /// How many assertions a single evaluation produces.
    pub const COUNT: u64 = 2;

    pub fn build(scenario_name: &str, max_duration_ms: u64) -> anyhow::Result<Checks> {
        if scenario_name.trim().is_empty() {
            bail!("check scenario name cannot be empty");
        }
        if max_duration_ms == 0 {
            bail!(
                "max duration for scenario {} must be a positive number of milliseconds",
                scenario_name
            );
        }

        Ok(Checks {
            scenario_name: scenario_name.to_string(),
            max_duration_ms,
        })
    }

    /// Evaluates both checks against a completed response. A missing
    /// response fails closed: every check is false, nothing panics.
    pub fn evaluate(&self, response: Option<&ResponseInfo>) -> CheckOutcome {
        match response {
            Some(response) => CheckOutcome {
                status_ok: response.status == SUCCESS_STATUS,
                duration_ok: response.duration.as_millis() < self.max_duration_ms as u128,
            },
            None => CheckOutcome::failed(),
        }
    }

    pub fn labels(&self) -> CheckLabels {
        CheckLabels::new(&self.scenario_name)
    }
}
