use anyhow::{anyhow, bail};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// A single step in the load profile. The scheduler holds this stage for
/// `duration` and sizes the virtual-user pool towards `target`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct RampStage {
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    pub target: u64,
}

/// An ordered sequence of stages read left-to-right as a stepped
/// concurrency-over-time curve. Profiles typically start and end at zero,
/// e.g. quiet -> morning ramp -> lunchtime spike -> evening decline.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct RampProfile {
    pub stages: Vec<RampStage>,

    /// How long finished stages wait for in-flight iterations before
    /// aborting them. Never zero by default.
    #[serde(default = "default_grace_period")]
    #[serde(deserialize_with = "deserialize_duration")]
    pub grace_period: Duration,
}

fn default_grace_period() -> Duration {
    Duration::from_secs(30)
}

impl RampProfile {
    pub fn new(stages: Vec<RampStage>, grace_period: Duration) -> anyhow::Result<Self> {
        let profile = RampProfile {
            stages,
            grace_period,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stages.is_empty() {
            bail!("load profile must declare at least one stage");
        }
        Ok(())
    }

    /// Total scheduled duration of the run, i.e. the sum of all stage
    /// durations. The grace period is not included; it only applies after
    /// the final stage has elapsed.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|stage| stage.duration).sum()
    }

    /// The number of virtual users that should be active at offset `t` from
    /// the start of the run. Stage windows are half-open `[start, end)`, so
    /// a `t` landing exactly on a boundary belongs to the next stage. Beyond
    /// the last stage the target is zero.
    pub fn target_at(&self, t: Duration) -> u64 {
        let mut window_start = Duration::ZERO;
        for stage in self.stages.iter() {
            let window_end = window_start + stage.duration;
            if t >= window_start && t < window_end {
                return stage.target;
            }
            window_start = window_end;
        }
        0
    }

    pub fn peak_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|stage| stage.target)
            .max()
            .unwrap_or(0)
    }
}

/// Parses a human-friendly duration string, e.g. "30s", "1m", "2h".
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("duration string cannot be empty");
    }

    let unit = s
        .chars()
        .last()
        .ok_or_else(|| anyhow!("duration string cannot be empty"))?;
    let value = s[..s.len() - unit.len_utf8()]
        .parse::<u64>()
        .map_err(|_| anyhow!("invalid numeric value in duration: {}", s))?;

    match unit {
        's' => Ok(Duration::from_secs(value)),
        'm' => Ok(Duration::from_secs(value * 60)),
        'h' => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(anyhow!(
            "unknown duration unit in {}: use 's', 'm' or 'h'",
            s
        )),
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stress_profile() -> RampProfile {
        RampProfile {
            stages: vec![
                RampStage {
                    duration: Duration::from_secs(30),
                    target: 10,
                },
                RampStage {
                    duration: Duration::from_secs(60),
                    target: 50,
                },
                RampStage {
                    duration: Duration::from_secs(30),
                    target: 100,
                },
                RampStage {
                    duration: Duration::from_secs(60),
                    target: 200,
                },
                RampStage {
                    duration: Duration::from_secs(30),
                    target: 0,
                },
            ],
            grace_period: Duration::from_secs(30),
        }
    }

    #[test]
    fn total_duration_is_the_sum_of_stage_durations() {
        let profile = stress_profile();
        assert_eq!(profile.total_duration(), Duration::from_secs(210));
    }

    #[test]
    fn target_at_returns_the_target_of_the_containing_stage() {
        let profile = stress_profile();

        assert_eq!(profile.target_at(Duration::ZERO), 10);
        assert_eq!(profile.target_at(Duration::from_secs(29)), 10);
        assert_eq!(profile.target_at(Duration::from_secs(45)), 50);
        assert_eq!(profile.target_at(Duration::from_secs(100)), 100);
        assert_eq!(profile.target_at(Duration::from_secs(150)), 200);
        assert_eq!(profile.target_at(Duration::from_secs(200)), 0);
    }

    #[test]
    fn stage_boundaries_belong_to_the_next_stage() {
        let profile = stress_profile();

        assert_eq!(profile.target_at(Duration::from_secs(30)), 50);
        assert_eq!(profile.target_at(Duration::from_secs(90)), 100);
    }

    #[test]
    fn target_beyond_the_last_stage_is_zero() {
        let profile = stress_profile();

        assert_eq!(profile.target_at(Duration::from_secs(210)), 0);
        assert_eq!(profile.target_at(Duration::from_secs(1000)), 0);
    }

    #[test]
    fn peak_target_is_the_largest_stage_target() {
        assert_eq!(stress_profile().peak_target(), 200);
    }

    #[test]
    fn profile_requires_at_least_one_stage() {
        let profile = RampProfile::new(vec![], Duration::from_secs(30));
        assert!(profile.is_err());
    }

    #[test]
    fn can_parse_duration_strings() -> anyhow::Result<()> {
        assert_eq!(parse_duration("30s")?, Duration::from_secs(30));
        assert_eq!(parse_duration("1m")?, Duration::from_secs(60));
        assert_eq!(parse_duration("2h")?, Duration::from_secs(7200));
        Ok(())
    }

    #[test]
    fn malformed_duration_strings_are_rejected() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn multibyte_duration_units_are_an_error_not_a_panic() {
        assert!(parse_duration("30µ").is_err());
        assert!(parse_duration("µ").is_err());
        assert!(parse_duration("1時").is_err());
    }

    #[test]
    fn can_deserialize_a_profile_from_toml() -> anyhow::Result<()> {
        let profile: RampProfile = toml::from_str(
            r#"
            grace_period = "10s"
            stages = [
              { duration = "30s", target = 10 },
              { duration = "1m", target = 50 },
            ]
            "#,
        )?;

        assert_eq!(profile.stages.len(), 2);
        assert_eq!(profile.grace_period, Duration::from_secs(10));
        assert_eq!(profile.total_duration(), Duration::from_secs(90));
        Ok(())
    }

    #[test]
    fn grace_period_defaults_to_thirty_seconds() -> anyhow::Result<()> {
        let profile: RampProfile = toml::from_str(
            r#"
            stages = [{ duration = "30s", target = 10 }]
            "#,
        )?;

        assert_eq!(profile.grace_period, Duration::from_secs(30));
        Ok(())
    }
}
