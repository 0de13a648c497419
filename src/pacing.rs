use anyhow::bail;
use rand::Rng;
use std::time::Duration;

/// Randomized think-time between a virtual user's successive requests.
/// Uniform pacing keeps simulated users out of lock-step so the target sees
/// contention closer to real traffic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    min_secs: f64,
    max_secs: f64,
}

impl Pacing {
    pub fn new(min_secs: f64, max_secs: f64) -> anyhow::Result<Pacing> {
        if !min_secs.is_finite() || !max_secs.is_finite() {
            bail!("pacing bounds must be finite numbers");
        }
        if min_secs < 0.0 || max_secs < 0.0 {
            bail!("pacing bounds must be non-negative");
        }
        if min_secs > max_secs {
            bail!(
                "pacing min ({min_secs}s) must not be greater than max ({max_secs}s)"
            );
        }

        Ok(Pacing { min_secs, max_secs })
    }

    /// Draws a pause duration uniformly from `[min_secs, max_secs)`.
    pub fn sample(&self) -> Duration {
        let secs = if self.min_secs == self.max_secs {
            self.min_secs
        } else {
            rand::thread_rng().gen_range(self.min_secs..self.max_secs)
        };
        Duration::from_secs_f64(secs)
    }

    /// Suspends the calling virtual-user iteration for a sampled pause.
    pub async fn pause(&self) {
        tokio::time::sleep(self.sample()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        assert!(Pacing::new(3.0, 1.0).is_err());
    }

    #[test]
    fn rejects_negative_bounds() {
        assert!(Pacing::new(-1.0, 2.0).is_err());
        assert!(Pacing::new(-2.0, -1.0).is_err());
    }

    #[test]
    fn rejects_non_finite_bounds() {
        assert!(Pacing::new(f64::NAN, 2.0).is_err());
        assert!(Pacing::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn samples_stay_within_the_configured_range() -> anyhow::Result<()> {
        let pacing = Pacing::new(1.0, 3.0)?;

        for _ in 0..1000 {
            let pause = pacing.sample().as_secs_f64();
            assert!(pause >= 1.0);
            assert!(pause < 3.0);
        }
        Ok(())
    }

    #[test]
    fn samples_are_spread_across_the_range() -> anyhow::Result<()> {
        // split [1, 3) into 4 buckets; a uniform draw should land in each
        // well away from lock-step clustering at the bounds
        let pacing = Pacing::new(1.0, 3.0)?;
        let mut buckets = [0u32; 4];

        for _ in 0..1000 {
            let pause = pacing.sample().as_secs_f64();
            let bucket = (((pause - 1.0) / 2.0) * 4.0) as usize;
            buckets[bucket.min(3)] += 1;
        }

        for count in buckets {
            assert!(count > 100, "bucket underfilled: {:?}", buckets);
        }
        Ok(())
    }

    #[test]
    fn equal_bounds_produce_a_fixed_pause() -> anyhow::Result<()> {
        let pacing = Pacing::new(2.0, 2.0)?;
        assert_eq!(pacing.sample(), Duration::from_secs(2));
        Ok(())
    }

    #[test]
    fn zero_bounds_produce_no_pause() -> anyhow::Result<()> {
        let pacing = Pacing::new(0.0, 0.0)?;
        assert_eq!(pacing.sample(), Duration::ZERO);
        Ok(())
    }
}
