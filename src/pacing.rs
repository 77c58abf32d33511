use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Shortest pause between two page fetches, in seconds.
pub const MIN_SLEEP_SECS: f64 = 1.0;

/// Normally distributed pause between requests.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub mean_secs: f64,
    pub sigma_secs: f64,
}

impl Pacing {
    pub fn new(mean_secs: f64, sigma_secs: f64) -> Self {
        Self {
            mean_secs,
            sigma_secs,
        }
    }

    /// Draw one pause, never shorter than `MIN_SLEEP_SECS`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = match Normal::new(self.mean_secs, self.sigma_secs) {
            Ok(normal) => normal.sample(rng),
            Err(_) => self.mean_secs,
        };
        // f64::max ignores a NaN operand.
        Duration::from_secs_f64(secs.max(MIN_SLEEP_SECS).min(f64::from(u32::MAX)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sample_is_never_below_floor() {
        let mut rng = StdRng::seed_from_u64(7);
        for (mean, sigma) in [(1.0, 5.0), (-20.0, 1.0), (0.0, 0.0), (3.0, 0.5)] {
            let pacing = Pacing::new(mean, sigma);
            for _ in 0..500 {
                assert!(pacing.sample(&mut rng) >= Duration::from_secs(1));
            }
        }
    }

    #[test]
    fn zero_spread_returns_mean() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            Pacing::new(4.5, 0.0).sample(&mut rng),
            Duration::from_secs_f64(4.5)
        );
    }

    #[test]
    fn invalid_parameters_fall_back_to_floor() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            Pacing::new(f64::NAN, 2.0).sample(&mut rng),
            Duration::from_secs(1)
        );
        assert_eq!(
            Pacing::new(-3.0, -1.0).sample(&mut rng),
            Duration::from_secs(1)
        );
    }
}
