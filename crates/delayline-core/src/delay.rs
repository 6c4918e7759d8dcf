//! Randomized delay sampling.
//!
//! When randomization is enabled, the server draws one delay per direction
//! per accepted connection instead of applying the configured value
//! directly. The draw multiplies the configured duration by a log-normal
//! factor, so the configured value is the median of the resulting
//! distribution: half of all sessions see less delay, half see more, with a
//! long upper tail.

use rand::Rng;
use rand_distr::{Distribution, LogNormal};
use std::time::Duration;

/// Draws per-session delay values from a log-normal distribution.
#[derive(Debug, Clone)]
pub struct DelaySampler {
    factor: LogNormal<f64>,
}

impl DelaySampler {
    /// Creates a sampler with the location-0, scale-1 log-normal law.
    #[must_use]
    pub fn new() -> Self {
        // Scale 1.0 is strictly positive, so construction cannot fail.
        let factor = LogNormal::new(0.0, 1.0).expect("valid log-normal parameters");
        Self { factor }
    }

    /// Samples one delay with `median` as the distribution's median.
    ///
    /// A zero median always yields a zero delay.
    #[must_use]
    pub fn sample(&self, median: Duration) -> Duration {
        self.sample_with(&mut rand::thread_rng(), median)
    }

    /// Samples one delay using the provided RNG.
    ///
    /// Extreme draws saturate at the representable range instead of
    /// overflowing.
    #[must_use]
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R, median: Duration) -> Duration {
        let scaled = median.as_nanos() as f64 * self.factor.sample(rng);
        Duration::from_nanos(scaled as u64)
    }
}

impl Default for DelaySampler {
    fn default() -> Self {
        Self::new()
    }
}
