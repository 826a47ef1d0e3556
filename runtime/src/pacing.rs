//! Rate governor: randomized pause between work items.
//!
//! Paces unconditionally, regardless of whether the previous item succeeded,
//! so the request rate carries no fixed signature. Retry backoff is handled
//! by the navigation layer, not here.

use crate::error::{CrawlError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Draws delays uniformly from an inclusive range.
#[derive(Debug)]
pub struct RateGovernor {
    min_ms: u64,
    max_ms: u64,
    rng: StdRng,
}

impl RateGovernor {
    /// Create a governor over `[min, max]`.
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    /// Deterministic governor for tests and reproducible runs.
    pub fn seeded(min: Duration, max: Duration, seed: u64) -> Result<Self> {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min: Duration, max: Duration, rng: StdRng) -> Result<Self> {
        let (min_ms, max_ms) = (min.as_millis() as u64, max.as_millis() as u64);
        if min_ms > max_ms {
            return Err(CrawlError::Configuration(format!(
                "pacing range is inverted: {min_ms} ms > {max_ms} ms"
            )));
        }
        Ok(Self { min_ms, max_ms, rng })
    }

    /// Delay before the next unit of work.
    pub fn next_delay(&mut self) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(self.rng.gen_range(self.min_ms..=self.max_ms))
    }

    /// Sleep for the next delay. Returns `false` if cancelled while waiting.
    pub async fn pace(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.next_delay();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tracing::info!("sleeping {:.1}s before next target", delay.as_secs_f64());
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
