//! Wait-for-stability polling with exponential backoff

use mothball_core::{Result, TrickError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule for stability polling
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay_ms: 2000,
            max_delay_ms: 30000,
            multiplier: 1.5,
        }
    }
}

impl WaitConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        delay.min(self.max_delay_ms as f64) as u64
    }
}

/// Poll `probe` until it reports the resource stable
///
/// The probe only observes; failed mutating calls are never retried here.
/// A probe error propagates immediately, exhausting the schedule yields
/// [`TrickError::StabilityTimeout`].
pub async fn wait_until<F, Fut>(resource: &str, config: &WaitConfig, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 0..config.max_attempts {
        if probe().await? {
            return Ok(());
        }
        if attempt + 1 < config.max_attempts {
            sleep(Duration::from_millis(config.delay_for_attempt(attempt))).await;
        }
    }

    Err(TrickError::StabilityTimeout {
        resource: resource.to_string(),
        attempts: config.max_attempts,
    })
}
