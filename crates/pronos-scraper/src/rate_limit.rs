//! Request pacing with jitter.
//!
//! One [`RateLimiter`] is owned by the orchestrator and lent to every
//! component that issues requests, so the "last request" timestamp is plain
//! instance state rather than anything process-wide.

use std::time::Duration;

use pronos_core::ScrapingConfig;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    chunk_break: Option<(u32, Duration)>,
    last_return: Option<Instant>,
    turns: u64,
}

impl RateLimiter {
    /// `min_delay` is clamped to `max_delay` if the two are reversed.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay: min_delay.min(max_delay),
            max_delay,
            chunk_break: None,
            last_return: None,
            turns: 0,
        }
    }

    /// Adds an extra `pause` after every `every` turns.
    #[must_use]
    pub fn with_chunk_break(mut self, every: u32, pause: Duration) -> Self {
        if every > 0 {
            self.chunk_break = Some((every, pause));
        }
        self
    }

    #[must_use]
    pub fn from_config(config: &ScrapingConfig) -> Self {
        let limiter = Self::new(config.min_delay(), config.max_delay());
        match config.chunk_break() {
            Some((every, pause)) => limiter.with_chunk_break(every, pause),
            None => limiter,
        }
    }

    /// Turns completed so far.
    #[must_use]
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Draws a spacing uniformly from `[min_delay, max_delay]`.
    #[must_use]
    pub fn draw_delay(&self) -> Duration {
        let spread = self.max_delay.saturating_sub(self.min_delay);
        self.min_delay + spread.mul_f64(rand::random::<f64>())
    }

    /// Waits until a freshly drawn delay has elapsed since the previous call
    /// returned. The first call returns immediately. Never fails.
    pub async fn await_turn(&mut self) {
        if let Some(last) = self.last_return {
            let delay = self.draw_delay();
            tracing::debug!(delay = ?delay, "pacing request");
            tokio::time::sleep_until(last + delay).await;

            if let Some((every, pause)) = self.chunk_break {
                if self.turns % u64::from(every) == 0 {
                    tracing::info!(
                        turns = self.turns,
                        pause_secs = pause.as_secs_f64(),
                        "chunk break"
                    );
                    tokio::time::sleep(pause).await;
                }
            }
        }
        self.turns += 1;
        self.last_return = Some(Instant::now());
    }
}
