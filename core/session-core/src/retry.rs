//! Bounded retry timer for a single logical fetch.
//!
//! The scheduler only counts attempts and owns the pending timer. Whether a
//! failure deserves another attempt is the caller's decision.

use std::time::Duration;

use tokio::task::JoinHandle;

pub struct RetryScheduler {
    max_retries: u32,
    delays: Vec<Duration>,
    attempts: u32,
    pending: Option<JoinHandle<()>>,
}

impl RetryScheduler {
    pub fn new(max_retries: u32, delays: Vec<Duration>) -> Self {
        RetryScheduler {
            max_retries,
            delays,
            attempts: 0,
            pending: None,
        }
    }

    /// Retries scheduled since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_retries
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Delay for the next retry; the last delay repeats once the list runs out.
    pub fn next_delay(&self) -> Duration {
        let index = (self.attempts as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(index).copied().unwrap_or(Duration::ZERO)
    }

    /// Runs `callback` after the next delay, replacing any pending timer.
    ///
    /// Returns `None` (and schedules nothing) once the budget is spent.
    pub fn schedule<F>(&mut self, callback: F) -> Option<Duration>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.next_delay();
        self.attempts += 1;
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        }));
        Some(delay)
    }

    /// Drops the pending timer, keeping the attempt count.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Drops the pending timer and restores the full retry budget.
    pub fn reset(&mut self) {
        self.cancel();
        self.attempts = 0;
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
