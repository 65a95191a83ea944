//! Soft timeouts for backend calls.
//!
//! [`with_timeout`] stops *waiting* after the budget, but the operation keeps
//! running on its own task. A result that arrives late is simply never read.
//! Callers must re-check their fetch generation before applying anything.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Outcome of a time-boxed operation.
#[derive(Debug)]
pub enum Bounded<T> {
    Data(T),
    Error(SyncError),
    TimedOut,
}

impl<T> Bounded<T> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Bounded::TimedOut)
    }

    pub fn data(self) -> Option<T> {
        match self {
            Bounded::Data(data) => Some(data),
            _ => None,
        }
    }
}

/// Runs `operation` with a soft `timeout`. Never rejects.
pub async fn with_timeout<F, T>(operation: F, timeout: Duration, label: &str) -> Bounded<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(operation);

    // Dropping the JoinHandle on timeout detaches the task instead of aborting it.
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(data))) => Bounded::Data(data),
        Ok(Ok(Err(err))) => {
            tracing::debug!(label, error = %err, "Bounded operation failed");
            Bounded::Error(err)
        }
        Ok(Err(join_err)) => {
            tracing::warn!(label, error = %join_err, "Bounded operation panicked or was cancelled");
            Bounded::Error(SyncError::TaskFailed(format!("{}: {}", label, join_err)))
        }
        Err(_) => {
            tracing::warn!(
                label,
                timeout_ms = timeout.as_millis() as u64,
                "Bounded operation timed out"
            );
            Bounded::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_returns_data_before_timeout() {
        let outcome = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(7)
            },
            Duration::from_secs(1),
            "fast",
        )
        .await;
        assert!(matches!(outcome, Bounded::Data(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_error_tagged() {
        let outcome: Bounded<()> = with_timeout(
            async { Err(SyncError::remote("fetch", "boom")) },
            Duration::from_secs(1),
            "failing",
        )
        .await;
        assert!(matches!(outcome, Bounded::Error(SyncError::Remote { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_cancelling_operation() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let start = tokio::time::Instant::now();

        let outcome = with_timeout(
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_secs(2),
            "slow",
        )
        .await;

        assert!(outcome.is_timed_out());
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_millis(2_050));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_operation_is_an_error() {
        let outcome: Bounded<()> = with_timeout(
            async {
                let explode = true;
                if explode {
                    panic!("backend exploded");
                }
                Ok(())
            },
            Duration::from_secs(1),
            "panicky",
        )
        .await;
        assert!(matches!(outcome, Bounded::Error(SyncError::TaskFailed(_))));
    }
}
