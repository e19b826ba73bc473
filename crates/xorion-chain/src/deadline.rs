//! Deadlines for chain reads.
//!
//! Expiry is reported as a value rather than an error so callers can tell
//! "ran out of time" apart from "completed with nothing".

use std::future::Future;
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
pub enum Deadline<T> {
    Completed(T),
    TimedOut,
}

impl<T> Deadline<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Deadline::Completed(value) => Some(value),
            Deadline::TimedOut => None,
        }
    }
}

/// Race `future` against `limit`. The losing side is dropped.
pub async fn with_deadline<F>(limit: Duration, future: F) -> Deadline<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(limit, future).await {
        Ok(value) => Deadline::Completed(value),
        Err(_) => Deadline::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_completes_before_limit() {
        let result = with_deadline(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result, Deadline::Completed(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let result = with_deadline(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            7
        })
        .await;
        assert_eq!(result, Deadline::TimedOut);
        assert_eq!(result.completed(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_empty_is_not_timeout() {
        let result = with_deadline(Duration::from_secs(1), async { None::<u8> }).await;
        assert_eq!(result, Deadline::Completed(None));
    }
}
