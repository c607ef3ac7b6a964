//! Retry backoff for device-session operations

use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INITIAL_DELAY_MS: u64 = 100;
const MAX_DELAY_MS: u64 = 10_000;

/// Exponential backoff, doubling from 100ms up to 10s
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            next: Duration::from_millis(INITIAL_DELAY_MS),
            max: Duration::from_millis(MAX_DELAY_MS),
        }
    }

    /// Delay for the next attempt; advances the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = Duration::from_millis(INITIAL_DELAY_MS);
    }

    /// Sleep for the next delay; returns false if cancelled first
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.next_delay();
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancellable() {
        let mut backoff = Backoff::new();
        let cancel = CancellationToken::new();
        assert!(backoff.wait(&cancel).await);

        cancel.cancel();
        assert!(!backoff.wait(&cancel).await);
    }
}
