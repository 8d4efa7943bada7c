// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff for outbound sends.

use std::future::Future;
use std::time::Duration;

use relaydesk_config::model::OutboundConfig;
use relaydesk_core::types::SendResult;
use tracing::warn;

/// Retry schedule for retryable send failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
    };

    /// Delay before retry number `retry` (1-based): initial, doubling, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl From<&OutboundConfig> for RetryPolicy {
    fn from(config: &OutboundConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Runs `send` until it succeeds, fails permanently, or retries run out.
///
/// Only results flagged `retryable` are retried. The last result is
/// returned as-is.
pub async fn send_with_retry<F, Fut>(policy: RetryPolicy, mut send: F) -> SendResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SendResult>,
{
    let mut attempt = 0;
    loop {
        let result = send().await;
        if result.success || !result.retryable || attempt >= policy.max_retries {
            return result;
        }
        attempt += 1;
        let delay = policy.delay_for(attempt);
        warn!(
            attempt,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = result.error.as_deref().unwrap_or(""),
            "retryable send failure, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(1500),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(1500));
        assert_eq!(p.delay_for(40), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);
        let result = send_with_retry(policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    SendResult::failed("503", true)
                } else {
                    SendResult::sent(Some("ok".into()))
                }
            }
        })
        .await;
        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result = send_with_retry(policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { SendResult::failed("400", false) }
        })
        .await;
        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result = send_with_retry(policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { SendResult::failed("timeout", true) }
        })
        .await;
        assert!(!result.success);
        assert!(result.retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
