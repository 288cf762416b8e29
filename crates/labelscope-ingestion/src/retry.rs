//! Fetch retry with exponential backoff and jitter.
//!
//! Attempt 0 is immediate; attempt `i > 0` waits `2^(i-1) * base` plus a
//! uniform jitter in `[0, max_jitter)`. Only `TransportError::Retryable`
//! failures are retried.

use labelscope_common::RetryConfig;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::models::DocumentRef;
use crate::transport::{FetchedDocument, Transport, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            base: config.base_delay(),
            max_jitter: config.max_jitter(),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            base: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Deterministic part of the wait before `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base.saturating_mul(factor)
    }

    /// Wait before each attempt, jitter included.
    pub fn delays<R: Rng>(&self, rng: &mut R) -> Vec<Duration> {
        (0..self.attempts)
            .map(|attempt| {
                if attempt == 0 || self.max_jitter.is_zero() {
                    return self.base_delay(attempt);
                }
                let jitter = self.max_jitter.mul_f64(rng.gen::<f64>());
                self.base_delay(attempt) + jitter
            })
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Fetch `doc`, retrying transient failures per `policy`.
pub async fn fetch_with_retry(
    transport: &dyn Transport,
    doc: &DocumentRef,
    policy: &RetryPolicy,
) -> Result<FetchedDocument, IngestError> {
    let delays = policy.delays(&mut rand::thread_rng());
    let mut last_error = String::from("no attempts made");

    for (attempt, delay) in delays.into_iter().enumerate() {
        if !delay.is_zero() {
            debug!(
                identifier = %doc.identifier,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Backing off before retry"
            );
            tokio::time::sleep(delay).await;
        }

        match transport.fetch(doc).await {
            Ok(fetched) => return Ok(fetched),
            Err(TransportError::Retryable(message)) => {
                warn!(identifier = %doc.identifier, attempt, error = %message, "Transient fetch failure");
                last_error = message;
            }
            Err(TransportError::Fatal(message)) => {
                return Err(IngestError::Fetch { attempts: attempt as u32 + 1, message });
            }
        }
    }

    Err(IngestError::Fetch { attempts: policy.attempts, message: last_error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Payload;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with `error`, then succeeds.
    struct Flaky {
        failures: u32,
        error: TransportError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for Flaky {
        async fn fetch(&self, _doc: &DocumentRef) -> Result<FetchedDocument, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(FetchedDocument::new(Payload::Bytes(b"%PDF".to_vec())))
            }
        }
    }

    fn flaky(failures: u32, error: TransportError) -> Flaky {
        Flaky { failures, error, calls: AtomicU32::new(0) }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy {
            attempts: 5,
            base: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        };
        let mut rng = StdRng::seed_from_u64(7);
        let delays = policy.delays(&mut rng);
        assert_eq!(delays.len(), 5);
        assert_eq!(delays[0], Duration::ZERO);
        for (i, delay) in delays.iter().enumerate().skip(1) {
            let floor = Duration::from_secs(1 << (i - 1));
            assert!(*delay >= floor && *delay < floor + Duration::from_secs(1), "attempt {i}: {delay:?}");
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let transport = flaky(2, TransportError::Retryable("timeout".into()));
        let fetched = fetch_with_retry(&transport, &DocumentRef::new("u"), &RetryPolicy::immediate(5))
            .await
            .unwrap();
        assert_eq!(fetched.payload, Payload::Bytes(b"%PDF".to_vec()));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_fetch_failed() {
        let transport = flaky(u32::MAX, TransportError::Retryable("connection reset".into()));
        let err = fetch_with_retry(&transport, &DocumentRef::new("u"), &RetryPolicy::immediate(4))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Fetch { attempts: 4, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let transport = flaky(u32::MAX, TransportError::Fatal("HTTP 404".into()));
        let err = fetch_with_retry(&transport, &DocumentRef::new("u"), &RetryPolicy::immediate(5))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Fetch { attempts: 1, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
