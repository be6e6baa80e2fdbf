//! Bounded fixed-interval retry on rate limiting.

use std::thread;
use std::time::Duration;

use crate::core::config::RetryConfig;
use crate::transport::{LookupOutcome, ReputationTransport};

/// Fixed backoff with a retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep between a rate-limited attempt and the next one.
    pub wait: Duration,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Policy from the `[retry]` config section.
    #[must_use]
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self {
            wait: Duration::from_secs(config.rate_limit_wait_secs),
            max_retries: config.max_rate_limit_retries,
        }
    }
}

/// Look up `fingerprint`, sleeping and retrying while the service rate-limits.
///
/// `on_backoff(retry_number, wait)` runs before each sleep. Once the budget is
/// spent the terminal outcome is [`LookupOutcome::GaveUp`]. Every other outcome
/// is returned as soon as it arrives.
pub fn lookup_with_retry<F>(
    transport: &dyn ReputationTransport,
    fingerprint: &str,
    policy: RetryPolicy,
    mut on_backoff: F,
) -> LookupOutcome
where
    F: FnMut(u32, Duration),
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match transport.lookup(fingerprint) {
            LookupOutcome::RateLimited => {
                let retry = attempts;
                if retry > policy.max_retries {
                    return LookupOutcome::GaveUp { attempts };
                }
                on_backoff(retry, policy.wait);
                if !policy.wait.is_zero() {
                    thread::sleep(policy.wait);
                }
            }
            other => return other,
        }
    }
}
