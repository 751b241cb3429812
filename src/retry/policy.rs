use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::models::ApiResponse;

/// Upper bound on any server-requested `Retry-After` wait.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Statuses retried by default: request timeout, rate limiting and transient 5xx.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub retryable_statuses: BTreeSet<u16>,
    pub retry_on_network_error: bool,
    /// Symmetric jitter applied to the computed backoff, e.g. 0.2 for ±20%.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
            retry_on_network_error: true,
            jitter_ratio: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// `min(base * 2^(attempt-1), max)` with jitter, never above `max_delay_ms`.
    pub fn backoff_delay(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let capped = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);

        let jittered = if self.jitter_ratio > 0.0 && capped > 0 {
            let ratio = self.jitter_ratio.min(1.0);
            let scale = 1.0 + rand::thread_rng().gen_range(-ratio..=ratio);
            ((capped as f64 * scale) as u64).min(self.max_delay_ms)
        } else {
            capped
        };

        Duration::from_millis(jittered)
    }

    /// Delay before the attempt after `attempt_number`. A 429 carrying `Retry-After` wins.
    pub fn delay_after(&self, attempt_number: u32, response: Option<&ApiResponse>) -> Duration {
        response
            .filter(|resp| resp.status == 429)
            .and_then(parse_retry_after)
            .unwrap_or_else(|| self.backoff_delay(attempt_number))
    }
}

/// Reads `Retry-After` as delta-seconds or an HTTP-date, capped at [`MAX_RETRY_AFTER`].
pub fn parse_retry_after(response: &ApiResponse) -> Option<Duration> {
    let value = response.header("retry-after")?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Some(wait.min(MAX_RETRY_AFTER))
}
