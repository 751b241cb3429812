use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::policy::RetryPolicy;
use crate::client::Transport;
use crate::error::{HarnessError, Result};
use crate::models::{ApiCall, ApiResponse, CallAttempt, CallRecord, Outcome};

/// Runs one logical call as a strictly sequential series of attempts.
pub struct RetryController {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    async fn attempt(&self, call: &ApiCall) -> Result<ApiResponse> {
        match call.timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), self.transport.send(call))
                .await
                .unwrap_or_else(|_| Err(HarnessError::Timeout(ms))),
            None => self.transport.send(call).await,
        }
    }

    /// Never fails: exhaustion and transport failures are reported on the record.
    pub async fn execute(&self, call: &ApiCall) -> CallRecord {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut attempt_number = 0;

        loop {
            attempt_number += 1;
            let started_at = Utc::now();
            let result = self.attempt(call).await;
            let finished_at = Utc::now();
            let has_next = attempt_number < max_attempts;

            match result {
                Ok(response) => {
                    attempts.push(CallAttempt {
                        attempt_number,
                        started_at,
                        finished_at,
                        status: Some(response.status),
                        error: None,
                    });

                    if !self.policy.is_retryable_status(response.status) {
                        debug!(endpoint = %call.endpoint, attempt_number, status = response.status, "call settled");
                        return finish(call, attempts, Outcome::Success, Some(response));
                    }
                    if !has_next {
                        warn!(endpoint = %call.endpoint, status = response.status, attempts = attempt_number, "retries exhausted");
                        return finish(call, attempts, Outcome::ExhaustedRetries, Some(response));
                    }

                    let delay = self.policy.delay_after(attempt_number, Some(&response));
                    warn!(endpoint = %call.endpoint, status = response.status, attempt_number, ?delay, "retryable status, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    attempts.push(CallAttempt {
                        attempt_number,
                        started_at,
                        finished_at,
                        status: None,
                        error: Some((&err).into()),
                    });

                    if !(err.is_transient() && self.policy.retry_on_network_error) {
                        warn!(endpoint = %call.endpoint, error = %err, "call failed without retry");
                        return finish(call, attempts, Outcome::Failed, None);
                    }
                    if !has_next {
                        warn!(endpoint = %call.endpoint, error = %err, attempts = attempt_number, "retries exhausted");
                        return finish(call, attempts, Outcome::ExhaustedRetries, None);
                    }

                    let delay = self.policy.backoff_delay(attempt_number);
                    warn!(endpoint = %call.endpoint, error = %err, attempt_number, ?delay, "transport error, backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn finish(
    call: &ApiCall,
    attempts: Vec<CallAttempt>,
    outcome: Outcome,
    response: Option<ApiResponse>,
) -> CallRecord {
    CallRecord {
        endpoint: call.endpoint.clone(),
        attempts,
        outcome,
        response,
    }
}
