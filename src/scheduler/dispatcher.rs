use std::sync::Arc;
use tracing::debug;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::client::Transport;
use crate::models::{ApiCall, CallRecord};
use crate::retry::{RetryController, RetryPolicy};

/// Circuit breaker in front of the retry controller.
pub struct Dispatcher {
    retry: RetryController,
    breaker: Arc<CircuitBreaker>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, breaker: BreakerConfig) -> Self {
        Self::with_breaker(
            RetryController::new(transport, policy),
            Arc::new(CircuitBreaker::new(breaker)),
        )
    }

    /// Shares `breaker` with other dispatchers, e.g. across consecutive batches.
    pub fn with_breaker(retry: RetryController, breaker: Arc<CircuitBreaker>) -> Self {
        Self { retry, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn dispatch(&self, call: &ApiCall) -> CallRecord {
        let admission = match self.breaker.admit(call.category()) {
            Ok(admission) => admission,
            Err(err) => {
                debug!(endpoint = %call.endpoint, %err, "call short-circuited");
                return CallRecord::rejected(call.endpoint.clone());
            }
        };

        let record = self.retry.execute(call).await;
        if record.is_transport_failure() {
            admission.failed();
        } else {
            admission.succeeded();
        }
        record
    }
}
