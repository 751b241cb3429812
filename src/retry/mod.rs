mod controller;
mod policy;

pub use controller::RetryController;
pub use policy::{DEFAULT_RETRYABLE_STATUSES, MAX_RETRY_AFTER, RetryPolicy, parse_retry_after};
