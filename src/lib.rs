//! Resilient call harness for the edge platform REST API.
//!
//! Calls flow `Scheduler -> Dispatcher (circuit breaker) -> RetryController -> Transport`.
//! Finished records feed the coverage comparison and the report renderers.

pub mod breaker;
pub mod client;
pub mod config;
pub mod coverage;
pub mod error;
pub mod models;
pub mod report;
pub mod retry;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use error::{HarnessError, Result};
