//! Harness configuration.
//!
//! Read from an optional JSON file, then overridden by `EDGE_API_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::breaker::BreakerConfig;
use crate::error::{HarnessError, Result};
use crate::retry::RetryPolicy;
use crate::scheduler::SchedulerConfig;

pub const ENV_BASE_URL: &str = "EDGE_API_BASE_URL";
pub const ENV_TOKEN: &str = "EDGE_API_TOKEN";
pub const ENV_TIMEOUT_MS: &str = "EDGE_API_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub base_url: String,
    /// Sent as `Authorization: Token <token>`.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            timeout_ms: 30_000,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Loads `path` (if any), applies environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    HarnessError::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                serde_json::from_str(&contents).map_err(|e| {
                    HarnessError::Config(format!("invalid config at {}: {e}", path.display()))
                })?
            }
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url.trim().to_string();
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.token = Some(token.trim().to_string());
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = timeout
                .trim()
                .parse()
                .map_err(|e| HarnessError::Config(format!("{ENV_TIMEOUT_MS}={timeout:?} is not a number: {e}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(HarnessError::Config(format!(
                "base_url is not set\nSet {ENV_BASE_URL} or add \"base_url\" to the config file."
            )));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(HarnessError::Config(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(HarnessError::Config(
                "retry.max_delay_ms must not be below retry.base_delay_ms".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(HarnessError::Config("retry.jitter_ratio must be within 0..=1".to_string()));
        }
        if self.token.is_none() {
            warn!("{ENV_TOKEN} is not set; requests will be unauthenticated");
        }
        Ok(())
    }
}
