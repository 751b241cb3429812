use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

use super::transport::Transport;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::models::{ApiCall, ApiResponse};

/// reqwest-backed client for the edge platform REST API.
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    timeout_ms: u64,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &HarnessConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout_ms: config.timeout_ms,
            client,
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn send(&self, call: &ApiCall) -> Result<ApiResponse> {
        let timeout_ms = call.timeout_ms.unwrap_or(self.timeout_ms);
        let url = self.url_for(&call.endpoint.path);

        let mut request = self
            .client
            .request(call.endpoint.method.to_reqwest(), &url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .timeout(Duration::from_millis(timeout_ms));

        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {}", token));
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        for (name, value) in &call.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| HarnessError::from_reqwest(e, timeout_ms))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HarnessError::from_reqwest(e, timeout_ms))?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let is_json = headers
            .get("content-type")
            .is_some_and(|content_type| content_type.contains("json"));
        let body = if bytes.is_empty() {
            Value::Null
        } else if is_json {
            serde_json::from_slice(&bytes).map_err(|e| {
                HarnessError::Protocol(format!("{} {} returned invalid JSON: {}", call.endpoint.method, url, e))
            })?
        } else {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        };

        debug!(method = %call.endpoint.method, %url, status, duration_ms, "request finished");

        Ok(ApiResponse {
            status,
            headers,
            body,
            duration_ms,
        })
    }
}
