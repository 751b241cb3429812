use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ApiCall, ApiResponse};

/// Issues exactly one HTTP request. Retrying belongs to the layers above.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, call: &ApiCall) -> Result<ApiResponse>;
}
