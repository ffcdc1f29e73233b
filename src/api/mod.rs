//! Job API
//!
//! The HTTP side of the verification: job status, job result and artifact reads.
//! All endpoints are idempotent reads, so repeated polling is safe.

pub mod client;
pub mod error;
pub mod types;

pub use client::ApiClient;

use crate::api::error::ApiError;
use crate::api::types::{HealthResponse, StatusSnapshot};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait JobApi: Send + Sync {
    /// Base URL the client talks to, without a trailing slash.
    fn api_base(&self) -> String;

    /// `GET /api/v1/health`
    async fn health(&self) -> Result<HealthResponse, ApiError>;

    /// `GET /api/v1/jobs/{id}`
    async fn job_status(&self, job_id: &str) -> Result<StatusSnapshot, ApiError>;

    /// `GET /api/v1/jobs/{id}/result`, returned undecoded so the validator can
    /// report exactly which field is malformed.
    async fn job_result(&self, job_id: &str) -> Result<serde_json::Value, ApiError>;

    /// Fetches an artifact URL and returns its size in bytes.
    async fn fetch_artifact(&self, url: &str) -> Result<u64, ApiError>;
}
