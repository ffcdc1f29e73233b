//! Job API Client
//!
//! A thin reqwest client for the AlphaFold-Multimer job service.

use crate::api::JobApi;
use crate::api::error::ApiError;
use crate::api::types::{HealthResponse, StatusSnapshot};
use log::debug;
use reqwest::{Client, ClientBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client for the API at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url,
            endpoint.trim_start_matches('/')
        )
    }

    fn job_endpoint(job_id: &str) -> String {
        format!("api/v1/jobs/{}", urlencoding::encode(job_id))
    }

    /// Artifact URLs in result documents are relative to the API base.
    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.build_url(url)
        }
    }

    async fn handle_response_status(response: Response) -> Result<Response, ApiError> {
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let url = self.build_url(endpoint);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let response = Self::handle_response_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode { url, source })
    }
}

#[async_trait::async_trait]
impl JobApi for ApiClient {
    fn api_base(&self) -> String {
        self.base_url.clone()
    }

    async fn health(&self) -> Result<HealthResponse, ApiError> {
        self.get_json("api/v1/health").await
    }

    async fn job_status(&self, job_id: &str) -> Result<StatusSnapshot, ApiError> {
        let payload: serde_json::Value = self.get_json(&Self::job_endpoint(job_id)).await?;
        Ok(StatusSnapshot::from_payload(payload))
    }

    async fn job_result(&self, job_id: &str) -> Result<serde_json::Value, ApiError> {
        let endpoint = format!("{}/result", Self::job_endpoint(job_id));
        self.get_json(&endpoint).await
    }

    async fn fetch_artifact(&self, url: &str) -> Result<u64, ApiError> {
        let url = self.resolve_url(url);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let response = Self::handle_response_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.len() as u64)
    }
}
