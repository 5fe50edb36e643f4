//! HTTP adapter for a remote data provider
//!
//! Uses a long-lived reqwest::Client for connection pooling. Timeouts and
//! connection errors are classified transient so the step executor can
//! retry them; a 404 is a terminal validation failure.

use crate::error::OrchestrationError;
use crate::providers::{CompanyDataset, DataProvider, EntityValidation};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpDataProvider {
    client: Client,
    base_url: String,
}

impl HttpDataProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Data provider request");

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(OrchestrationError::EntityNotFound(path.to_string()));
        }
        if status.is_server_error() {
            return Err(OrchestrationError::Transient(format!(
                "data provider returned {} for {}",
                status, url
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %url, "Data provider error response");
            return Err(OrchestrationError::Provider(format!(
                "data provider returned {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl DataProvider for HttpDataProvider {
    async fn validate(&self, entity: &str) -> Result<EntityValidation> {
        self.get_json(&format!("/v1/companies/{}/validation", entity))
            .await
    }

    async fn fetch(&self, entity: &str) -> Result<CompanyDataset> {
        self.get_json(&format!("/v1/companies/{}/dataset", entity))
            .await
    }
}
