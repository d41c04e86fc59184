use crate::error::ExtractError;
use crate::transport::{HttpResponse, Transport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;

/// [`Transport`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport whose requests are bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend or client cannot be initialized
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url, bearer_token: &str) -> Result<HttpResponse, ExtractError> {
        let request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(bearer_token)
            .build()
            .map_err(|e| ExtractError::RequestConstruction(e.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ExtractError::Transport(format!("failed to read response body: {e}")))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
