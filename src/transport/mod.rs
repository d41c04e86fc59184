use crate::config::ApiConfig;
use crate::error::ExtractError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use std::sync::Arc;

pub mod http;

/// Raw response handed back by a [`Transport`]
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Header value as a string, if present and valid UTF-8
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Capability to perform an authenticated GET against the API
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    /// Send `GET url` with JSON accept/content-type headers and a bearer token,
    /// returning the status, headers and full body.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request cannot be built (`RequestConstruction`)
    /// - The request cannot be sent or the body cannot be read (`Transport`)
    async fn get(&self, url: &Url, bearer_token: &str) -> Result<HttpResponse, ExtractError>;
}

/// Creates the HTTP transport for the given API configuration
///
/// # Errors
///
/// Returns an error if the underlying HTTP client cannot be initialized
pub fn create_transport(config: &ApiConfig) -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(http::HttpTransport::new(config.timeout())?))
}
