//! HTTP transport to the ad server.
//!
//! [`AdServerClient`] is the seam the coordinator talks through; the
//! production implementation is [`HttpTransport`]. Tests substitute their
//! own implementation to script response timing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::TransportError;
use crate::model::{ErrorReport, PreloadRequest, PreloadResponse};

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Operations the SDK needs from the ad server.
#[async_trait]
pub trait AdServerClient: Send + Sync + std::fmt::Debug {
    /// Fetch bids for the given conversation snapshot (`POST /preload`).
    async fn preload(&self, request: &PreloadRequest) -> Result<PreloadResponse>;

    /// Report a diagnostic event (`POST /error`). The response body is ignored.
    async fn report_error(&self, report: &ErrorReport) -> Result<()>;
}

/// JSON-over-HTTP client for the ad server.
///
/// Holds no state across calls beyond the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for the given server address.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a transport whose requests give up after `timeout`.
    pub fn with_timeout(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, http)
    }

    /// Create a transport with a custom reqwest client.
    pub fn with_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self { base_url, http })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    /// Issue a request and decode a typed JSON response.
    pub async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.execute(method, path, body).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Issue a request, validating only the status code.
    pub async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.execute(method, path, body).await.map(drop)
    }

    async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path)?;
        let mut rb = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            rb = rb.json(body);
        }

        let response = rb.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::BadStatus(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl AdServerClient for HttpTransport {
    async fn preload(&self, request: &PreloadRequest) -> Result<PreloadResponse> {
        self.request(Method::POST, "/preload", Some(request)).await
    }

    async fn report_error(&self, report: &ErrorReport) -> Result<()> {
        self.send(Method::POST, "/error", Some(report)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base() {
        let err = HttpTransport::new("not a url").unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let transport = HttpTransport::new("https://ads.example.com/v2/").unwrap();
        let url = transport.url("/preload").unwrap();
        assert_eq!(url.as_str(), "https://ads.example.com/v2/preload");
    }
}
