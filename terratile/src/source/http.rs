//! HTTP client abstraction for testability.

use super::SourceError;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for HTTP GET operations.
///
/// This abstraction allows for dependency injection and easier testing by
/// enabling mock HTTP clients in tests. Deadlines are not enforced here:
/// the fetcher wraps each call in its own per-attempt timeout so the
/// escalating per-layer deadline stays in one place.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the response body.
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Bytes, SourceError>>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with no request timeout of its own.
    ///
    /// The fetcher owns all deadlines.
    pub fn new() -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SourceError::Http(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Bytes, SourceError>> {
        let request = self.client.get(url).send();
        let url = url.to_string();
        Box::pin(async move {
            let response = request
                .await
                .map_err(|e| SourceError::Http(format!("request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(SourceError::Http(format!(
                    "HTTP {} from {}",
                    response.status(),
                    url
                )));
            }

            response
                .bytes()
                .await
                .map_err(|e| SourceError::Http(format!("failed to read response: {}", e)))
        })
    }
}
