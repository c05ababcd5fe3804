//! Remote file fetching.

use crate::errors::FetchError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Downloads raw bytes from a URL.
///
/// Implementations do not cache; the download stage decides whether a fetch
/// is needed at all.
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    /// Fetches the body at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// A [`Fetcher`] backed by `reqwest`.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    /// Creates a fetcher with the given per-request timeout.
    pub fn new(timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |e: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        tracing::debug!(url = %url, bytes = body.len(), "Fetched remote file");
        Ok(body.to_vec())
    }
}

#[cfg(all(test, feature = "http"))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let fetcher = HttpFetcher::new(Duration::from_millis(500)).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:9/orders.csv").await.unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
    }
}
