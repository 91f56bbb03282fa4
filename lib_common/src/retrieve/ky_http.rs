//! # HTTP Retrieval Utilities
//!
//! This module provides a robust, asynchronous API client wrapper around `reqwest`.
//! It includes middleware support for exponential backoff retries, a hard
//! per-request timeout and standardized JSON response handling.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL};
use reqwest::Method;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use url::Url;

/// Errors raised before a response body could be handed back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The configured base URL is not an absolute URL.
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl {
        /// The offending URL as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The underlying `reqwest` client could not be built.
    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),

    /// Connection, timeout or retry exhaustion.
    #[error("request to {url} failed: {reason}")]
    Request {
        /// Full URL that was requested.
        url: String,
        /// Transport level failure description.
        reason: String,
    },

    /// The server answered 2xx but the body did not match the expected shape.
    #[error("could not decode response from {url}: {reason}")]
    Decode {
        /// Full URL that was requested.
        url: String,
        /// Deserialization failure description.
        reason: String,
    },
}

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with metadata about the
/// HTTP transaction.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

impl<T> ApiResponse<T> {
    /// Collapses the response into the decoded body, turning non-2xx statuses
    /// into an `ApiError::Request`.
    pub fn into_data(self, url: &str) -> Result<T, ApiError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(ApiError::Request {
                url: url.to_string(),
                reason: format!(
                    "HTTP {}{}",
                    self.status,
                    self.error_body
                        .filter(|b| !b.is_empty())
                        .map(|b| format!(": {}", b))
                        .unwrap_or_default()
                ),
            }),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs, default headers,
/// timeouts and automatic retries.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient` instance with a retry policy.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API
    ///   (e.g., "http://10.20.88.14:8008/api/warehouse").
    /// * `timeout` - Hard limit for a single attempt.
    /// * `max_retries` - Number of retries on transient failures.
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self, ApiError> {
        let url = Url::parse(base_url).map_err(|e| ApiError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "url cannot be used as a base".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let inner = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner,
            base_url: url,
        })
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Performs a `GET` and decodes a JSON body.
    pub async fn get<T>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        self.request(Method::GET, segments, query).await
    }

    /// Performs a generic HTTP request and handles the response.
    ///
    /// # Errors
    /// Transport failures and undecodable 2xx bodies are errors; non-2xx
    /// statuses are returned as an unsuccessful `ApiResponse`.
    pub async fn request<T>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let mut full_url = self.endpoint(segments);
        if !query.is_empty() {
            full_url.query_pairs_mut().extend_pairs(query.iter());
        }
        let url_text = full_url.to_string();
        tracing::trace!(url = %url_text, %method, "http request");

        let response = self
            .inner
            .request(method, full_url)
            .send()
            .await
            .map_err(|e| ApiError::Request {
                url: url_text.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            let data = response.json::<T>().await.map_err(|e| ApiError::Decode {
                url: url_text.clone(),
                reason: e.to_string(),
            })?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_encoded_segments() {
        let timeout = Duration::from_secs(1);
        let api = ApiClient::new("http://127.0.0.1:8008/api/warehouse", timeout, 0).unwrap();
        let url = api.endpoint(&["Inventory", "container", "PAL 77"]);
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8008/api/warehouse/Inventory/container/PAL%2077"
        );

        let api = ApiClient::new("http://127.0.0.1:8009/api/WCS/", timeout, 0).unwrap();
        let url = api.endpoint(&["getDevice", "Tran3001"]);
        assert_eq!(url.as_str(), "http://127.0.0.1:8009/api/WCS/getDevice/Tran3001");
    }

    #[test]
    fn rejects_relative_base() {
        let err = ApiClient::new("/api/warehouse", Duration::from_secs(1), 0).err();
        assert!(matches!(err, Some(ApiError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn unsuccessful_response_becomes_request_error() {
        let resp: ApiResponse<()> = ApiResponse {
            data: None,
            error_body: Some("gateway down".into()),
            status: 502,
            success: false,
        };
        let err = resp.into_data("http://x/y").unwrap_err();
        assert_eq!(err.to_string(), "request to http://x/y failed: HTTP 502: gateway down");
    }
}
