//! HTTP client with conditional request support.
//!
//! Wraps reqwest with the ETag / If-Modified-Since handling the CSV cache
//! relies on, plus small JSON/text helpers for the source adapters. Every
//! request carries the configured timeout; a timeout surfaces as a plain
//! request error and is handled by the caller's fallback path.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

/// User agent sent on all outbound requests.
pub const USER_AGENT: &str = concat!("epiwatch/", env!("CARGO_PKG_VERSION"));

/// HTTP response wrapper exposing the headers the caching layer needs.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    response: Response,
}

impl HttpResponse {
    /// Check if the response is 304 Not Modified.
    pub fn is_not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the ETag header.
    pub fn etag(&self) -> Option<&str> {
        self.headers.get("etag").map(|s| s.as_str())
    }

    /// Get the Last-Modified header.
    pub fn last_modified(&self) -> Option<&str> {
        self.headers.get("last-modified").map(|s| s.as_str())
    }

    /// Get response body as text.
    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }

    /// Get response body as bytes.
    pub async fn bytes(self) -> Result<Vec<u8>, reqwest::Error> {
        self.response.bytes().await.map(|b| b.to_vec())
    }

    /// Deserialize the response body as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, reqwest::Error> {
        self.response.json().await
    }
}

/// HTTP client shared by the source adapters and the CSV cache.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with the given request timeout.
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Make a GET request with optional conditional headers.
    pub async fn get(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut request = self.client.get(url);

        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }
        if let Some(lm) = last_modified {
            request = request.header("If-Modified-Since", lm);
        }

        let response = request.send().await?;

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        Ok(HttpResponse {
            status: response.status(),
            headers,
            response,
        })
    }

    /// GET a URL and return its body as text. Non-2xx statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url, None, None).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// GET a URL and deserialize its JSON body. Non-2xx statuses are errors.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, FetchError> {
        let response = self.get(url, None, None).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

/// Error returned by the convenience fetch helpers.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
}
