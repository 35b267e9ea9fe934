//! HTTP client abstraction for testability

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::types::SourceError;

/// Default request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    ///
    /// # Returns
    ///
    /// The response body as bytes, or [`SourceError::Download`] carrying the
    /// HTTP status when one was received.
    fn get(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    fn get(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        (**self).get(url)
    }
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_options(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS), &[])
    }

    /// Creates a new ReqwestClient with a custom timeout and static headers
    /// sent with every request.
    pub fn with_options(
        timeout: Duration,
        headers: &[(String, String)],
    ) -> Result<Self, SourceError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SourceError::Client(format!("Invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SourceError::Client(format!("Invalid header value for {}: {}", name, e)))?;
            header_map.insert(name, value);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .default_headers(header_map)
            .build()
            .map_err(|e| SourceError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self.client.get(url).send().map_err(|e| SourceError::Download {
            url: url.to_string(),
            status: e.status().map(|s| s.as_u16()),
            reason: format!("Request failed: {}", e),
        })?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Download {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        // Read response body
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| SourceError::Download {
                url: url.to_string(),
                status: None,
                reason: format!("Failed to read response: {}", e),
            })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Mock HTTP client for testing.
    ///
    /// Scripted responses are consumed in order; once exhausted every request
    /// receives `fallback`. All requested URLs are recorded.
    pub struct MockHttpClient {
        pub scripted: Mutex<VecDeque<Result<Vec<u8>, SourceError>>>,
        pub fallback: Result<Vec<u8>, SourceError>,
        pub requests: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn always(response: Result<Vec<u8>, SourceError>) -> Self {
            Self {
                scripted: Mutex::new(VecDeque::new()),
                fallback: response,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn scripted(
            responses: Vec<Result<Vec<u8>, SourceError>>,
            fallback: Result<Vec<u8>, SourceError>,
        ) -> Self {
            Self {
                scripted: Mutex::new(responses.into()),
                fallback,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl HttpClient for MockHttpClient {
        fn get(&self, url: &str) -> Result<Vec<u8>, SourceError> {
            self.requests.lock().push(url.to_string());
            self.scripted
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    pub fn http_error(status: Option<u16>) -> SourceError {
        SourceError::Download {
            url: "mock".to_string(),
            status,
            reason: "mock failure".to_string(),
        }
    }

    #[test]
    fn test_mock_client_success() {
        let mock = MockHttpClient::always(Ok(vec![1, 2, 3, 4]));

        let result = mock.get("http://example.com");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(mock.request_count(), 1);
    }

    #[test]
    fn test_mock_client_scripted_then_fallback() {
        let mock = MockHttpClient::scripted(vec![Err(http_error(Some(500)))], Ok(vec![9]));

        assert_eq!(mock.get("a").unwrap_err().status(), Some(500));
        assert_eq!(mock.get("b").unwrap(), vec![9]);
        assert_eq!(*mock.requests.lock(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_reqwest_client_rejects_bad_header() {
        let result = ReqwestClient::with_options(
            Duration::from_secs(1),
            &[("bad header".to_string(), "x".to_string())],
        );
        assert!(matches!(result, Err(SourceError::Client(_))));
    }
}
