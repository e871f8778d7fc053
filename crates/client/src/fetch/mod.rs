//! HTTP transport for the normal network path.
//!
//! ### Semantics
//! - One attempt per request; no retries
//! - Any HTTP status is a response; only transport failures are errors
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable), checked against `Content-Length`
//!   and again after the body is read

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::{Duration, Instant};

use btx_core::{AppConfig, AssetRequest, AssetResponse, Error, Network};

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "btx-offline/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "btx-offline/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

fn transport_error(err: reqwest::Error, url: &str) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::NetworkError(format!("{url}: {err}"))
    }
}

/// reqwest-backed [`Network`] implementation.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn too_large(&self, len: u64) -> Option<Error> {
        (len > self.config.max_bytes as u64)
            .then(|| Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)))
    }
}

#[async_trait]
impl Network for HttpFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method: {}", request.method)))?;

        let response = self
            .http
            .request(method, request.url.clone())
            .send()
            .await
            .map_err(|e| transport_error(e, request.url.as_str()))?;

        if let Some(err) = response.content_length().and_then(|len| self.too_large(len)) {
            return Err(err);
        }

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, request.url.as_str()))?;

        if let Some(err) = self.too_large(body.len() as u64) {
            return Err(err);
        }

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "network fetch complete"
        );

        Ok(AssetResponse::new(request.url.clone(), status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "btx-offline/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "clinic/2".into(), max_bytes: 1024, timeout_ms: 500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "clinic/2");
        assert_eq!(config.max_bytes, 1024);
        assert_eq!(config.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_too_large() {
        let fetcher = HttpFetcher::new(FetchConfig { max_bytes: 10, ..Default::default() }).unwrap();
        assert!(fetcher.too_large(10).is_none());
        assert!(matches!(fetcher.too_large(11), Some(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_invalid_method_rejected() {
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let url = url::Url::parse("http://127.0.0.1:9/").unwrap();
        let request = AssetRequest::new("BAD METHOD", url);
        let result = fetcher.fetch(&request).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let client = HttpFetcher::new(FetchConfig::default());
        assert!(client.is_ok());
    }
}
