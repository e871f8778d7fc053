//! Request/response types and the network seam.
//!
//! The controller never talks to a transport directly. It is handed an
//! `Arc<dyn Network>` at startup, which is the reqwest client in production
//! and a counting fake in tests.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;

pub use self::url::{UrlError, resolve, same_origin, strip_search};

use crate::Error;

/// An outgoing request issued by a client view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    /// Uppercased HTTP method.
    pub method: String,
    pub url: ::url::Url,
}

impl AssetRequest {
    pub fn new(method: impl AsRef<str>, url: ::url::Url) -> Self {
        Self { method: method.as_ref().trim().to_ascii_uppercase(), url }
    }

    pub fn get(url: ::url::Url) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// A captured network response.
///
/// Cloning is cheap: the body is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
    /// URL the response was produced for.
    pub url: ::url::Url,
    pub status: u16,
    /// Header pairs in the order they were received.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl AssetResponse {
    pub fn new(url: ::url::Url, status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self { url, status, headers, body: body.into() }
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Reject responses the cache refuses to keep.
    ///
    /// Partial content and `Vary: *` can never be replayed. Non-2xx statuses
    /// are refused as well, unlike a browser cache that would keep a 404 or
    /// 500 and replay it until the next version bump.
    pub fn check_cacheable(&self) -> Result<(), Error> {
        if self.status == 206 {
            return Err(Error::NotCacheable("partial content (206)".into()));
        }
        if !self.ok() {
            return Err(Error::NotCacheable(format!("status {}", self.status)));
        }
        if let Some(vary) = self.header("vary")
            && vary.split(',').any(|v| v.trim() == "*")
        {
            return Err(Error::NotCacheable("Vary: *".into()));
        }
        Ok(())
    }
}

/// The normal network path.
#[async_trait]
pub trait Network: Send + Sync {
    /// Issue one request; transport failures are errors, any HTTP status is a response.
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, Error>;
}
