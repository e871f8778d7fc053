//! Request key generation.
//!
//! Every stored entry carries two keys: the exact key (method + URL without
//! fragment) that identifies it for upserts, and the search key (method + URL
//! without query) used by `ignore_search` lookups.

use sha2::{Digest, Sha256};
use url::Url;

use crate::net::{AssetRequest, strip_search};

fn digest(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compute the exact cache key for a request.
pub fn compute_request_key(method: &str, url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    digest(method, url.as_str())
}

/// Compute the query-insensitive cache key for a request.
pub fn compute_search_key(method: &str, url: &Url) -> String {
    digest(method, strip_search(url).as_str())
}

/// Both keys of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    pub exact: String,
    pub search: String,
}

impl RequestKey {
    pub fn of(request: &AssetRequest) -> Self {
        Self {
            exact: compute_request_key(&request.method, &request.url),
            search: compute_search_key(&request.method, &request.url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_key_stability() {
        let a = compute_request_key("GET", &url("http://127.0.0.1:8080/app.js"));
        let b = compute_request_key("GET", &url("http://127.0.0.1:8080/app.js"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_depends_on_method() {
        let get = compute_request_key("GET", &url("http://127.0.0.1:8080/app.js"));
        let head = compute_request_key("HEAD", &url("http://127.0.0.1:8080/app.js"));
        assert_ne!(get, head);
    }

    #[test]
    fn test_exact_key_keeps_query() {
        let a = compute_request_key("GET", &url("http://127.0.0.1:8080/index.html?x=1"));
        let b = compute_request_key("GET", &url("http://127.0.0.1:8080/index.html?x=2"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_search_key_ignores_query() {
        let plain = compute_search_key("GET", &url("http://127.0.0.1:8080/index.html"));
        let x1 = compute_search_key("GET", &url("http://127.0.0.1:8080/index.html?x=1"));
        let x2 = compute_search_key("GET", &url("http://127.0.0.1:8080/index.html?x=2"));
        assert_eq!(plain, x1);
        assert_eq!(x1, x2);
    }

    #[test]
    fn test_fragment_never_part_of_key() {
        let a = compute_request_key("GET", &url("http://127.0.0.1:8080/#top"));
        let b = compute_request_key("GET", &url("http://127.0.0.1:8080/"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_format() {
        let key = compute_request_key("GET", &url("http://127.0.0.1:8080/"));
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
