//! The asset manifest populated on install.

use btx_core::Error;
use btx_core::net::{resolve, same_origin};
use url::Url;

/// Ordered list of asset paths that must be cached after install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    paths: Vec<String>,
}

impl AssetManifest {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { paths: paths.into_iter().map(Into::into).collect() }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve every path against the scope, dropping duplicates.
    ///
    /// Cross-origin entries are rejected: only same-origin responses may be
    /// stored.
    pub fn resolve(&self, scope: &Url) -> Result<Vec<Url>, Error> {
        let mut urls: Vec<Url> = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let url = resolve(scope, path).map_err(|e| Error::InvalidUrl(format!("manifest entry {path:?}: {e}")))?;
            if !same_origin(&url, scope) {
                return Err(Error::InvalidInput(format!("manifest entry {path:?} is not same-origin with {scope}")));
            }
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(btx_core::config::DEFAULT_MANIFEST.iter().copied())
    }
}
