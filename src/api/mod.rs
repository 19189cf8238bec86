//! HTTP client for the installer backend.
//!
//! Thin wrappers around the backend's pull endpoints. None of them hold state
//! beyond the connection pool; callers decide retry policy.
//!
//! ## Endpoints
//!
//! - `GET /queue` - full job list (`queue::QueueSnapshotFetcher`)
//! - `GET /packages?q=` - catalog search (`catalog::CatalogSearchService`)
//! - `POST /enqueue` - job submission (`catalog::CatalogSearchService`)
//! - `/ws` - push channel URL, derived from the base URL

pub mod catalog;
pub mod queue;

use std::time::Duration;

use reqwest::Url;

use crate::error::TransportError;

pub use catalog::{CatalogSearchService, PackageCatalog};
pub use queue::QueueSnapshotFetcher;

/// Shared connection settings for all backend calls.
#[derive(Clone, Debug)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the backend at `base_url` (e.g. `http://127.0.0.1:8080`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| TransportError::Invalid(format!("bad server url {base_url}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(TransportError::Invalid(format!(
                "server url must start with http:// or https://, got {base_url}"
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for a backend path such as `queue`.
    pub fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Invalid(format!("bad endpoint {path}: {e}")))
    }

    /// Push channel URL: same host, `ws` for `http`, `wss` for `https`.
    pub fn ws_url(&self) -> Result<Url, TransportError> {
        let mut url = self.endpoint("ws")?;
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::Invalid(format!("cannot derive push url from {}", self.base)))?;
        Ok(url)
    }

    pub fn queue(&self) -> QueueSnapshotFetcher {
        QueueSnapshotFetcher::new(self.clone())
    }

    pub fn catalog(&self) -> CatalogSearchService {
        CatalogSearchService::new(self.clone())
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

/// Current wall-clock time as fractional seconds since the epoch.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
