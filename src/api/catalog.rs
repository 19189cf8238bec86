//! Catalog search and job submission.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::ApiClient;
use crate::core::models::{CatalogPage, EnqueueAck};
use crate::error::TransportError;

/// Package lookup and job submission, as seen by a session.
#[async_trait]
pub trait PackageCatalog: Send + Sync {
    async fn search(
        &self,
        query: Option<&str>,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<CatalogPage, TransportError>;

    async fn enqueue(&self, package: &str) -> Result<EnqueueAck, TransportError>;
}

#[derive(Clone, Debug)]
pub struct CatalogSearchService {
    api: ApiClient,
}

#[derive(Serialize)]
struct EnqueueRequest<'a> {
    package: &'a str,
}

impl CatalogSearchService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Search the package catalog. An empty query lists everything.
    pub async fn search(
        &self,
        query: Option<&str>,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<CatalogPage, TransportError> {
        let mut url = self.api.endpoint("packages")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
                pairs.append_pair("q", q);
            }
            if let Some(page) = page {
                pairs.append_pair("page", &page.to_string());
            }
            if let Some(size) = size {
                pairs.append_pair("size", &size.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        self.api
            .http()
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?
            .json::<CatalogPage>()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))
    }

    /// Submit an install job for `package`.
    pub async fn enqueue(&self, package: &str) -> Result<EnqueueAck, TransportError> {
        let package = package.trim();
        if package.is_empty() {
            return Err(TransportError::Invalid("package name required".to_string()));
        }

        let url = self.api.endpoint("enqueue")?;
        let ack = self
            .api
            .http()
            .post(url.clone())
            .json(&EnqueueRequest { package })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?
            .json::<EnqueueAck>()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        info!(package, job_id = %ack.job_id, "Install job submitted");
        Ok(ack)
    }
}

#[async_trait]
impl PackageCatalog for CatalogSearchService {
    async fn search(
        &self,
        query: Option<&str>,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<CatalogPage, TransportError> {
        CatalogSearchService::search(self, query, page, size).await
    }

    async fn enqueue(&self, package: &str) -> Result<EnqueueAck, TransportError> {
        CatalogSearchService::enqueue(self, package).await
    }
}
