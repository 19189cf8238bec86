//! Snapshot pulls from `GET /queue`.

use async_trait::async_trait;
use reqwest::header::DATE;
use tracing::{debug, warn};

use super::{ApiClient, unix_now};
use crate::core::models::{Job, Snapshot};
use crate::core::store::SnapshotSource;
use crate::error::{DecodeError, TransportError};

/// Pulls the backend's full job list on demand. Does not retry.
#[derive(Clone, Debug)]
pub struct QueueSnapshotFetcher {
    api: ApiClient,
}

impl QueueSnapshotFetcher {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SnapshotSource for QueueSnapshotFetcher {
    async fn fetch_all(&self) -> Result<Snapshot, TransportError> {
        let url = self.api.endpoint("queue")?;
        let issued_at = unix_now();

        let response = self
            .api
            .http()
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        // Prefer the server's clock so snapshot recency compares against the
        // same clock that stamps events.
        let server_time = response
            .headers()
            .get(DATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        // The whole body must parse before anything is merged.
        let entries: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        let total = entries.len();
        let jobs: Vec<Job> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<Job>(entry) {
                Ok(job) => Some(job),
                Err(e) => {
                    let err = DecodeError::from(e);
                    warn!(error = %err, "Dropping malformed snapshot entry");
                    None
                }
            })
            .collect();

        debug!(total, decoded = jobs.len(), "Fetched queue snapshot");
        Ok(Snapshot {
            jobs,
            fetched_at: server_time.unwrap_or(issued_at),
        })
    }
}

fn parse_http_date(value: &str) -> Option<f64> {
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.timestamp() as f64)
}
