use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{ApiClient, CatalogSearchService, QueueSnapshotFetcher};
use crate::config::AppConfig;
use crate::core::LogAggregator;
use crate::session::{Session, SessionHandle};
use crate::stream::{EventStreamClient, WsConnector};

/// Resolved configuration plus the shared HTTP client.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub api: ApiClient,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self> {
        let api = ApiClient::new(&config.server_url, config.request_timeout())
            .context("Invalid server configuration")?;
        Ok(Self {
            config: Arc::new(config),
            api,
        })
    }

    pub fn snapshots(&self) -> QueueSnapshotFetcher {
        self.api.queue()
    }

    pub fn catalog(&self) -> CatalogSearchService {
        self.api.catalog()
    }

    pub fn event_stream(&self) -> Result<EventStreamClient> {
        let url = self.api.ws_url().context("Cannot derive push channel URL")?;
        Ok(EventStreamClient::new(
            WsConnector::new(url),
            self.config.reconnect_policy(),
        ))
    }

    pub fn log_aggregator(&self) -> LogAggregator {
        match self.config.log_capacity() {
            Some(max) => LogAggregator::with_capacity_limit(max),
            None => LogAggregator::new(),
        }
    }

    /// Wire a session against the configured backend. Not started.
    pub fn session(&self) -> Result<(Session, SessionHandle)> {
        Ok(Session::new(
            self.event_stream()?,
            Arc::new(self.snapshots()),
            Arc::new(self.catalog()),
            self.log_aggregator(),
            self.config.projection(),
        ))
    }
}
