//! The session task: one owner for all client-side job state.
//!
//! Push items, pull completions and user commands all funnel into a single
//! task, which is the only writer of the [`JobStateStore`] and
//! [`LogAggregator`]. Front-ends read a [`Dashboard`] from a `watch` channel
//! and talk back through [`Command`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::api::PackageCatalog;
use crate::core::models::{CatalogPage, EnqueueAck, Event, Snapshot};
use crate::core::projector::{self, CatalogRow, ProjectionOptions, QueueView};
use crate::core::logs::LogAggregator;
use crate::core::store::{Diagnostics, EventOutcome, JobStateStore, SnapshotSource, SnapshotTicket};
use crate::error::TransportError;
use crate::stream::{EventStreamClient, StreamItem};

const COMMAND_BUFFER: usize = 32;

/// Requests from a front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace the catalog listing with the results for this query.
    Search(Option<String>),
    /// Submit an install job.
    Enqueue(String),
    /// Pull a fresh snapshot now.
    Refresh,
    DismissNotice,
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected { reason: String },
}

/// Everything a front-end needs to draw one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dashboard {
    pub queue: QueueView,
    pub catalog: Vec<CatalogRow>,
    pub catalog_query: Option<String>,
    pub catalog_total: usize,
    pub connection: ConnectionState,
    /// Last transport failure, until dismissed.
    pub notice: Option<String>,
    pub diagnostics: Diagnostics,
    pub decode_failures: u64,
    pub last_snapshot_time: f64,
}

/// Front-end side of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    dashboard: watch::Receiver<Dashboard>,
}

impl SessionHandle {
    /// Queue a command. Returns false once the session has stopped.
    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn dashboard(&self) -> watch::Receiver<Dashboard> {
        self.dashboard.clone()
    }

    pub fn commands(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }
}

enum Completion {
    Snapshot(SnapshotTicket, Result<Snapshot, TransportError>),
    Search {
        seq: u64,
        query: Option<String>,
        result: Result<CatalogPage, TransportError>,
    },
    Enqueue {
        package: String,
        result: Result<EnqueueAck, TransportError>,
    },
}

pub struct Session {
    store: JobStateStore,
    logs: LogAggregator,
    stream: EventStreamClient,
    source: Arc<dyn SnapshotSource>,
    catalog: Arc<dyn PackageCatalog>,
    options: ProjectionOptions,
    commands: mpsc::Receiver<Command>,
    publisher: watch::Sender<Dashboard>,
    /// Set by the store listener, cleared on publish.
    dirty: Arc<AtomicBool>,
    view: Dashboard,
    search_seq: u64,
}

impl Session {
    pub fn new(
        stream: EventStreamClient,
        source: Arc<dyn SnapshotSource>,
        catalog: Arc<dyn PackageCatalog>,
        logs: LogAggregator,
        options: ProjectionOptions,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (publisher, dashboard) = watch::channel(Dashboard::default());

        let dirty = Arc::new(AtomicBool::new(true));
        let mut store = JobStateStore::new();
        let flag = dirty.clone();
        store.subscribe(move |_| flag.store(true, Ordering::Relaxed));

        let session = Self {
            store,
            logs,
            stream,
            source,
            catalog,
            options,
            commands,
            publisher,
            dirty,
            view: Dashboard::default(),
            search_seq: 0,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            dashboard,
        };
        (session, handle)
    }

    /// Run until `Command::Shutdown`, or until every handle is dropped.
    pub async fn run(mut self) {
        let mut items = self.stream.subscribe();
        self.stream.connect();
        let mut pending: JoinSet<Completion> = JoinSet::new();
        info!("Session started");

        loop {
            self.publish_if_dirty();

            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle_command(command, &mut pending),
                },
                item = items.next() => match item {
                    Some(item) => self.handle_stream_item(item, &mut pending),
                    None => {
                        warn!("Push channel ended; session stopping");
                        break;
                    }
                },
                Some(done) = pending.join_next(), if !pending.is_empty() => {
                    self.handle_completion(done, &mut pending);
                }
            }
        }

        pending.abort_all();
        self.stream.shutdown().await;
        info!("Session stopped");
    }

    fn handle_command(&mut self, command: Command, pending: &mut JoinSet<Completion>) {
        debug!(?command, "Session command");
        match command {
            Command::Search(query) => {
                self.search_seq += 1;
                let seq = self.search_seq;
                let catalog = self.catalog.clone();
                pending.spawn(async move {
                    let result = catalog.search(query.as_deref(), None, None).await;
                    Completion::Search { seq, query, result }
                });
            }
            Command::Enqueue(package) => {
                let catalog = self.catalog.clone();
                pending.spawn(async move {
                    let result = catalog.enqueue(&package).await;
                    Completion::Enqueue { package, result }
                });
            }
            Command::Refresh => self.request_snapshot(pending),
            Command::DismissNotice => {
                if self.view.notice.take().is_some() {
                    self.mark_dirty();
                }
            }
            Command::Shutdown => {}
        }
    }

    fn handle_stream_item(&mut self, item: StreamItem, pending: &mut JoinSet<Completion>) {
        match item {
            StreamItem::Connected => {
                self.view.connection = ConnectionState::Connected;
                self.mark_dirty();
                self.request_snapshot(pending);
            }
            StreamItem::Event(event) => self.apply_event(&event),
            StreamItem::DecodeFailed(_) => {
                self.view.decode_failures += 1;
                self.mark_dirty();
            }
            StreamItem::Disconnected { reason } => {
                self.view.notice = Some(format!("Push channel lost: {reason}"));
                self.view.connection = ConnectionState::Disconnected { reason };
                self.mark_dirty();
            }
            StreamItem::Gap { missed } => {
                warn!(missed, "Fell behind the push channel; reconciling");
                self.request_snapshot(pending);
            }
        }
    }

    fn apply_event(&mut self, event: &Event) {
        match self.store.apply_event(event) {
            EventOutcome::StaleWriteIgnored { job_id, reason } => {
                debug!(job_id = %job_id, ?reason, "Stale status write ignored");
            }
            EventOutcome::Ignored => {
                if let Event::Other { kind } = event {
                    debug!(kind = %kind, "Ignoring unrelated push message");
                }
            }
            EventOutcome::Applied => {}
        }
        if self.logs.append(event) {
            self.mark_dirty();
        }
    }

    fn handle_completion(
        &mut self,
        done: Result<Completion, JoinError>,
        pending: &mut JoinSet<Completion>,
    ) {
        let completion = match done {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %e, "Background request task failed");
                return;
            }
        };

        match completion {
            Completion::Snapshot(ticket, Ok(snapshot)) => {
                let outcome = self.store.apply_ticketed_snapshot(ticket, snapshot);
                debug!(?outcome, "Snapshot merged");
                self.mark_dirty();
            }
            Completion::Snapshot(_, Err(e)) => {
                warn!(error = %e, "Snapshot fetch failed; keeping current state");
                self.set_notice(format!("Queue refresh failed: {e}"));
            }
            Completion::Search { seq, .. } if seq != self.search_seq => {
                debug!(seq, latest = self.search_seq, "Discarding outdated search results");
            }
            Completion::Search {
                query,
                result: Ok(page),
                ..
            } => {
                self.view.catalog = projector::project_catalog(&page.items);
                self.view.catalog_total = page.total;
                self.view.catalog_query = query;
                self.mark_dirty();
            }
            Completion::Search { result: Err(e), .. } => {
                warn!(error = %e, "Catalog search failed");
                self.set_notice(format!("Search failed: {e}"));
            }
            Completion::Enqueue {
                package,
                result: Ok(ack),
            } => {
                info!(package = %package, job_id = %ack.job_id, "Install queued");
                // The queue may list the job before its job_started arrives.
                self.request_snapshot(pending);
            }
            Completion::Enqueue {
                package,
                result: Err(e),
            } => {
                warn!(package = %package, error = %e, "Install request failed");
                self.set_notice(format!("Install of {package} failed: {e}"));
            }
        }
    }

    fn request_snapshot(&mut self, pending: &mut JoinSet<Completion>) {
        let ticket = self.store.begin_snapshot();
        let source = self.source.clone();
        pending.spawn(async move {
            let result = source.fetch_all().await;
            Completion::Snapshot(ticket, result)
        });
    }

    fn set_notice(&mut self, notice: String) {
        self.view.notice = Some(notice);
        self.mark_dirty();
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    fn publish_if_dirty(&mut self) {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return;
        }
        self.view.queue = projector::project(&self.store, &self.logs, &self.options);
        self.view.diagnostics = self.store.diagnostics().clone();
        self.view.last_snapshot_time = self.store.last_snapshot_time();
        self.publisher.send_replace(self.view.clone());
    }
}
