//! In-memory reconciliation of job state.
//!
//! Two sources describe the same jobs: full snapshots pulled from `GET /queue`
//! and incremental events pushed over the event stream. Neither is complete
//! nor ordered with respect to the other. `JobStateStore` merges both into one
//! record per `job_id` using these rules:
//!
//! - `status` is last-writer-wins by logical timestamp; on equal timestamps
//!   the later-applied write wins.
//! - Terminal statuses (`succeeded`, `failed`) are sticky. A terminal event
//!   always beats a non-terminal record, and nothing moves a terminal record.
//! - A snapshot only overwrites a record if it is not older than the record's
//!   `last_updated`.
//! - A snapshot only removes absent records that are terminal. Their ids are
//!   remembered, so late output for a removed job cannot bring it back.
//!
//! The store is owned by a single task; all mutation goes through `&mut self`.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::models::{Event, Job, JobEvent, JobStatus, Payload, Snapshot};
use crate::error::TransportError;

/// How many removed job ids are remembered.
const TOMBSTONE_CAPACITY: usize = 4096;

/// Anything that can produce a full job snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Snapshot, TransportError>;
}

/// A change to the store, delivered to listeners after it is fully applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Inserted(Job),
    Updated(Job),
    Removed(Job),
}

pub type Listener = Box<dyn FnMut(&StoreChange) + Send>;

/// Why an update lost the recency race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The record is already terminal.
    TerminalSticky,
    /// The record holds newer information than the update.
    OlderTimestamp,
    /// The job already finished and was dropped from the store.
    Removed,
}

/// Result of feeding one event to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Applied,
    StaleWriteIgnored { job_id: String, reason: StaleReason },
    /// Not a job event, or a type this client does not act on.
    Ignored,
}

/// Summary of one snapshot application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub stale: usize,
    /// The response belonged to an older request than one already applied.
    pub superseded: bool,
}

/// Counters for diagnostics. Never shown as errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub events_applied: u64,
    pub stale_writes: u64,
    pub ignored_events: u64,
    pub snapshots_applied: u64,
    pub snapshots_superseded: u64,
}

/// Sequence number of a snapshot request. Later requests win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotTicket(u64);

struct Entry {
    job: Job,
    /// Logical time of the write that set `job.status`. `None` when the status
    /// was inferred from a progress or stdout event.
    status_at: Option<f64>,
    progress_at: f64,
    /// First-seen order, for stable listing.
    seen: u64,
}

impl Entry {
    fn write_status(&mut self, status: &JobStatus, timestamp: f64) -> Result<(), StaleReason> {
        if self.job.status.is_terminal() {
            return if self.job.status == *status {
                Ok(())
            } else {
                Err(StaleReason::TerminalSticky)
            };
        }

        let newer = self.status_at.is_none_or(|at| timestamp >= at);
        if !status.is_terminal() && !newer {
            return Err(StaleReason::OlderTimestamp);
        }

        self.job.status = status.clone();
        self.status_at = Some(self.status_at.map_or(timestamp, |at| at.max(timestamp)));
        Ok(())
    }
}

#[derive(Default)]
pub struct JobStateStore {
    jobs: HashMap<String, Entry>,
    last_snapshot_time: f64,
    next_seen: u64,
    last_ticket: u64,
    applied_ticket: u64,
    diagnostics: Diagnostics,
    listeners: Vec<Listener>,
    /// Ids of terminal jobs removed by a snapshot, oldest first.
    removed: HashSet<String>,
    removed_order: VecDeque<String>,
}

impl JobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback fired after every insert, update or removal.
    pub fn subscribe(&mut self, listener: impl FnMut(&StoreChange) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id).map(|e| &e.job)
    }

    /// All jobs in first-seen order.
    pub fn jobs(&self) -> Vec<&Job> {
        let mut entries: Vec<&Entry> = self.jobs.values().collect();
        entries.sort_by_key(|e| e.seen);
        entries.into_iter().map(|e| &e.job).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn last_snapshot_time(&self) -> f64 {
        self.last_snapshot_time
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Reserve a ticket for a snapshot request about to be issued.
    pub fn begin_snapshot(&mut self) -> SnapshotTicket {
        self.last_ticket += 1;
        SnapshotTicket(self.last_ticket)
    }

    /// Apply a snapshot unless a response to a newer request was already applied.
    pub fn apply_ticketed_snapshot(
        &mut self,
        ticket: SnapshotTicket,
        snapshot: Snapshot,
    ) -> SnapshotOutcome {
        if ticket.0 < self.applied_ticket {
            self.diagnostics.snapshots_superseded += 1;
            debug!(
                ticket = ticket.0,
                applied = self.applied_ticket,
                "Discarding superseded snapshot"
            );
            return SnapshotOutcome {
                superseded: true,
                ..Default::default()
            };
        }
        self.applied_ticket = ticket.0;
        self.apply_snapshot(snapshot)
    }

    /// Merge a full snapshot into the store.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> SnapshotOutcome {
        let fetched_at = snapshot.fetched_at;
        let mut outcome = SnapshotOutcome::default();
        let mut changes = Vec::new();
        let mut present = HashSet::with_capacity(snapshot.jobs.len());

        for mut incoming in snapshot.jobs {
            present.insert(incoming.job_id.clone());

            let Some(entry) = self.jobs.get_mut(&incoming.job_id) else {
                // The backend lists it again, so it is no longer gone.
                self.forget_removed(&incoming.job_id);
                incoming.last_updated = fetched_at;
                let seen = self.next_seen;
                self.next_seen += 1;
                changes.push(StoreChange::Inserted(incoming.clone()));
                self.jobs.insert(
                    incoming.job_id.clone(),
                    Entry {
                        status_at: Some(fetched_at),
                        progress_at: f64::NEG_INFINITY,
                        job: incoming,
                        seen,
                    },
                );
                outcome.inserted += 1;
                continue;
            };

            let before = entry.job.clone();

            // The package never changes for a job, so filling it in is always safe.
            if entry.job.package.is_none() {
                entry.job.package = incoming.package.clone();
            }

            if fetched_at >= entry.job.last_updated {
                if entry.write_status(&incoming.status, fetched_at).is_err() {
                    outcome.stale += 1;
                    self.diagnostics.stale_writes += 1;
                }
                let job = &mut entry.job;
                job.exit_code = incoming.exit_code.or(job.exit_code);
                job.created_at = incoming.created_at.or(job.created_at);
                job.started_at = incoming.started_at.or(job.started_at);
                job.finished_at = incoming.finished_at.or(job.finished_at);
                job.progress = incoming.progress.or(job.progress);
                job.last_updated = fetched_at;
            } else {
                outcome.stale += 1;
                self.diagnostics.stale_writes += 1;
                debug!(
                    job_id = %incoming.job_id,
                    fetched_at,
                    last_updated = entry.job.last_updated,
                    "Snapshot record older than live state"
                );
            }

            if entry.job != before {
                changes.push(StoreChange::Updated(entry.job.clone()));
                outcome.updated += 1;
            }
        }

        let removable: Vec<String> = self
            .jobs
            .iter()
            .filter(|(id, e)| {
                !present.contains(*id)
                    && e.job.status.is_terminal()
                    && e.job.last_updated <= fetched_at
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in removable {
            if let Some(entry) = self.jobs.remove(&id) {
                self.remember_removed(id);
                changes.push(StoreChange::Removed(entry.job));
                outcome.removed += 1;
            }
        }

        self.last_snapshot_time = self.last_snapshot_time.max(fetched_at);
        self.diagnostics.snapshots_applied += 1;
        debug!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            removed = outcome.removed,
            stale = outcome.stale,
            "Snapshot applied"
        );

        for change in changes {
            self.notify(&change);
        }
        outcome
    }

    /// Merge one pushed event. Never fails.
    pub fn apply_event(&mut self, event: &Event) -> EventOutcome {
        match event {
            Event::Job(event) => self.apply_job_event(event),
            Event::Other { kind } => {
                self.diagnostics.ignored_events += 1;
                debug!(kind = %kind, "Ignoring non-job event");
                EventOutcome::Ignored
            }
        }
    }

    fn apply_job_event(&mut self, event: &JobEvent) -> EventOutcome {
        if self.removed.contains(&event.job_id) {
            self.diagnostics.stale_writes += 1;
            debug!(
                job_id = %event.job_id,
                kind = %event.kind(),
                "Event for a removed job ignored"
            );
            return EventOutcome::StaleWriteIgnored {
                job_id: event.job_id.clone(),
                reason: StaleReason::Removed,
            };
        }

        let inserted = !self.jobs.contains_key(&event.job_id);
        if inserted {
            let seen = self.next_seen;
            self.next_seen += 1;
            self.jobs.insert(
                event.job_id.clone(),
                Entry {
                    job: Job::new(event.job_id.clone(), JobStatus::Running),
                    status_at: None,
                    progress_at: f64::NEG_INFINITY,
                    seen,
                },
            );
        }
        let Some(entry) = self.jobs.get_mut(&event.job_id) else {
            return EventOutcome::Ignored;
        };

        let before = entry.job.clone();
        let ts = event.timestamp;

        let result = match &event.payload {
            Payload::Started { package, status } => {
                if entry.job.package.is_none() {
                    entry.job.package = package.clone();
                }
                let result = entry.write_status(status, ts);
                if result.is_ok()
                    && entry.job.status == JobStatus::Running
                    && entry.job.started_at.is_none()
                {
                    entry.job.started_at = Some(ts);
                }
                result
            }
            Payload::Progress { percent } => {
                if ts >= entry.progress_at {
                    entry.job.progress = Some(*percent);
                    entry.progress_at = ts;
                    Ok(())
                } else {
                    Err(StaleReason::OlderTimestamp)
                }
            }
            Payload::Stdout { .. } => Ok(()),
            Payload::Finished { status, exit_code } => {
                let was_terminal = entry.job.status.is_terminal();
                let result = entry.write_status(status, ts);
                if result.is_ok() && !was_terminal {
                    entry.job.exit_code = exit_code.or(entry.job.exit_code);
                    entry.job.finished_at = Some(ts);
                }
                result
            }
        };

        let outcome = match result {
            Ok(()) => {
                entry.job.last_updated = entry.job.last_updated.max(ts);
                self.diagnostics.events_applied += 1;
                EventOutcome::Applied
            }
            Err(reason) => {
                self.diagnostics.stale_writes += 1;
                debug!(
                    job_id = %event.job_id,
                    kind = %event.kind(),
                    timestamp = ts,
                    ?reason,
                    "Stale write ignored"
                );
                EventOutcome::StaleWriteIgnored {
                    job_id: event.job_id.clone(),
                    reason,
                }
            }
        };

        let change = if inserted {
            Some(StoreChange::Inserted(entry.job.clone()))
        } else if entry.job != before {
            Some(StoreChange::Updated(entry.job.clone()))
        } else {
            None
        };
        if let Some(change) = change {
            self.notify(&change);
        }
        outcome
    }

    /// Pull a fresh snapshot and merge it. Heals any gap left by a dropped
    /// event stream. The store is untouched if the fetch fails.
    pub async fn reconcile<S>(&mut self, source: &S) -> Result<SnapshotOutcome, TransportError>
    where
        S: SnapshotSource + ?Sized,
    {
        let ticket = self.begin_snapshot();
        let snapshot = source.fetch_all().await.inspect_err(|e| {
            warn!(error = %e, "Snapshot fetch failed; keeping current state");
        })?;
        Ok(self.apply_ticketed_snapshot(ticket, snapshot))
    }

    fn remember_removed(&mut self, job_id: String) {
        if !self.removed.insert(job_id.clone()) {
            return;
        }
        self.removed_order.push_back(job_id);
        while self.removed_order.len() > TOMBSTONE_CAPACITY {
            if let Some(oldest) = self.removed_order.pop_front() {
                self.removed.remove(&oldest);
            }
        }
    }

    fn forget_removed(&mut self, job_id: &str) {
        if self.removed.remove(job_id) {
            self.removed_order.retain(|id| id != job_id);
        }
    }

    fn notify(&mut self, change: &StoreChange) {
        for listener in &mut self.listeners {
            listener(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn job(id: &str, status: JobStatus) -> Job {
        Job::new(id, status).with_package(format!("pkg-{}", id))
    }

    fn snapshot(fetched_at: f64, jobs: Vec<Job>) -> Snapshot {
        Snapshot { jobs, fetched_at }
    }

    fn started(id: &str, ts: f64, status: JobStatus) -> Event {
        Event::Job(JobEvent {
            job_id: id.to_string(),
            timestamp: ts,
            payload: Payload::Started {
                package: None,
                status,
            },
        })
    }

    fn finished(id: &str, ts: f64, status: JobStatus) -> Event {
        JobEvent::finished(id, ts, status).into()
    }

    struct FixedSource(Result<Snapshot, TransportError>);

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch_all(&self) -> Result<Snapshot, TransportError> {
            self.0.clone()
        }
    }

    fn store_state(store: &JobStateStore) -> Vec<Job> {
        store.jobs().into_iter().cloned().collect()
    }

    #[test]
    fn test_snapshot_inserts_jobs() {
        let mut store = JobStateStore::new();
        let outcome = store.apply_snapshot(snapshot(
            10.0,
            vec![job("1", JobStatus::Queued), job("2", JobStatus::Running)],
        ));

        assert_eq!(outcome.inserted, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("1").unwrap().last_updated, 10.0);
        assert_eq!(store.last_snapshot_time(), 10.0);
    }

    #[test]
    fn test_snapshot_application_is_idempotent() {
        let mut store = JobStateStore::new();
        store.apply_event(&started("1", 5.0, JobStatus::Running));
        let snap = snapshot(
            10.0,
            vec![job("1", JobStatus::Running), job("2", JobStatus::Succeeded)],
        );

        store.apply_snapshot(snap.clone());
        let first = store_state(&store);
        let outcome = store.apply_snapshot(snap);

        assert_eq!(store_state(&store), first);
        assert_eq!(outcome.inserted + outcome.updated + outcome.removed, 0);
    }

    #[test]
    fn test_snapshot_never_regresses_newer_event() {
        let mut store = JobStateStore::new();
        store.apply_event(&started("1", 20.0, JobStatus::Running));

        let outcome = store.apply_snapshot(snapshot(15.0, vec![job("1", JobStatus::Queued)]));

        assert_eq!(store.get("1").unwrap().status, JobStatus::Running);
        assert_eq!(outcome.stale, 1);
        // The package is still filled in from the older snapshot.
        assert_eq!(store.get("1").unwrap().package.as_deref(), Some("pkg-1"));
    }

    #[test]
    fn test_newer_snapshot_overwrites_event_state() {
        let mut store = JobStateStore::new();
        store.apply_event(&started("1", 20.0, JobStatus::Queued));

        store.apply_snapshot(snapshot(25.0, vec![job("1", JobStatus::Running)]));

        let j = store.get("1").unwrap();
        assert_eq!(j.status, JobStatus::Running);
        assert_eq!(j.last_updated, 25.0);
    }

    #[test]
    fn test_snapshot_preserves_absent_active_jobs() {
        let mut store = JobStateStore::new();
        store.apply_snapshot(snapshot(
            10.0,
            vec![job("queued", JobStatus::Queued), job("run", JobStatus::Running)],
        ));
        store.apply_event(&started("other", 11.0, JobStatus::Queued));
        store.apply_snapshot(snapshot(
            10.5,
            vec![job("x", JobStatus::Other("paused".into()))],
        ));

        store.apply_snapshot(snapshot(30.0, vec![]));

        assert!(store.get("queued").is_some());
        assert!(store.get("run").is_some());
        assert!(store.get("other").is_some());
        assert!(store.get("x").is_some());
    }

    #[test]
    fn test_snapshot_removes_absent_terminal_jobs() {
        let mut store = JobStateStore::new();
        store.apply_snapshot(snapshot(
            10.0,
            vec![job("done", JobStatus::Succeeded), job("bad", JobStatus::Failed)],
        ));

        let outcome = store.apply_snapshot(snapshot(20.0, vec![]));

        assert_eq!(outcome.removed, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_older_snapshot_keeps_recently_finished_job() {
        let mut store = JobStateStore::new();
        store.apply_event(&finished("1", 50.0, JobStatus::Succeeded));

        store.apply_snapshot(snapshot(40.0, vec![]));

        assert_eq!(store.get("1").unwrap().status, JobStatus::Succeeded);
    }

    #[test]
    fn test_last_snapshot_time_is_monotonic() {
        let mut store = JobStateStore::new();
        store.apply_snapshot(snapshot(30.0, vec![]));
        store.apply_snapshot(snapshot(20.0, vec![]));
        assert_eq!(store.last_snapshot_time(), 30.0);
    }

    #[test]
    fn test_monotonic_merge_in_either_order() {
        let e1 = started("j", 10.0, JobStatus::Running);
        let e2 = started("j", 5.0, JobStatus::Queued);

        let mut forward = JobStateStore::new();
        forward.apply_event(&e1);
        let outcome = forward.apply_event(&e2);
        assert_eq!(forward.get("j").unwrap().status, JobStatus::Running);
        assert_eq!(
            outcome,
            EventOutcome::StaleWriteIgnored {
                job_id: "j".into(),
                reason: StaleReason::OlderTimestamp
            }
        );

        let mut reverse = JobStateStore::new();
        reverse.apply_event(&e2);
        reverse.apply_event(&e1);
        assert_eq!(reverse.get("j").unwrap().status, JobStatus::Running);
    }

    #[test]
    fn test_equal_timestamps_later_arrival_wins() {
        let mut store = JobStateStore::new();
        store.apply_event(&started("j", 10.0, JobStatus::Queued));
        store.apply_event(&started("j", 10.0, JobStatus::Running));
        assert_eq!(store.get("j").unwrap().status, JobStatus::Running);

        store.apply_event(&started("j", 10.0, JobStatus::Queued));
        assert_eq!(store.get("j").unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut store = JobStateStore::new();
        store.apply_event(&finished("j", 100.0, JobStatus::Succeeded));

        for ts in [50.0, 100.0, 200.0] {
            let outcome = store.apply_event(&started("j", ts, JobStatus::Running));
            assert_eq!(
                outcome,
                EventOutcome::StaleWriteIgnored {
                    job_id: "j".into(),
                    reason: StaleReason::TerminalSticky
                }
            );
        }
        store.apply_event(&finished("j", 300.0, JobStatus::Failed));
        store.apply_snapshot(snapshot(400.0, vec![job("j", JobStatus::Running)]));

        assert_eq!(store.get("j").unwrap().status, JobStatus::Succeeded);
        assert_eq!(store.diagnostics().stale_writes, 5);
    }

    #[test]
    fn test_finish_beats_older_clock_on_active_job() {
        let mut store = JobStateStore::new();
        store.apply_event(&started("j", 100.0, JobStatus::Running));
        store.apply_event(&finished("j", 99.0, JobStatus::Failed));
        assert_eq!(store.get("j").unwrap().status, JobStatus::Failed);
        assert_eq!(store.get("j").unwrap().finished_at, Some(99.0));
    }

    #[test]
    fn test_progress_never_changes_status() {
        let mut store = JobStateStore::new();
        store.apply_event(&started("j", 1.0, JobStatus::Queued));
        store.apply_event(&JobEvent::progress("j", 2.0, 40).into());

        let j = store.get("j").unwrap();
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.progress, Some(40));
        assert_eq!(j.last_updated, 2.0);
    }

    #[test]
    fn test_stale_progress_does_not_regress() {
        let mut store = JobStateStore::new();
        store.apply_event(&JobEvent::progress("j", 5.0, 80).into());
        let outcome = store.apply_event(&JobEvent::progress("j", 4.0, 20).into());

        assert_eq!(store.get("j").unwrap().progress, Some(80));
        assert!(matches!(outcome, EventOutcome::StaleWriteIgnored { .. }));
    }

    #[test]
    fn test_event_for_unknown_job_creates_running_record() {
        let mut store = JobStateStore::new();
        store.apply_event(&JobEvent::stdout("new", 3.0, "hello").into());

        let j = store.get("new").unwrap();
        assert_eq!(j.status, JobStatus::Running);
        assert!(j.package.is_none());

        // Inferred status gives way to any status-bearing event.
        store.apply_event(&started("new", 1.0, JobStatus::Queued));
        assert_eq!(store.get("new").unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn test_non_job_events_are_ignored() {
        let mut store = JobStateStore::new();
        let outcome = store.apply_event(&Event::Other {
            kind: "heartbeat".into(),
        });
        assert_eq!(outcome, EventOutcome::Ignored);
        assert!(store.is_empty());
        assert_eq!(store.diagnostics().ignored_events, 1);
    }

    #[test]
    fn test_superseded_snapshot_is_discarded() {
        let mut store = JobStateStore::new();
        let slow = store.begin_snapshot();
        let fast = store.begin_snapshot();

        store.apply_ticketed_snapshot(fast, snapshot(20.0, vec![job("1", JobStatus::Running)]));
        let outcome =
            store.apply_ticketed_snapshot(slow, snapshot(10.0, vec![job("1", JobStatus::Queued)]));

        assert!(outcome.superseded);
        assert_eq!(store.get("1").unwrap().status, JobStatus::Running);
        assert_eq!(store.diagnostics().snapshots_superseded, 1);
    }

    #[test]
    fn test_listeners_see_complete_changes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut store = JobStateStore::new();
        let sink = seen.clone();
        store.subscribe(move |change| sink.lock().unwrap().push(change.clone()));

        store.apply_event(&started("j", 1.0, JobStatus::Running));
        store.apply_event(&started("j", 0.5, JobStatus::Queued)); // stale, no change
        store.apply_event(&finished("j", 2.0, JobStatus::Succeeded));
        store.apply_snapshot(snapshot(3.0, vec![]));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(matches!(&seen[0], StoreChange::Inserted(j) if j.status == JobStatus::Running));
        assert!(matches!(&seen[1], StoreChange::Updated(j) if j.status == JobStatus::Succeeded));
        assert!(matches!(&seen[2], StoreChange::Removed(j) if j.job_id == "j"));
    }

    #[tokio::test]
    async fn test_reconcile_heals_gap() {
        let mut store = JobStateStore::new();
        let source = FixedSource(Ok(snapshot(10.0, vec![job("1", JobStatus::Running)])));

        store.reconcile(&source).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_reconcile_failure_leaves_state_unchanged() {
        let mut store = JobStateStore::new();
        store.apply_event(&started("1", 1.0, JobStatus::Running));
        let before = store_state(&store);
        let source = FixedSource(Err(TransportError::Status {
            url: "http://x/queue".into(),
            status: 503,
        }));

        let result = store.reconcile(&source).await;

        assert!(matches!(result, Err(TransportError::Status { status: 503, .. })));
        assert_eq!(store_state(&store), before);
        assert_eq!(store.diagnostics().snapshots_applied, 0);
    }

    #[test]
    fn test_late_output_cannot_revive_removed_job() {
        let mut store = JobStateStore::new();
        store.apply_event(&finished("7", 50.0, JobStatus::Succeeded));
        store.apply_snapshot(snapshot(60.0, vec![]));
        assert!(store.get("7").is_none());

        let outcome = store.apply_event(&JobEvent::stdout("7", 49.0, "late line").into());
        store.apply_event(&JobEvent::progress("7", 49.5, 90).into());
        store.apply_snapshot(snapshot(100.0, vec![]));

        assert_eq!(
            outcome,
            EventOutcome::StaleWriteIgnored {
                job_id: "7".into(),
                reason: StaleReason::Removed
            }
        );
        assert!(store.get("7").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_relisted_job_accepts_events_again() {
        let mut store = JobStateStore::new();
        store.apply_event(&finished("7", 50.0, JobStatus::Failed));
        store.apply_snapshot(snapshot(60.0, vec![]));

        store.apply_snapshot(snapshot(70.0, vec![job("7", JobStatus::Failed)]));
        let outcome = store.apply_event(&JobEvent::stdout("7", 71.0, "still here").into());

        assert_eq!(outcome, EventOutcome::Applied);
        assert_eq!(store.get("7").unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn test_removed_ids_are_bounded() {
        let mut store = JobStateStore::new();
        let total = TOMBSTONE_CAPACITY + 10;
        for i in 0..total {
            store.apply_event(&finished(&i.to_string(), 1.0, JobStatus::Succeeded));
        }
        store.apply_snapshot(snapshot(2.0, vec![]));

        assert_eq!(store.removed.len(), TOMBSTONE_CAPACITY);
        assert_eq!(store.removed_order.len(), TOMBSTONE_CAPACITY);
    }

    #[test]
    fn test_jobs_are_listed_in_first_seen_order() {
        let mut store = JobStateStore::new();
        store.apply_event(&started("b", 1.0, JobStatus::Running));
        store.apply_snapshot(snapshot(2.0, vec![job("a", JobStatus::Queued), job("b", JobStatus::Running)]));
        store.apply_event(&started("c", 3.0, JobStatus::Running));

        let ids: Vec<&str> = store.jobs().iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
