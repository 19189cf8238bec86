//! Render-ready projections of store and log state.
//!
//! Everything here is a pure function of its inputs.

use std::collections::BTreeMap;

use serde::Serialize;

use super::logs::LogAggregator;
use super::models::Package;
use super::store::JobStateStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionOptions {
    /// How many of the newest log lines to include per job.
    pub log_tail: usize,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self { log_tail: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRow {
    pub job_id: String,
    pub package: String,
    pub status: String,
    pub terminal: bool,
    pub progress: Option<u8>,
    pub exit_code: Option<i32>,
    pub last_updated: f64,
    pub log: Vec<String>,
    /// Total lines retained for the job, including those cut by `log_tail`.
    pub log_len: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueView {
    pub jobs: Vec<JobRow>,
    /// Job count per status label.
    pub counts: BTreeMap<String, usize>,
}

impl QueueView {
    pub fn job(&self, job_id: &str) -> Option<&JobRow> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    pub name: String,
    pub label: String,
}

/// Project the job store and logs into display rows, in first-seen order.
pub fn project(
    store: &JobStateStore,
    logs: &LogAggregator,
    options: &ProjectionOptions,
) -> QueueView {
    let mut counts = BTreeMap::new();
    let jobs = store
        .jobs()
        .into_iter()
        .map(|job| {
            *counts.entry(job.status.to_string()).or_insert(0) += 1;
            JobRow {
                job_id: job.job_id.clone(),
                package: job.package.clone().unwrap_or_else(|| "?".to_string()),
                status: job.status.to_string(),
                terminal: job.status.is_terminal(),
                progress: job.progress,
                exit_code: job.exit_code,
                last_updated: job.last_updated,
                log: logs
                    .tail(&job.job_id, options.log_tail)
                    .into_iter()
                    .map(|l| l.text.clone())
                    .collect(),
                log_len: logs.len(&job.job_id),
            }
        })
        .collect();

    QueueView { jobs, counts }
}

/// Format catalog entries for a listing.
pub fn project_catalog(packages: &[Package]) -> Vec<CatalogRow> {
    packages
        .iter()
        .map(|p| CatalogRow {
            name: p.name.clone(),
            label: if p.description.is_empty() {
                p.name.clone()
            } else {
                format!("{} - {}", p.name, p.description)
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Event, Job, JobEvent, JobStatus, Snapshot};

    fn feed(store: &mut JobStateStore, logs: &mut LogAggregator, event: Event) {
        store.apply_event(&event);
        logs.append(&event);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let mut store = JobStateStore::new();
        let mut logs = LogAggregator::new();
        store.apply_snapshot(Snapshot {
            jobs: vec![
                Job::new("1", JobStatus::Queued).with_package("vim"),
                Job::new("2", JobStatus::Succeeded).with_package("git"),
                Job::new("3", JobStatus::Running).with_package("curl"),
            ],
            fetched_at: 1.0,
        });
        feed(&mut store, &mut logs, JobEvent::stdout("3", 2.0, "fetching").into());

        let options = ProjectionOptions::default();
        let first = project(&store, &logs, &options);
        let second = project(&store, &logs, &options);

        assert_eq!(first, second);
        assert_eq!(first.jobs.len(), 3);
        assert_eq!(first.counts.get("queued"), Some(&1));
        assert_eq!(first.counts.get("succeeded"), Some(&1));
        assert_eq!(first.counts.get("running"), Some(&1));
        assert_eq!(first.jobs.iter().filter(|j| !j.terminal).count(), 2);
    }

    #[test]
    fn test_log_tail_is_applied() {
        let mut store = JobStateStore::new();
        let mut logs = LogAggregator::new();
        for (i, line) in ["a", "b", "c"].into_iter().enumerate() {
            feed(&mut store, &mut logs, JobEvent::stdout("j", i as f64, line).into());
        }

        let view = project(&store, &logs, &ProjectionOptions { log_tail: 2 });
        let row = view.job("j").unwrap();

        assert_eq!(row.log, vec!["b", "c"]);
        assert_eq!(row.log_len, 3);
        assert_eq!(row.package, "?");
    }

    #[test]
    fn test_catalog_rows() {
        let rows = project_catalog(&[
            Package {
                name: "vim".into(),
                description: "vim package".into(),
                version: "latest".into(),
                tags: vec![],
            },
            Package {
                name: "bare".into(),
                description: String::new(),
                version: String::new(),
                tags: vec![],
            },
        ]);

        assert_eq!(rows[0].label, "vim - vim package");
        assert_eq!(rows[1].label, "bare");
    }
}
