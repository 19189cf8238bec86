//! Per-job transcript of stdout and progress lines.
//!
//! Lines are kept in receipt order, not timestamp order, and duplicates are
//! kept: the log records what arrived, it is not job state.

use std::collections::{HashMap, VecDeque};

use super::models::{Event, LogLine, Payload};

#[derive(Debug, Default)]
pub struct LogAggregator {
    lines: HashMap<String, VecDeque<LogLine>>,
    /// Per-job line cap. `None` keeps everything.
    max_lines_per_job: Option<usize>,
    evicted: u64,
}

impl LogAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(max_lines_per_job: usize) -> Self {
        Self {
            max_lines_per_job: Some(max_lines_per_job.max(1)),
            ..Self::default()
        }
    }

    /// Record a stdout or progress event. Returns whether a line was added.
    pub fn append(&mut self, event: &Event) -> bool {
        let Event::Job(event) = event else {
            return false;
        };

        let text = match &event.payload {
            Payload::Stdout { line } => line.clone(),
            Payload::Progress { percent } => format!("{}%", percent),
            Payload::Started { .. } | Payload::Finished { .. } => return false,
        };

        let lines = self.lines.entry(event.job_id.clone()).or_default();
        lines.push_back(LogLine {
            job_id: event.job_id.clone(),
            timestamp: event.timestamp,
            kind: event.kind(),
            text,
        });

        if let Some(max) = self.max_lines_per_job {
            while lines.len() > max {
                lines.pop_front();
                self.evicted += 1;
            }
        }
        true
    }

    /// All retained lines for a job, oldest first.
    pub fn lines(&self, job_id: &str) -> impl Iterator<Item = &LogLine> {
        self.lines.get(job_id).into_iter().flatten()
    }

    /// The last `n` lines for a job, oldest first.
    pub fn tail(&self, job_id: &str, n: usize) -> Vec<&LogLine> {
        let Some(lines) = self.lines.get(job_id) else {
            return Vec::new();
        };
        lines.iter().skip(lines.len().saturating_sub(n)).collect()
    }

    pub fn len(&self, job_id: &str) -> usize {
        self.lines.get(job_id).map_or(0, VecDeque::len)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
