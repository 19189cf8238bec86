use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DecodeError;

/// Lifecycle state of an install job as reported by the backend.
///
/// Unknown spellings are carried through verbatim rather than rejected, since
/// the backend owns the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Self::Queued,
            "running" => Self::Running,
            // Older backends report success as "finished".
            "succeeded" | "finished" => Self::Succeeded,
            "failed" => Self::Failed,
            _ => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One install task. `job_id` is the identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(deserialize_with = "job_id_from_wire")]
    pub job_id: String,
    #[serde(default)]
    pub package: Option<String>,
    pub status: JobStatus,
    /// Logical time of the newest information merged into this record.
    /// Not part of the wire format; the store sets it.
    #[serde(default)]
    pub last_updated: f64,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub started_at: Option<f64>,
    #[serde(default)]
    pub finished_at: Option<f64>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            package: None,
            status,
            last_updated: 0.0,
            progress: None,
            exit_code: None,
            created_at: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }
}

/// A full job list returned by `GET /queue`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub jobs: Vec<Job>,
    /// When the list was produced: the server's `Date`, else local issue time.
    pub fetched_at: f64,
}

/// The kinds of job-scoped events the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JobStarted,
    Progress,
    Stdout,
    JobFinished,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobStarted => "job_started",
            Self::Progress => "progress",
            Self::Stdout => "stdout",
            Self::JobFinished => "job_finished",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Started {
        package: Option<String>,
        status: JobStatus,
    },
    Progress {
        percent: u8,
    },
    Stdout {
        line: String,
    },
    Finished {
        status: JobStatus,
        exit_code: Option<i32>,
    },
}

impl Payload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Started { .. } => EventKind::JobStarted,
            Self::Progress { .. } => EventKind::Progress,
            Self::Stdout { .. } => EventKind::Stdout,
            Self::Finished { .. } => EventKind::JobFinished,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub job_id: String,
    /// Sender wall-clock seconds since epoch.
    pub timestamp: f64,
    pub payload: Payload,
}

impl JobEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn started(job_id: impl Into<String>, timestamp: f64, package: Option<&str>) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp,
            payload: Payload::Started {
                package: package.map(str::to_string),
                status: JobStatus::Running,
            },
        }
    }

    pub fn progress(job_id: impl Into<String>, timestamp: f64, percent: u8) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp,
            payload: Payload::Progress {
                percent: percent.min(100),
            },
        }
    }

    pub fn stdout(job_id: impl Into<String>, timestamp: f64, line: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp,
            payload: Payload::Stdout { line: line.into() },
        }
    }

    pub fn finished(job_id: impl Into<String>, timestamp: f64, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp,
            payload: Payload::Finished {
                status,
                exit_code: None,
            },
        }
    }
}

/// A decoded push-channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Job(JobEvent),
    /// Non-job stream notifications and types this client does not know yet.
    Other { kind: String },
}

impl From<JobEvent> for Event {
    fn from(event: JobEvent) -> Self {
        Event::Job(event)
    }
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, deserialize_with = "optional_job_id_from_wire")]
    job_id: Option<String>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    package: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    percent: Option<f64>,
    #[serde(default)]
    line: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    exit_code: Option<i32>,
}

impl Event {
    /// Decode one text frame from the push channel.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let wire: WireEvent = serde_json::from_str(text)?;

        let kind = match wire.kind.as_str() {
            "job_started" => EventKind::JobStarted,
            "progress" => EventKind::Progress,
            "stdout" => EventKind::Stdout,
            "job_finished" => EventKind::JobFinished,
            _ => return Ok(Event::Other { kind: wire.kind }),
        };

        let missing = |field| DecodeError::MissingField {
            kind: wire.kind.clone(),
            field,
        };
        let job_id = wire.job_id.clone().ok_or_else(|| missing("job_id"))?;
        let timestamp = wire.timestamp.ok_or_else(|| missing("timestamp"))?;

        let payload = match kind {
            EventKind::JobStarted => Payload::Started {
                package: wire.package,
                status: wire
                    .status
                    .as_deref()
                    .map(JobStatus::parse)
                    .unwrap_or(JobStatus::Running),
            },
            EventKind::Progress => {
                let percent = wire.percent.ok_or_else(|| missing("percent"))?;
                Payload::Progress {
                    percent: percent.clamp(0.0, 100.0).round() as u8,
                }
            }
            EventKind::Stdout => Payload::Stdout {
                line: wire.line.ok_or_else(|| missing("line"))?,
            },
            EventKind::JobFinished => {
                let status = match (wire.status.as_deref(), wire.success, wire.exit_code) {
                    (Some(s), _, _) => JobStatus::parse(s),
                    (None, Some(true), _) => JobStatus::Succeeded,
                    (None, Some(false), _) => JobStatus::Failed,
                    (None, None, Some(0)) => JobStatus::Succeeded,
                    (None, None, Some(_)) => JobStatus::Failed,
                    (None, None, None) => return Err(missing("status")),
                };
                if !status.is_terminal() {
                    return Err(DecodeError::InvalidField {
                        field: "status",
                        message: format!("job_finished carries non-terminal `{}`", status),
                    });
                }
                Payload::Finished {
                    status,
                    exit_code: wire.exit_code,
                }
            }
        };

        Ok(Event::Job(JobEvent {
            job_id,
            timestamp,
            payload,
        }))
    }
}

/// One transcript line, immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub job_id: String,
    pub timestamp: f64,
    pub kind: EventKind,
    pub text: String,
}

/// A catalog entry from `GET /packages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One page of catalog search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPage {
    #[serde(default)]
    pub total: usize,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
    pub items: Vec<Package>,
}

fn default_page() -> u32 {
    1
}

/// Response to `POST /enqueue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueAck {
    #[serde(deserialize_with = "job_id_from_wire")]
    pub job_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

/// Job ids are opaque; accept both JSON strings and integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireJobId {
    Text(String),
    Int(i64),
}

impl From<WireJobId> for String {
    fn from(id: WireJobId) -> Self {
        match id {
            WireJobId::Text(s) => s,
            WireJobId::Int(n) => n.to_string(),
        }
    }
}

fn job_id_from_wire<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    WireJobId::deserialize(deserializer).map(String::from)
}

fn optional_job_id_from_wire<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Option::<WireJobId>::deserialize(deserializer).map(|id| id.map(String::from))
}
