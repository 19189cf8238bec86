pub mod logs;
pub mod models;
pub mod projector;
pub mod store;

pub use logs::LogAggregator;
pub use models::{
    CatalogPage, EnqueueAck, Event, EventKind, Job, JobEvent, JobStatus, LogLine, Package,
    Payload, Snapshot,
};
pub use projector::{CatalogRow, JobRow, ProjectionOptions, QueueView, project, project_catalog};
pub use store::{
    Diagnostics, EventOutcome, JobStateStore, SnapshotOutcome, SnapshotSource, SnapshotTicket,
    StaleReason, StoreChange,
};
