//! Headless follower: prints job output and status changes as they arrive.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::core::models::{Event, Job, JobStatus, Payload};
use crate::core::store::{JobStateStore, StoreChange};
use crate::error::TransportError;
use crate::stream::StreamItem;

pub async fn run(ctx: &AppContext) -> Result<()> {
    let mut stream = ctx.event_stream()?;
    let source = ctx.snapshots();
    let mut store = JobStateStore::new();

    let mut printed: HashMap<String, JobStatus> = HashMap::new();
    store.subscribe(move |change| {
        if let Some(line) = status_line(&mut printed, change) {
            println!("{line}");
        }
    });

    let mut items = stream.subscribe();
    stream.connect();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let item = tokio::select! {
            _ = &mut ctrl_c => break,
            item = items.next() => item,
        };
        match item {
            None => break,
            Some(StreamItem::Connected) => {
                info!("Connected; pulling queue");
                if let Err(e) = store.reconcile(&source).await {
                    eprintln!("{}", pull_failed_line(&e));
                }
            }
            Some(StreamItem::Gap { missed }) => {
                warn!(missed, "Missed push messages; pulling queue");
                if let Err(e) = store.reconcile(&source).await {
                    eprintln!("{}", pull_failed_line(&e));
                }
            }
            Some(StreamItem::Event(event)) => {
                store.apply_event(&event);
                if let Some(line) = output_line(&event) {
                    println!("{line}");
                }
            }
            Some(StreamItem::Disconnected { reason }) => {
                eprintln!("-- disconnected: {reason}; reconnecting");
            }
            Some(StreamItem::DecodeFailed(_)) => {}
        }
    }

    stream.shutdown().await;
    Ok(())
}

/// A line for a status change, or `None` if this job's status was already printed.
fn status_line(printed: &mut HashMap<String, JobStatus>, change: &StoreChange) -> Option<String> {
    let job = match change {
        StoreChange::Inserted(job) | StoreChange::Updated(job) => job,
        StoreChange::Removed(_) => return None,
    };
    if printed.get(&job.job_id) == Some(&job.status) {
        return None;
    }
    printed.insert(job.job_id.clone(), job.status.clone());
    Some(describe(job))
}

fn describe(job: &Job) -> String {
    let package = job.package.as_deref().unwrap_or("?");
    match job.exit_code {
        Some(code) if job.status.is_terminal() => {
            format!("[{}] {} {} (exit {})", job.job_id, package, job.status, code)
        }
        _ => format!("[{}] {} {}", job.job_id, package, job.status),
    }
}

/// The pull is retried on the next connect, so this is a notice, not an error.
fn pull_failed_line(err: &TransportError) -> String {
    format!("-- queue refresh failed: {err}; showing live events only")
}

fn output_line(event: &Event) -> Option<String> {
    let Event::Job(event) = event else {
        return None;
    };
    match &event.payload {
        Payload::Stdout { line } => Some(format!("[{}] | {}", event.job_id, line)),
        _ => None,
    }
}
