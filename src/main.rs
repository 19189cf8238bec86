use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use debease::config::AppConfig;
use debease::context::AppContext;
use debease::core::SnapshotSource;
use debease::logging::{self, LogConfig};
use debease::cli;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "debease")]
#[command(about = "Live view of a package install queue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: GlobalArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive queue, catalog and log viewer
    Watch {
        /// Preload the catalog with this search
        #[arg(long)]
        query: Option<String>,
    },
    /// Print job output and status changes as they happen
    Follow,
    /// Search the package catalog
    Search {
        query: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        size: Option<u32>,
    },
    /// Queue a package for installation
    Install { package: String },
    /// Print the current install queue
    Queue,
    /// Print the resolved configuration
    Config,
}

#[derive(Args, Serialize)]
struct GlobalArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    server_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    request_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(short, long, global = true)]
    verbose: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::new(Some(&cli.overrides))?;

    // The TUI owns the terminal, so its logs always go to a file.
    let log_file = match &cli.command {
        Commands::Watch { .. } => Some(
            config
                .log_file
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("debease-watch.log")),
        ),
        _ => config.log_file.clone(),
    };
    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
        file: log_file,
    })?;

    if let Commands::Config = &cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let ctx = AppContext::new(config)?;
    match cli.command {
        Commands::Watch { query } => cli::tui::run(&ctx, query)
            .await
            .context("Terminal UI failed")?,
        Commands::Follow => cli::follow::run(&ctx)
            .await
            .context("Failed to follow the install queue")?,
        Commands::Search { query, page, size } => run_search(&ctx, query, page, size)
            .await
            .context("Catalog search failed")?,
        Commands::Install { package } => run_install(&ctx, &package)
            .await
            .with_context(|| format!("Failed to queue {package}"))?,
        Commands::Queue => run_queue(&ctx)
            .await
            .context("Failed to fetch the install queue")?,
        Commands::Config => {}
    }

    Ok(())
}

async fn run_search(
    ctx: &AppContext,
    query: Option<String>,
    page: Option<u32>,
    size: Option<u32>,
) -> Result<()> {
    let results = ctx.catalog().search(query.as_deref(), page, size).await?;
    if results.items.is_empty() {
        println!("No packages found.");
        return Ok(());
    }
    for row in debease::core::project_catalog(&results.items) {
        println!("{}", row.label);
    }
    println!(
        "-- page {} ({} of {} matches)",
        results.page,
        results.items.len(),
        results.total
    );
    Ok(())
}

async fn run_install(ctx: &AppContext, package: &str) -> Result<()> {
    let ack = ctx.catalog().enqueue(package).await?;
    let status = ack
        .status
        .map_or_else(|| "queued".to_string(), |s| s.to_string());
    println!("{package}: job {} ({status})", ack.job_id);
    Ok(())
}

async fn run_queue(ctx: &AppContext) -> Result<()> {
    let snapshot = ctx.snapshots().fetch_all().await?;
    if snapshot.jobs.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    println!("{:<10} {:<28} {:<10} {:>8}", "JOB", "PACKAGE", "STATUS", "EXIT");
    for job in &snapshot.jobs {
        println!(
            "{:<10} {:<28} {:<10} {:>8}",
            job.job_id,
            job.package.as_deref().unwrap_or("?"),
            job.status.as_str(),
            job.exit_code.map_or("-".to_string(), |c| c.to_string()),
        );
    }
    Ok(())
}
