//! veracity: page acquisition and iterative veracity checking from the command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kodegen_tools_veracity::browser_profile::cleanup_stale_profiles;
use kodegen_tools_veracity::{
    AnomalyTracker, ConfigHandle, ConfigLoader, FactChecker, FnSink, PipelineError, StatusEvent,
};

#[derive(Parser)]
#[command(
    name = "veracity",
    about = "Fetch a page or take pasted content and check whether it is true",
    version
)]
struct Cli {
    /// JSON configuration file. Without it, defaults plus VERACITY_* variables.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a URL, or pasted text and image URLs.
    Check {
        /// Page or image URL to verify.
        #[arg(conflicts_with = "text")]
        url: Option<String>,

        /// Pasted text to verify instead of a URL.
        #[arg(long)]
        text: Option<String>,

        /// Image URL to include with pasted text. Repeatable.
        #[arg(long = "image")]
        images: Vec<String>,
    },

    /// Inspect and prune recorded anti-bot anomalies.
    Anomalies {
        #[command(subcommand)]
        action: AnomalyAction,
    },
}

#[derive(Subcommand)]
enum AnomalyAction {
    /// Print every record as JSON.
    List,
    /// Delete one record and its snapshot.
    Delete { id: String },
    /// Delete every record and snapshot.
    Clear,
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn log_status(event: StatusEvent) {
    match event {
        StatusEvent::Analyzing => info!("Analyzing content"),
        StatusEvent::Searching { query, round } => info!(round, query = %query, "Searching"),
        StatusEvent::SearchFailed {
            query,
            round,
            error,
        } => warn!(round, query = %query, "Search failed: {error}"),
        StatusEvent::DeepAnalysis { round } => info!(round, "Deep analysis"),
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn report_failure(err: &PipelineError) -> ExitCode {
    eprintln!("{}", err.user_message());
    warn!(kind = ?err.kind(), "Check failed: {err}");
    if err.is_aborted() {
        ExitCode::from(130)
    } else {
        ExitCode::FAILURE
    }
}

async fn run_check(
    config: Arc<ConfigHandle>,
    url: Option<String>,
    text: Option<String>,
    images: Vec<String>,
) -> Result<ExitCode> {
    if let Err(e) = cleanup_stale_profiles(Duration::from_secs(3600)) {
        warn!("Stale profile cleanup failed: {e:#}");
    }

    let checker = FactChecker::from_config(config).await?;
    let cancel = cancel_on_ctrl_c();
    let sink = FnSink(log_status);

    let code = match (url, text) {
        (Some(url), _) => match checker.check_url(&url, &cancel, &sink).await {
            Ok(report) => {
                print_json(&report)?;
                ExitCode::SUCCESS
            }
            Err(e) => report_failure(&e),
        },
        (None, Some(text)) => match checker.check_text(&text, &images, &cancel, &sink).await {
            Ok(result) => {
                print_json(&result)?;
                ExitCode::SUCCESS
            }
            Err(e) => report_failure(&e),
        },
        (None, None) if !images.is_empty() => {
            match checker.check_text("", &images, &cancel, &sink).await {
                Ok(result) => {
                    print_json(&result)?;
                    ExitCode::SUCCESS
                }
                Err(e) => report_failure(&e),
            }
        }
        (None, None) => {
            eprintln!("Nothing to check: pass a URL, --text or --image");
            ExitCode::from(2)
        }
    };

    if let Err(e) = checker.shutdown().await {
        warn!("Browser shutdown failed: {e:#}");
    }
    Ok(code)
}

async fn run_anomalies(config: Arc<ConfigHandle>, action: AnomalyAction) -> Result<ExitCode> {
    let tracker = AnomalyTracker::open(config.get().acquisition.anomaly_dir.clone()).await?;
    match action {
        AnomalyAction::List => print_json(&tracker.list().await)?,
        AnomalyAction::Delete { id } => {
            if !tracker.delete(&id).await? {
                eprintln!("No anomaly with id {id}");
                return Ok(ExitCode::FAILURE);
            }
            println!("Deleted {id}");
        }
        AnomalyAction::Clear => {
            let removed = tracker.clear().await?;
            println!("Cleared {removed} anomalies");
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let loader = match cli.config {
        Some(path) => ConfigLoader::File(path),
        None => ConfigLoader::Env,
    };
    let config = Arc::new(ConfigHandle::new(loader)?);

    match cli.command {
        Commands::Check { url, text, images } => run_check(config, url, text, images).await,
        Commands::Anomalies { action } => run_anomalies(config, action).await,
    }
}
