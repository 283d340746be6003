//! CLI entry point for the mediathek tool.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use mediathek_core::api::DEFAULT_API_URL;
use mediathek_core::health::{DEFAULT_HEALTH_INTERVAL, DEFAULT_HEALTH_TIMEOUT};
use mediathek_core::{
    ApiClient, BackendStatus, CancellationToken, DownloadJob, FailureKind, PollOutcome,
    PollRetryPolicy, SearchController, SearchError, StreamIngestor, SubmitOptions,
    TaskSubmissionController, check_backend, describe, run_health_monitor,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

mod app_config;
mod cli;
mod render;

use app_config::FileConfig;
use cli::{Args, Command, DownloadArgs, SearchArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let loaded = app_config::load_config(args.config.as_deref())?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => loaded.config.verbosity.map_or("info", app_config::VerbositySetting::filter),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    if loaded.loaded_from_file {
        debug!(path = ?loaded.path, "configuration loaded");
    }

    let config = loaded.config;
    let api_url = args
        .api_url
        .clone()
        .or_else(|| config.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let client = ApiClient::with_timeouts(
        &api_url,
        config
            .connect_timeout_secs
            .unwrap_or(mediathek_core::api::DEFAULT_CONNECT_TIMEOUT_SECS),
        config
            .read_timeout_secs
            .unwrap_or(mediathek_core::api::DEFAULT_READ_TIMEOUT_SECS),
    )
    .with_context(|| format!("Cannot use backend URL '{api_url}'"))?;

    match args.command {
        Command::Health { watch } => run_health(client, &config, watch).await,
        Command::Download(download) => run_download(client, &config, download, !args.quiet).await,
        Command::Search(search) => run_search(client, &config, search, !args.quiet).await,
    }
}

/// Prints the hint for `kind` and turns `message` into the command's error.
fn fail(kind: FailureKind, message: String) -> anyhow::Error {
    let descriptor = describe(kind);
    eprintln!("{}: {}", kind.label(), descriptor.what);
    eprintln!("  hint: {}", descriptor.fix);
    anyhow!(message)
}

async fn run_health(client: ApiClient, config: &FileConfig, keep_watching: bool) -> Result<()> {
    let timeout = config
        .health_timeout_secs
        .map_or(DEFAULT_HEALTH_TIMEOUT, Duration::from_secs);

    if !keep_watching {
        let status = check_backend(&client, timeout).await;
        println!("{}: {status}", client.base_url());
        if !status.is_online() {
            bail!("backend at {} is not reachable", client.base_url());
        }
        return Ok(());
    }

    let every = config
        .health_interval_secs
        .map_or(DEFAULT_HEALTH_INTERVAL, Duration::from_secs);
    let base = client.base_url().clone();
    let (tx, mut rx) = watch::channel(BackendStatus::Unknown);
    let token = CancellationToken::new();
    let monitor = tokio::spawn(run_health_monitor(client, every, timeout, tx, token.clone()));

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = rx.borrow_and_update().clone();
                println!("{base}: {status}");
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                token.cancel();
                break;
            }
        }
    }
    monitor.await.context("health monitor task failed")?;
    Ok(())
}

async fn run_download(
    client: ApiClient,
    config: &FileConfig,
    download: DownloadArgs,
    visible: bool,
) -> Result<()> {
    let mut options = SubmitOptions::default();
    if let Some(output_path) = &config.output_path {
        options.output_path.clone_from(output_path);
    }
    options.use_timestamped_folder = if download.timestamped {
        Some(true)
    } else {
        config.use_timestamped_folder
    };
    if let Some(ms) = download.poll_interval_ms.or(config.poll_interval_ms) {
        options.poll_interval = Duration::from_millis(ms);
    }
    options.retry = PollRetryPolicy::from_limit(
        download
            .max_poll_failures
            .or(config.max_poll_failures)
            .unwrap_or(0),
    );

    let base = client.base_url().clone();
    let controller = TaskSubmissionController::new(download.category.into(), client, options);
    let job = DownloadJob {
        urls: download.urls,
        format: download.format,
        output_path: download.output_path,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render::render_job(rx, visible, base));

    let result = {
        let submit = controller.submit(job, &tx);
        tokio::pin!(submit);
        tokio::select! {
            result = &mut submit => result,
            _ = tokio::signal::ctrl_c() => {
                controller.cancel();
                submit.await
            }
        }
    };
    drop(tx);
    renderer.await.context("progress renderer failed")?;

    match result {
        Ok(PollOutcome::Complete(summary)) => {
            info!(task_id = %summary.handle, failed = summary.failed_count(), "job finished");
            Ok(())
        }
        Ok(PollOutcome::Cancelled) => {
            info!("stopped following the job; the backend keeps working on it");
            Ok(())
        }
        Err(error) => Err(fail(error.kind(), error.user_message())),
    }
}

async fn run_search(
    client: ApiClient,
    config: &FileConfig,
    search: SearchArgs,
    visible: bool,
) -> Result<()> {
    let timeout = search
        .timeout_secs
        .or(config.search_timeout_secs)
        .map_or(mediathek_core::DEFAULT_SEARCH_TIMEOUT, Duration::from_secs);
    let max_results = search
        .max_results
        .or(config.search_max_results)
        .unwrap_or(mediathek_core::DEFAULT_MAX_RESULTS);
    let controller = SearchController::new(client, StreamIngestor::new(timeout), max_results);
    let query = search.query.join(" ");

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render::render_search(rx, visible));

    let result = {
        let session = controller.search(&query, &tx);
        tokio::pin!(session);
        tokio::select! {
            result = &mut session => result,
            _ = tokio::signal::ctrl_c() => {
                controller.cancel();
                session.await
            }
        }
    };
    drop(tx);
    renderer.await.context("search renderer failed")?;

    match result {
        Ok(outcome) => {
            debug!(found = outcome.found, end = ?outcome.end, "search complete");
            Ok(())
        }
        Err(SearchError::Cancelled) => Ok(()),
        Err(error) => Err(fail(error.kind(), error.user_message())),
    }
}
