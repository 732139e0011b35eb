//! Subcommand implementations.

use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use link2cos_fetch::{HttpFetcher, Source};
use link2cos_ledger::Ledger;
use link2cos_storage::{ObjectStorage, S3Client};
use link2cos_sync::{
    BatchReport, BucketDestination, Destination, DirectoryDestination, SyncError, SyncEvent,
    SyncOrchestrator, read_links,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{Cli, Command, DownloadArgs, SyncArgs, UploadArgs};
use crate::config::Config;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Sync(args) => sync(&cli.ledger, args).await,
        Command::Download(args) => download(&cli.ledger, args).await,
        Command::Upload(args) => upload(args).await,
    }
}

async fn sync(ledger_path: &Path, args: SyncArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.config)?;
    let url_prefix = config.url_prefix()?.to_string();
    let storage: Arc<dyn ObjectStorage> = Arc::new(S3Client::new(config.s3_config()?)?);
    let destination = BucketDestination::new(storage, config.transfer_config()?, url_prefix)?;
    let fetcher = HttpFetcher::new(&config.fetch_config())?;

    run_batch(ledger_path, &args.input, fetcher, Arc::new(destination)).await
}

async fn download(ledger_path: &Path, args: DownloadArgs) -> anyhow::Result<()> {
    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        info!(path = %args.config.display(), "no config file, fetching directly");
        Config::default()
    };
    let fetcher = HttpFetcher::new(&config.fetch_config())?;
    let destination = DirectoryDestination::new(&args.output);

    info!(dir = %args.output.display(), "downloading");
    run_batch(ledger_path, &args.input, fetcher, Arc::new(destination)).await
}

async fn upload(args: UploadArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.config)?;
    let storage: Arc<dyn ObjectStorage> = Arc::new(S3Client::new(config.s3_config()?)?);
    let destination = BucketDestination::new(storage, config.transfer_config()?, "")?;
    let fetcher = HttpFetcher::new(&config.fetch_config())?;

    let source = Source::Local(args.file);
    let key = args.key.unwrap_or_else(|| source.file_name());
    let size = source
        .size(&fetcher)
        .await
        .with_context(|| format!("cannot upload {source}"))?;

    let delivery = destination.transfer(&key, &source, size, &fetcher).await?;
    println!("Uploaded {source} -> {} ({} bytes)", delivery.target, delivery.bytes);
    Ok(())
}

/// Runs one batch over the links in `input`, printing per-item progress
/// and a final summary. Ctrl-C stops the batch after the current item.
async fn run_batch(
    ledger_path: &Path,
    input: &Path,
    fetcher: HttpFetcher,
    destination: Arc<dyn Destination>,
) -> anyhow::Result<()> {
    let ledger = Ledger::open(ledger_path)
        .with_context(|| format!("failed to open ledger {}", ledger_path.display()))?;
    let links = read_links(input)
        .await
        .with_context(|| format!("failed to read input {}", input.display()))?;

    println!(
        "{} links, {} already transferred",
        links.len(),
        ledger.count()
    );

    let mut orchestrator = SyncOrchestrator::new(Arc::new(ledger), Arc::new(fetcher), destination);
    let printer = orchestrator.take_events().map(|rx| tokio::spawn(print_events(rx)));

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, cancel).await == Interrupt::Forced {
            error!("interrupted again, exiting immediately");
            std::process::exit(130);
        }
    });

    let report = orchestrator.run(&links).await;
    drop(orchestrator);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    print_summary(&report);
    if report.cancelled {
        return Err(SyncError::Cancelled.into());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Second signal while the current item was still running.
    Forced,
    /// Signals cannot be received.
    Unavailable,
}

/// First signal cancels the batch between items; the second one is
/// returned as [`Interrupt::Forced`].
async fn watch_interrupts<S, F>(mut signal: S, cancel: CancellationToken) -> Interrupt
where
    S: FnMut() -> F,
    F: Future<Output = io::Result<()>>,
{
    if signal().await.is_err() {
        return Interrupt::Unavailable;
    }
    warn!("interrupted, stopping after the current item (Ctrl-C again to exit now)");
    cancel.cancel();

    match signal().await {
        Ok(()) => Interrupt::Forced,
        Err(_) => Interrupt::Unavailable,
    }
}

async fn print_events(mut rx: mpsc::Receiver<SyncEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::Started { id, index, total } => println!("[{index}/{total}] {id}"),
            SyncEvent::Skipped { .. } => println!("  skipped (already transferred)"),
            SyncEvent::Completed { target, bytes, .. } => {
                println!("  ok -> {target} ({:.2} MiB)", bytes as f64 / (1024.0 * 1024.0))
            }
            SyncEvent::Failed { error, .. } => println!("  failed: {error}"),
        }
    }
}

fn print_summary(report: &BatchReport) {
    println!(
        "\nDone: {} succeeded, {} failed, {} skipped",
        report.succeeded, report.failed, report.skipped
    );
    for failure in &report.failures {
        println!("  {}: {}", failure.id, failure.error);
    }
}
