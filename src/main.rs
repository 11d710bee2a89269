//! CLI entry point for the registros tool.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use registros_core::{
    DEFAULT_CONFIRM_TIMEOUT_MS, DEFAULT_DOWNLOAD_TIMEOUT_MS, DEFAULT_HOST, DEFAULT_SYNC_CONCURRENCY,
    Database, FailoverBackend, HostDownloader, HttpRecordSender, Ingestor, KeyValueBackend,
    MemoryBackend, NetworkMonitor, PreferencesBackend, RecordStatus, RecordStore, SqliteBackend,
    SyncEngine, TcpProbe, TimeRange, analyze, daily_totals, filter_by_range, normalize_host,
    predict,
};
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod progress;

use app_config::{FileConfig, LoadedConfig, load_default_file_config, resolve_default_data_dir};
use cli::{
    Args, Command, DownloadArgs, ImportArgs, ListArgs, RemoveArgs, SummaryArgs, SyncArgs,
};

/// Sub-directory of the data dir holding one file per record key.
const RECORDS_DIR: &str = "records";
/// File name of the fallback SQLite database inside the data dir.
const DB_FILE: &str = "registros.db";
/// Timeout for the connectivity probe run before a sync.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Effective settings after applying CLI flags over config over defaults.
#[derive(Debug, Clone)]
struct Settings {
    data_host: String,
    remote_sync_url: Option<String>,
    data_dir: PathBuf,
    download_timeout_ms: u64,
    confirm_timeout_ms: u64,
    sync_concurrency: usize,
}

impl Settings {
    fn resolve(args: &Args, config: Option<&FileConfig>) -> Self {
        let data_dir = args
            .data_dir
            .clone()
            .or_else(|| config.and_then(|c| c.data_dir.clone()))
            .unwrap_or_else(resolve_default_data_dir);
        Self {
            data_host: config
                .and_then(|c| c.data_host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            remote_sync_url: config.and_then(|c| c.remote_sync_url.clone()),
            data_dir,
            download_timeout_ms: config
                .and_then(|c| c.download_timeout_ms)
                .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_MS),
            confirm_timeout_ms: config
                .and_then(|c| c.confirm_timeout_ms)
                .unwrap_or(DEFAULT_CONFIRM_TIMEOUT_MS),
            sync_concurrency: config
                .and_then(|c| c.sync_concurrency)
                .map_or(DEFAULT_SYNC_CONCURRENCY, usize::from),
        }
    }
}

fn init_tracing(args: &Args, config: Option<&FileConfig>) {
    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => config
                .and_then(|c| c.verbosity)
                .map_or("info", app_config::VerbositySetting::filter_level),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let loaded = load_default_file_config()?;
    init_tracing(&args, loaded.config.as_ref());
    debug!(?args, "CLI arguments parsed");

    let settings = Settings::resolve(&args, loaded.config.as_ref());
    let show_progress = !args.quiet && io::stderr().is_terminal();

    if matches!(args.command, Command::Config) {
        print_config(&loaded, &settings, &args);
        return Ok(());
    }

    let store = open_store(&args, &settings).await?;
    info!(backend = store.backend_name(), "record store ready");

    match &args.command {
        Command::Download(download) => {
            run_download(download, &settings, &store, show_progress).await
        }
        Command::Import(import) => run_import(import, &store).await,
        Command::Sync(sync) => run_sync(sync, &settings, &store, show_progress).await,
        Command::List(list) => run_list(list, &store).await,
        Command::Status => run_status(&store).await,
        Command::Summary(summary) => run_summary(&summary, &store).await,
        Command::Remove(remove) => run_remove(remove, &store).await,
        Command::RepairIndex => {
            let count = store
                .rebuild_index()
                .await
                .context("Failed to rebuild the record index")?;
            println!("Index rebuilt with {count} records");
            Ok(())
        }
        Command::Config => Ok(()),
    }
}

/// Opens the record store: file-backed preferences with a SQLite fallback,
/// or an in-memory map for throwaway runs.
async fn open_store(args: &Args, settings: &Settings) -> Result<RecordStore> {
    if args.in_memory {
        debug!("using in-memory record backend");
        return Ok(RecordStore::new(Arc::new(MemoryBackend::new())));
    }

    let data_dir = &settings.data_dir;
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("Failed to create data directory '{}'", data_dir.display()))?;

    let records_dir = data_dir.join(RECORDS_DIR);
    let primary: Arc<dyn KeyValueBackend> = match PreferencesBackend::open(&records_dir).await {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            warn!(error = %e, dir = %records_dir.display(), "record directory unavailable");
            Arc::new(PreferencesBackend::new(&records_dir))
        }
    };

    let db_path = data_dir.join(DB_FILE);
    let backend: Arc<dyn KeyValueBackend> = match Database::new(&db_path).await {
        Ok(db) => Arc::new(FailoverBackend::new(
            primary,
            Arc::new(SqliteBackend::new(db)),
        )),
        Err(e) => {
            warn!(error = %e, path = %db_path.display(), "fallback database unavailable");
            primary
        }
    };
    Ok(RecordStore::new(backend))
}

async fn run_download(
    download: &DownloadArgs,
    settings: &Settings,
    store: &RecordStore,
    show_progress: bool,
) -> Result<()> {
    let host = download.host.as_deref().unwrap_or(&settings.data_host);
    let timeout_ms = download.timeout_ms.unwrap_or(settings.download_timeout_ms);
    let downloader =
        HostDownloader::with_default_transports().context("Failed to build HTTP clients")?;

    let spinner = progress::start_spinner(show_progress, format!("Downloading from {host}..."));
    let result = downloader.download_from_host(host, timeout_ms).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let payload = match result {
        Ok(payload) => payload,
        Err(e) => bail!("{}", e.user_message()),
    };
    info!(url = %payload.url, bytes = payload.text.len(), "downloaded records");

    let report = Ingestor::new(store.clone())
        .ingest(&payload.text)
        .await
        .with_context(|| format!("Failed to ingest records from {}", payload.url))?;
    println!(
        "Downloaded from {}: {} parsed, {} added, {} already stored, {} invalid lines",
        payload.url, report.parsed, report.added, report.skipped, report.invalid_lines
    );

    if report.added > 0 && !download.no_confirm {
        if downloader
            .confirm_host(host, settings.confirm_timeout_ms)
            .await
        {
            println!("Receipt confirmed with the device");
        } else {
            warn!(host, "device did not acknowledge the receipt");
        }
    }
    Ok(())
}

async fn run_import(import: &ImportArgs, store: &RecordStore) -> Result<()> {
    let text = if let Some(path) = &import.file {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read '{}'", path.display()))?
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        buffer
    } else {
        info!("No input provided. Pass a file or pipe records via stdin.");
        info!("Example: cat registros.jsonl | registros import");
        return Ok(());
    };

    let report = Ingestor::new(store.clone())
        .ingest(&text)
        .await
        .context("Failed to ingest records")?;
    println!(
        "Imported: {} parsed, {} added, {} already stored, {} invalid lines",
        report.parsed, report.added, report.skipped, report.invalid_lines
    );
    Ok(())
}

async fn run_sync(
    sync: &SyncArgs,
    settings: &Settings,
    store: &RecordStore,
    show_progress: bool,
) -> Result<()> {
    let Some(remote) = sync.remote.as_deref().or(settings.remote_sync_url.as_deref()) else {
        bail!(
            "No remote sync URL configured\n  Suggestion: Pass --remote <URL> or set remote_sync_url in the config file"
        );
    };
    let sender = HttpRecordSender::new(remote)?;

    let probe = TcpProbe::for_host_url(sender.url().as_str(), PROBE_TIMEOUT)
        .map(|probe| Arc::new(probe) as Arc<dyn registros_core::ConnectivityProbe>)
        .ok();
    let monitor = NetworkMonitor::new(probe);
    if !monitor.status().await {
        bail!("Offline: cannot reach {remote}; records stay pending");
    }

    if sync.retry_failed {
        let requeued = store
            .requeue_failed()
            .await
            .context("Failed to requeue failed records")?;
        info!(requeued, "failed records moved back to pending");
    }

    let concurrency = sync
        .concurrency
        .map_or(settings.sync_concurrency, usize::from);
    let engine = SyncEngine::new(concurrency)?;

    let total = store.count_by_status().await?.pending;
    let (handle, stop) = progress::spawn_sync_progress(show_progress, store.clone(), total);
    let result = engine.sync_pending(store, &sender).await;
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = handle {
        let _ = handle.await;
    }

    let report = result.context("Sync failed")?;
    println!(
        "Synced: {} sent, {} failed, {} skipped of {}",
        report.sent, report.failed, report.skipped, report.total
    );
    if report.failed > 0 {
        warn!(
            failed = report.failed,
            "some records failed; rerun with --retry-failed to try them again"
        );
    }
    Ok(())
}

async fn run_list(list: &ListArgs, store: &RecordStore) -> Result<()> {
    let records = match list.status {
        Some(status) => store.read_with_status(RecordStatus::from(status)).await?,
        None => store.get_all().await?,
    };
    for record in &records {
        println!("{record}");
    }
    info!(count = records.len(), "records listed");
    Ok(())
}

async fn run_status(store: &RecordStore) -> Result<()> {
    let counts = store.count_by_status().await?;
    println!("backend = {}", store.backend_name());
    println!("pending = {}", counts.pending);
    println!("synced = {}", counts.synced);
    println!("failed = {}", counts.failed);
    println!("total = {}", counts.total());
    Ok(())
}

async fn run_summary(summary: &SummaryArgs, store: &RecordStore) -> Result<()> {
    let range = TimeRange::from(summary.range);
    let records = store.get_all().await?;
    let records = filter_by_range(&records, range, Local::now().date_naive());
    let days = daily_totals(&records);
    let analysis = analyze(&days);
    let prediction = predict(&days);

    println!("{:<12} {:>8} {:>8} {:>8}", "fecha", "am", "pm", "total");
    for day in &days {
        println!(
            "{:<12} {:>8.2} {:>8.2} {:>8.2}",
            day.fecha, day.am, day.pm, day.total
        );
    }
    println!();
    println!("range = {range}");
    println!("days = {}", analysis.days);
    println!("total = {:.2}", analysis.total);
    println!("daily_average = {:.2}", analysis.daily_average);
    println!("am_average = {:.2}", analysis.am_average);
    println!("pm_average = {:.2}", analysis.pm_average);
    println!("max_day = {:.2}", analysis.max_day);
    println!("min_day = {:.2}", analysis.min_day);
    println!("variation_pct = {:.2}", analysis.variation_pct);
    println!("trend = {}", analysis.trend);
    let [first, second, third] = prediction.next_days;
    println!("prediction = {first:.2}, {second:.2}, {third:.2}");
    println!("confidence = {}", prediction.confidence);
    println!("{}", analysis.interpretation());
    println!("{}", prediction.outlook);
    Ok(())
}

async fn run_remove(remove: &RemoveArgs, store: &RecordStore) -> Result<()> {
    if let Some(codigo) = remove.codigo.as_deref() {
        let removed = store
            .remove_by_codigo(codigo)
            .await
            .with_context(|| format!("Failed to remove records of '{codigo}'"))?;
        println!("Removed {removed} records of {codigo}");
    } else if let Some(uid) = remove.uid.as_deref() {
        store
            .remove(uid)
            .await
            .with_context(|| format!("Failed to remove record '{uid}'"))?;
        println!("Removed {uid}");
    }
    Ok(())
}

fn print_config(loaded: &LoadedConfig, settings: &Settings, args: &Args) {
    let resolved_path = loaded.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("config_path = {resolved_path}");
    println!(
        "config_file = {}",
        if loaded.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    let host = normalize_host(&settings.data_host)
        .unwrap_or_else(|_| settings.data_host.clone());
    println!("data_host = {host}");
    println!(
        "remote_sync_url = {}",
        settings.remote_sync_url.as_deref().unwrap_or("<unset>")
    );
    if args.in_memory {
        println!("data_dir = <in-memory>");
    } else {
        println!("data_dir = {}", settings.data_dir.display());
    }
    println!("download_timeout_ms = {}", settings.download_timeout_ms);
    println!("confirm_timeout_ms = {}", settings.confirm_timeout_ms);
    println!("sync_concurrency = {}", settings.sync_concurrency);
    let verbosity = loaded
        .config
        .as_ref()
        .and_then(|c| c.verbosity)
        .map_or("default", app_config::VerbositySetting::as_str);
    println!("verbosity = {verbosity}");
}
