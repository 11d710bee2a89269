//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use registros_core::{RecordStatus, TimeRange};

/// Offline-first capture and sync of dairy-herd weight records.
///
/// Pulls weight readings from the scale device on the local network, keeps
/// them in a local store and pushes pending ones to a remote server.
#[derive(Parser, Debug)]
#[command(name = "registros")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory for record files and the fallback database
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Keep records in memory only (nothing is written to disk)
    #[arg(long, global = true)]
    pub in_memory: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download records from the scale device and store new ones
    Download(DownloadArgs),
    /// Ingest records from a file or stdin
    Import(ImportArgs),
    /// Push pending records to the remote server
    Sync(SyncArgs),
    /// List stored records
    List(ListArgs),
    /// Show record counts per status
    Status,
    /// Show daily production totals, trend and a three-day prediction
    Summary(SummaryArgs),
    /// Remove a record by uid, or every record of an animal
    Remove(RemoveArgs),
    /// Rebuild the record index from stored bodies
    RepairIndex,
    /// Show effective configuration
    Config,
}

/// Arguments for `registros download`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Data host of the scale device (default from config, then http://192.168.4.1)
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Per-attempt timeout in milliseconds (100-120000)
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(100..=120_000))]
    pub timeout_ms: Option<u64>,

    /// Skip the receipt confirmation sent to the device after new records
    #[arg(long)]
    pub no_confirm: bool,
}

/// Arguments for `registros import`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ImportArgs {
    /// File with JSON or JSON-lines records (reads stdin when omitted)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}

/// Arguments for `registros sync`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Remote endpoint receiving records (default from config)
    #[arg(long, value_name = "URL")]
    pub remote: Option<String>,

    /// Concurrent senders (1-16)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Move failed records back to pending before syncing
    #[arg(long)]
    pub retry_failed: bool,
}

/// Arguments for `registros list`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only list records with this status
    #[arg(long, value_enum)]
    pub status: Option<StatusFilter>,
}

/// Status values accepted by `--status`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Pending,
    Synced,
    Failed,
}

impl From<StatusFilter> for RecordStatus {
    fn from(value: StatusFilter) -> Self {
        match value {
            StatusFilter::Pending => Self::Pending,
            StatusFilter::Synced => Self::Synced,
            StatusFilter::Failed => Self::Failed,
        }
    }
}

/// Arguments for `registros summary`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SummaryArgs {
    /// Only summarize records dated within this period
    #[arg(long, value_enum, default_value_t = RangeArg::All)]
    pub range: RangeArg,
}

/// Periods accepted by `--range`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeArg {
    Week,
    Month,
    Quarter,
    HalfYear,
    Year,
    #[default]
    All,
}

impl From<RangeArg> for TimeRange {
    fn from(value: RangeArg) -> Self {
        match value {
            RangeArg::Week => Self::Week,
            RangeArg::Month => Self::Month,
            RangeArg::Quarter => Self::Quarter,
            RangeArg::HalfYear => Self::HalfYear,
            RangeArg::Year => Self::Year,
            RangeArg::All => Self::All,
        }
    }
}

/// Arguments for `registros remove`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RemoveArgs {
    /// Uid of the record to remove
    #[arg(value_name = "UID", required_unless_present = "codigo", conflicts_with = "codigo")]
    pub uid: Option<String>,

    /// Remove every record of this animal code
    #[arg(long, value_name = "CODIGO")]
    pub codigo: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_subcommand_is_required() {
        let result = Args::try_parse_from(["registros"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["registros", "-v", "status"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["registros", "status", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["registros", "-q", "status"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["registros", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["registros", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_global_storage_flags() {
        let args =
            Args::try_parse_from(["registros", "list", "--data-dir", "/tmp/r", "--in-memory"])
                .unwrap();
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/r")));
        assert!(args.in_memory);
    }

    #[test]
    fn test_cli_download_args() {
        let args = Args::try_parse_from([
            "registros",
            "download",
            "--host",
            "192.168.4.1",
            "--timeout-ms",
            "2500",
            "--no-confirm",
        ])
        .unwrap();
        let Command::Download(download) = args.command else {
            panic!("expected download command");
        };
        assert_eq!(download.host.as_deref(), Some("192.168.4.1"));
        assert_eq!(download.timeout_ms, Some(2500));
        assert!(download.no_confirm);
    }

    #[test]
    fn test_cli_download_timeout_out_of_range_rejected() {
        let err = Args::try_parse_from(["registros", "download", "--timeout-ms", "10"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_sync_concurrency_bounds() {
        let args = Args::try_parse_from(["registros", "sync", "-c", "16"]).unwrap();
        let Command::Sync(sync) = args.command else {
            panic!("expected sync command");
        };
        assert_eq!(sync.concurrency, Some(16));

        let err = Args::try_parse_from(["registros", "sync", "-c", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let err = Args::try_parse_from(["registros", "sync", "-c", "17"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_list_status_filter() {
        let args = Args::try_parse_from(["registros", "list", "--status", "failed"]).unwrap();
        let Command::List(list) = args.command else {
            panic!("expected list command");
        };
        assert_eq!(list.status.map(RecordStatus::from), Some(RecordStatus::Failed));

        assert!(Args::try_parse_from(["registros", "list", "--status", "sent"]).is_err());
    }

    #[test]
    fn test_cli_remove_requires_uid_or_codigo() {
        assert!(Args::try_parse_from(["registros", "remove"]).is_err());
        assert!(
            Args::try_parse_from(["registros", "remove", "V1|01/03/2024|06:00", "--codigo", "V1"])
                .is_err()
        );

        let args = Args::try_parse_from(["registros", "remove", "--codigo", "V1"]).unwrap();
        let Command::Remove(remove) = args.command else {
            panic!("expected remove command");
        };
        assert_eq!(remove.codigo.as_deref(), Some("V1"));
        assert!(remove.uid.is_none());
    }

    #[test]
    fn test_cli_summary_range_defaults_to_all() {
        let args = Args::try_parse_from(["registros", "summary"]).unwrap();
        let Command::Summary(summary) = args.command else {
            panic!("expected summary command");
        };
        assert_eq!(TimeRange::from(summary.range), TimeRange::All);

        let args =
            Args::try_parse_from(["registros", "summary", "--range", "half-year"]).unwrap();
        let Command::Summary(summary) = args.command else {
            panic!("expected summary command");
        };
        assert_eq!(TimeRange::from(summary.range), TimeRange::HalfYear);

        assert!(Args::try_parse_from(["registros", "summary", "--range", "decade"]).is_err());
    }

    #[test]
    fn test_cli_repair_index_uses_kebab_case() {
        let args = Args::try_parse_from(["registros", "repair-index"]).unwrap();
        assert!(matches!(args.command, Command::RepairIndex));
    }
}
