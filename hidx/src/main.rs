mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hidx_core::{Indexer, Store};
use output::{
    BackfillOutput, CheckOutput, DedupOutput, IngestOutput, OutputWriter, SummaryOutput,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// hidx - index a directory tree into a blob store
#[derive(Parser)]
#[command(name = "hidx")]
#[command(
    about = "Upload files in a directory to the index, clean up duplicate uploads, or summarize the index",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Store root directory (defaults to HIDX_ROOT env var or ./hidx-store)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload every file in a directory
    Ingest {
        /// Directory to upload
        directory: PathBuf,

        /// Report what would be uploaded without uploading
        #[arg(long)]
        dry_run: bool,
    },

    /// Count how many files in a directory are new and how many are already indexed
    Check {
        /// Directory to compare against the index
        directory: PathBuf,
    },

    /// Delete uploads of the same path whose content matches an earlier upload
    Dedup {
        /// Report duplicate paths without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Compute and store content digests for all records
    Backfill,

    /// Summarize the state of the index
    Summary,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let output = OutputWriter::new(cli.json);
    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.write_error(&e, 1);
            ExitCode::from(1)
        }
    }
}

/// Log to stderr so stdout carries only command output.
fn init_logging() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    // Determine store root: CLI arg > HIDX_ROOT env var > ./hidx-store default
    let root = cli
        .root
        .or_else(|| std::env::var("HIDX_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./hidx-store"));

    let store = Store::open_or_init(&root)
        .with_context(|| format!("Failed to open store at {}", root.display()))?;
    let indexer = store
        .indexer()
        .with_context(|| format!("Failed to connect to store at {}", root.display()))?;

    match cli.command {
        Commands::Ingest { directory, dry_run } => cmd_ingest(&indexer, &directory, dry_run, output),
        Commands::Check { directory } => cmd_check(&indexer, &directory, output),
        Commands::Dedup { dry_run } => cmd_dedup(&indexer, dry_run, output),
        Commands::Backfill => cmd_backfill(&indexer, output),
        Commands::Summary => cmd_summary(&indexer, output),
    }
}

type DiskIndexer = Indexer<hidx_core::FsBlobStore, hidx_core::SqliteIndex>;

fn cmd_ingest(
    indexer: &DiskIndexer,
    directory: &Path,
    dry_run: bool,
    output: &OutputWriter,
) -> Result<()> {
    tracing::info!("Starting upload process for directory: {}", directory.display());
    let stats = indexer
        .ingest_dir(directory, dry_run)
        .with_context(|| format!("Failed to ingest directory: {}", directory.display()))?;
    tracing::info!("Upload process completed.");

    let data = IngestOutput {
        success: true,
        result_code: 0,
        directory: directory.display().to_string(),
        dry_run,
        stats: stats.clone(),
    };
    output.write(&data, || {
        if dry_run {
            format!(
                "Dry run - no files uploaded\nWould upload {} files\n",
                stats.processed - stats.failed
            )
        } else {
            format!(
                "Processed {}/{} files\nUploaded {} files\nFailed {} files\n",
                stats.processed, stats.total, stats.ingested, stats.failed
            )
        }
    })
}

fn cmd_check(indexer: &DiskIndexer, directory: &Path, output: &OutputWriter) -> Result<()> {
    tracing::info!("Checking for existing files in directory: {}", directory.display());
    let stats = indexer
        .reconcile(directory)
        .with_context(|| format!("Failed to check directory: {}", directory.display()))?;

    let data = CheckOutput {
        success: true,
        result_code: 0,
        directory: directory.display().to_string(),
        stats,
    };
    output.write(&data, || {
        format!(
            "New files: {}\nExisting files: {}\n",
            stats.new_count, stats.existing_count
        )
    })
}

fn cmd_dedup(indexer: &DiskIndexer, dry_run: bool, output: &OutputWriter) -> Result<()> {
    tracing::info!("Checking for duplicate files in the database.");
    let stats = indexer
        .resolve_duplicates(dry_run)
        .with_context(|| "Failed to resolve duplicates")?;

    let data = DedupOutput {
        success: true,
        result_code: 0,
        dry_run,
        stats,
    };
    output.write(&data, || {
        if dry_run {
            format!(
                "Dry run - no files deleted\nPaths with duplicate uploads: {}\n",
                stats.candidate_groups
            )
        } else {
            format!(
                "Paths with duplicate uploads: {}\nDeleted {} duplicates\nUnreadable blobs: {}\n",
                stats.candidate_groups, stats.records_deleted, stats.digest_failures
            )
        }
    })
}

fn cmd_backfill(indexer: &DiskIndexer, output: &OutputWriter) -> Result<()> {
    let stats = indexer
        .backfill_digests()
        .with_context(|| "Failed to backfill digests")?;

    let data = BackfillOutput {
        success: true,
        result_code: 0,
        stats,
    };
    output.write(&data, || {
        format!(
            "Updated {} digests\nSkipped {} records\n",
            stats.processed, stats.skipped
        )
    })
}

fn cmd_summary(indexer: &DiskIndexer, output: &OutputWriter) -> Result<()> {
    tracing::info!("Generating summary of the database.");
    let summary = indexer
        .summarize()
        .with_context(|| "Failed to summarize index")?;

    let data = SummaryOutput {
        success: true,
        result_code: 0,
        summary,
    };
    output.write(&data, || {
        format!(
            "Total files: {}\nFiles with digest: {}\nPaths uploaded more than once: {}\nDigests shared by several files: {}\n",
            summary.total,
            summary.with_digest,
            summary.duplicate_path_groups,
            summary.duplicate_digest_groups
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_summary_takes_no_directory() {
        assert!(Cli::try_parse_from(["hidx", "summary", "/some/dir"]).is_err());
        assert!(Cli::try_parse_from(["hidx", "dedup", "/some/dir"]).is_err());
    }

    #[test]
    fn test_check_requires_directory() {
        assert!(Cli::try_parse_from(["hidx", "check"]).is_err());
        let cli = Cli::try_parse_from(["hidx", "check", "/d"]).unwrap();
        assert!(matches!(cli.command, Commands::Check { .. }));
    }

    #[test]
    fn test_global_flags() {
        let cli =
            Cli::try_parse_from(["hidx", "ingest", "/d", "--dry-run", "--json", "-r", "/s"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.root, Some(PathBuf::from("/s")));
        assert!(matches!(
            cli.command,
            Commands::Ingest { dry_run: true, .. }
        ));
    }
}
