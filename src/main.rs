//! slackscan - report slack space on ext volumes and files.

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use slackscan::report::Reporter;
use slackscan::scanner::{estimate_from_status, FileScan, FileScanner, VolumeScanner};
use slackscan::storage::{ExtDriver, FileStatus, FsDriver, PartitionTable};
use slackscan::{OutputFormat, ScanConfig};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slackscan")]
#[command(author, version)]
#[command(
    about = "Report file system slack space",
    long_about = "Walks the inodes of an ext2/ext3/ext4 partition, or reads a single file's inode, and reports the unused bytes at the end of each file's last allocated block."
)]
struct Cli {
    /// Partition to scan (e.g., /dev/sda1)
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// File to scan
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Display individual slack space information
    #[arg(short, long)]
    verbose: bool,

    /// Estimate the file's slack from stat metadata instead of reading its device
    #[arg(long, requires = "file")]
    stat: bool,

    /// Emit one JSON object per line
    #[arg(long)]
    json: bool,

    /// Leave inodes with a zero link count out of the scan
    #[arg(long)]
    skip_unlinked: bool,

    /// Load settings from a JSON file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slackscan=warn")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if is_usage_error(e.kind()) => {
            eprintln!("Unknown option specified see the help:");
            let _ = Cli::command().print_help();
            std::process::exit(0);
        }
        Err(e) => e.exit(),
    };

    if cli.device.is_none() && cli.file.is_none() {
        eprintln!("No device or file specified");
        std::process::exit(1);
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Parse errors answered with the usage text. Help and version requests
/// keep clap's own output.
fn is_usage_error(kind: ErrorKind) -> bool {
    !matches!(
        kind,
        ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    )
}

fn load_config(cli: &Cli) -> anyhow::Result<ScanConfig> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ScanConfig::default(),
    };

    config.verbose |= cli.verbose;
    config.skip_unlinked |= cli.skip_unlinked;
    if cli.json {
        config.format = OutputFormat::Json;
    }
    Ok(config)
}

/// Scan every requested target. Returns whether all of them succeeded.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(&cli)?;
    let driver = ExtDriver;
    let stdout = io::stdout();
    let mut reporter = Reporter::new(stdout.lock(), config.format, config.verbose);
    let mut ok = true;

    if let Some(device) = &cli.device {
        if let Err(e) = scan_device(&driver, &config, device, &mut reporter) {
            reporter.flush()?;
            eprintln!("{}", e);
            ok = false;
        }
    }

    if let Some(file) = &cli.file {
        match scan_file(&driver, &config, file, cli.stat) {
            Ok(scan) => {
                reporter.record(&scan.record)?;
                reporter.summary(&file.display().to_string(), &scan.totals)?;
            }
            Err(e) => {
                reporter.flush()?;
                eprintln!("{}", e);
                ok = false;
            }
        }
    }

    reporter.flush()?;
    Ok(ok)
}

fn scan_device<W: Write>(
    driver: &dyn FsDriver,
    config: &ScanConfig,
    device: &Path,
    reporter: &mut Reporter<W>,
) -> slackscan::Result<()> {
    reporter.scan_started(&device.display().to_string())?;

    let mut scan = VolumeScanner::new(driver, config).scan(device)?;
    let mut failure = None;
    for record in scan.by_ref() {
        match record {
            Ok(record) => reporter.record(&record)?,
            Err(e) => failure = Some(e),
        }
    }

    // Partial totals are still reported when the walk failed
    reporter.summary(scan.target(), &scan.totals())?;
    failure.map_or(Ok(()), Err)
}

fn scan_file(
    driver: &dyn FsDriver,
    config: &ScanConfig,
    file: &Path,
    stat_only: bool,
) -> slackscan::Result<FileScan> {
    if stat_only {
        let status = FileStatus::of(file)?;
        return Ok(estimate_from_status(file, &status));
    }

    let resolver = PartitionTable::new(&config.partition_table, &config.device_dir);
    FileScanner::new(driver, &resolver).scan(file)
}
