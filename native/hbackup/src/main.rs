use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result, ensure};
use clap::{ArgAction, Parser, builder::BoolishValueParser};
use forensic_adb::UnixPathBuf;
use hbackup::{
    adb::{AdbHost, PackageName},
    backup::{BackupConfig, BackupOrchestrator},
    logging::setup_logging,
    models::{BackupRequest, Compression, Settings},
    settings::load_settings,
};
use tracing::{debug, info};

/// Back up an Android app's private data directory over ADB (requires root on the device)
#[derive(Debug, Parser)]
#[command(name = "hbackup", version, about, long_about = None)]
struct Cli {
    /// Package name of the app to back up
    package: String,

    /// ADB binary to use instead of the one in PATH
    #[arg(short = 'a', long = "adb", value_name = "PATH")]
    adb: Option<String>,

    /// Serial of the device to back up from
    #[arg(short, long, env = "ANDROID_SERIAL")]
    serial: Option<String>,

    /// Force-stop the app before and after archiving
    #[arg(
        short = 'f',
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
    )]
    force_stop: Option<bool>,

    /// Include the installed APK in the archive
    #[arg(
        short = 'c',
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
    )]
    backup_apk: Option<bool>,

    /// Shorthand for `--compression gzip`
    #[arg(short = 'g', long, conflicts_with = "compression")]
    gzip: bool,

    /// Archive format
    #[arg(long, value_enum)]
    compression: Option<Compression>,

    /// Busybox binary on the device to run file utilities with
    #[arg(short = 'b', long, value_name = "PATH")]
    busybox: Option<String>,

    /// Host directory to store the archive in
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Device directory the archive is created in
    #[arg(long, value_name = "DIR")]
    remote_dir: Option<String>,

    /// Leave links and the device archive in place when a step fails
    #[arg(long)]
    keep_on_failure: bool,

    /// Settings file to read defaults from
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for rolling log files
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Increase stderr verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Everything a run needs, after merging the command line over the settings file
#[derive(Debug)]
struct Invocation {
    adb_path: Option<String>,
    config: BackupConfig,
    request: BackupRequest,
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

impl Cli {
    fn log_dir(&self, settings: &Settings) -> Option<PathBuf> {
        self.log_dir.clone().or_else(|| non_empty(&settings.log_dir).map(PathBuf::from))
    }

    /// Command line values win over settings; `cwd` is the fallback output directory
    fn resolve(self, settings: &Settings, cwd: &Path) -> Result<Invocation> {
        let package = PackageName::parse(&self.package)?;

        let remote_dir = self.remote_dir.unwrap_or_else(|| settings.remote_dir.clone());
        ensure!(
            remote_dir.starts_with('/'),
            "Remote directory must be an absolute device path, got '{remote_dir}'"
        );
        let output_dir = self
            .output_dir
            .or_else(|| non_empty(&settings.output_dir).map(PathBuf::from))
            .unwrap_or_else(|| cwd.to_path_buf());
        let compression = if self.gzip {
            Compression::Gzip
        } else {
            self.compression.unwrap_or(settings.compression)
        };

        let config = BackupConfig {
            remote_dir: UnixPathBuf::from(remote_dir),
            busybox: self
                .busybox
                .filter(|b| !b.is_empty())
                .or_else(|| non_empty(&settings.busybox_path).map(str::to_owned)),
            output_dir,
            cleanup_on_failure: !self.keep_on_failure && settings.cleanup_on_failure,
        };
        let request = BackupRequest {
            package,
            device_serial: self.serial.filter(|s| !s.is_empty()),
            force_stop: self.force_stop.unwrap_or(settings.force_stop),
            include_apk: self.backup_apk.unwrap_or(settings.backup_apk),
            compression,
        };
        let adb_path = self
            .adb
            .filter(|a| !a.is_empty())
            .or_else(|| non_empty(&settings.adb_path).map(str::to_owned));

        Ok(Invocation { adb_path, config, request })
    }
}

async fn run(cli: Cli) -> Result<(PathBuf, u64)> {
    let settings = load_settings(cli.config.as_deref())?;
    let _guard = match setup_logging(cli.verbose, cli.log_dir(&settings).as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to setup logging: {e:#}");
            None
        }
    };
    debug!(?settings, "Using settings");

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let Invocation { adb_path, config, request } = cli.resolve(&settings, &cwd)?;
    ensure!(
        config.output_dir.is_dir(),
        "Output directory {} does not exist",
        config.output_dir.display()
    );
    info!(?config, ?request, "Starting backup");

    let device = AdbHost::new(adb_path).connect(request.device_serial.as_deref()).await?;
    let orchestrator = BackupOrchestrator::new(device);
    let path = orchestrator.backup(&config, &request).await?;

    let size = tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("Failed to read metadata of {}", path.display()))?
        .len();
    Ok((path, size))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok((path, size)) => {
            println!(
                "HBackup finish: {} ({})",
                path.display(),
                humansize::format_size(size, humansize::DECIMAL)
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("HBackup error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
