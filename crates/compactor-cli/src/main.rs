//! Compactor - transparent NTFS compression for whole directories
//!
//! Scans a directory, decides per file whether Windows compression is worth it
//! and which algorithm to use, then runs `compact.exe` in parallel batches
//! sized for the CPU and drive.

mod display;
mod json_output;
mod progress;

use anyhow::{bail, Context, Result};
use clap::Parser;
use compactor_config::{ConfigBuilder, ConfigLoader, LoggingConfig};
use compactor_device::CapabilityProbe;
use compactor_engine::{Pipeline, RunRequest};
use compactor_types::{Capabilities, CpuClass, LzxPolicy, OperationMode, WorkerCap, WorkerCount};
use dialoguer::{Confirm, Input};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

const EXIT_FATAL: u8 = 1;
const EXIT_ALL_FAILED: u8 = 2;

/// Compactor - transparent NTFS compression for whole directories
#[derive(Parser, Debug)]
#[command(
    name = "compactor",
    version = env!("CARGO_PKG_VERSION"),
    about = "Compress a directory with Windows transparent compression",
    long_about = "Compactor walks a directory, skips files that would not shrink, and\n\
                  compresses the rest through compact.exe using XPRESS or LZX,\n\
                  with worker counts tuned to the CPU and drive."
)]
struct Cli {
    /// Directory to compress, prompted for when omitted
    directory: Option<PathBuf>,

    /// Exact compression checks and verification after the run
    #[arg(short, long, conflicts_with = "brand_files")]
    thorough: bool,

    /// Mark files with the legacy compression attribute, then verify
    #[arg(short, long)]
    brand_files: bool,

    /// Disable LZX compression
    #[arg(short = 'x', long, conflicts_with = "force_lzx")]
    no_lzx: bool,

    /// Use LZX even on CPUs below the threshold
    #[arg(short, long)]
    force_lzx: bool,

    /// Run one batch at a time
    #[arg(short, long, conflicts_with = "workers")]
    single_worker: bool,

    /// Maximum concurrent compress processes
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Minimum estimated savings, in percent, for sampled files
    #[arg(long, value_name = "PERCENT", value_parser = clap::value_parser!(u8).range(0..=90))]
    min_savings: Option<u8>,

    /// Skip content sampling of files with unknown extensions
    #[arg(long)]
    no_entropy: bool,

    /// Show the plan without compressing anything
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Accept every prompt with its default answer
    #[arg(short = 'y', long)]
    yes: bool,

    /// Write the default configuration to FILE and exit
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,
}

impl Cli {
    fn mode(&self) -> OperationMode {
        if self.brand_files {
            OperationMode::Branding
        } else if self.thorough {
            OperationMode::Thorough
        } else {
            OperationMode::Normal
        }
    }

    /// Apply command line flags on top of the loaded configuration
    fn apply_to(&self, config: &mut compactor_config::Config) {
        if self.thorough || self.brand_files {
            config.run.mode = self.mode();
        }
        if self.no_lzx {
            config.run.lzx_policy = LzxPolicy::ForceOff;
        } else if self.force_lzx {
            config.run.lzx_policy = LzxPolicy::ForceOn;
        }
        if self.single_worker {
            config.run.single_worker = true;
        }
        if self.workers.is_some() {
            config.run.workers = self.workers;
        }
        if let Some(percent) = self.min_savings {
            config.run.min_savings_percent = percent;
        }
        if self.no_entropy {
            config.run.entropy_sampling = false;
        }

        if self.debug {
            config.logging.level = "debug".to_string();
        } else if self.verbose {
            config.logging.level = "info".to_string();
        } else if self.quiet {
            config.logging.level = "error".to_string();
        }
        if self.json {
            config.logging.colored_output = false;
        }
    }

    fn interactive(&self) -> bool {
        !self.yes && console::user_attended_stderr()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            display::display_error(&format!("{:#}", error));
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if let Some(path) = &cli.generate_config {
        ConfigLoader::generate_default_config(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        display::display_success(&format!(
            "Default configuration written to {}",
            path.display()
        ));
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load_default()?,
    };
    cli.apply_to(&mut config);
    ConfigBuilder::validate(&config)?;

    let _guard = init_logging(&config.logging, cli.json)?;
    info!("Compactor v{} starting", env!("CARGO_PKG_VERSION"));

    let target = resolve_directory(&cli)?;
    let mut request = RunRequest::from_config(&target, &config);

    let probe_started = Instant::now();
    let capabilities = Arc::new(CapabilityProbe::new().probe(&target).await?);
    let probe_elapsed = probe_started.elapsed();
    if !confirm_capabilities(&cli, &capabilities, &mut request)? {
        display::display_info("Operation cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline = Pipeline::new(config)
        .with_capabilities(capabilities.clone(), probe_elapsed)
        .with_cache_sampling(cli.verbose);

    if cli.dry_run {
        let report = pipeline.dry_run(&request).await?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&json_output::DryRunJson::from_report(&report))?
            );
        } else if !cli.quiet {
            display::display_dry_run(&report, cli.verbose);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for running batches to finish");
            ctrl_c.cancel();
        }
    });

    if !cli.quiet && !cli.json {
        display::display_banner(&request, &capabilities);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let tracker = progress::BatchProgress::spawn(rx, cli.quiet || cli.json);
    let report = pipeline.with_progress(tx).run(&request, cancel).await;
    tracker.finish().await;
    let report = report?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json_output::RunReportJson::from_report(&report))?
        );
    } else if !cli.quiet {
        display::display_report(&report, cli.verbose);
    }

    if report.result.all_failed() {
        return Ok(ExitCode::from(EXIT_ALL_FAILED));
    }
    Ok(ExitCode::SUCCESS)
}

fn resolve_directory(cli: &Cli) -> Result<PathBuf> {
    let raw = match &cli.directory {
        Some(directory) => directory.clone(),
        None if console::user_attended() => {
            let input: String = Input::new()
                .with_prompt("Enter directory path to compress")
                .interact_text()?;
            PathBuf::from(input.trim().trim_matches('"'))
        }
        None => bail!("No directory given"),
    };

    if raw.is_absolute() {
        return Ok(raw);
    }
    let current = std::env::current_dir().context("Cannot read the working directory")?;
    Ok(current.join(raw))
}

/// Ask for consent where the hardware calls for it
///
/// Returns `false` when the user declines to continue.
fn confirm_capabilities(
    cli: &Cli,
    capabilities: &Capabilities,
    request: &mut RunRequest,
) -> Result<bool> {
    let interactive = cli.interactive();

    if capabilities.recommends_single_worker() && request.worker_cap == WorkerCap::Auto {
        if !cli.quiet {
            display::display_hdd_warning();
        }
        if interactive {
            let proceed = Confirm::new()
                .with_prompt("Do you want to proceed anyway?")
                .default(false)
                .interact()?;
            if !proceed {
                return Ok(false);
            }

            let throttle = Confirm::new()
                .with_prompt("Throttle compression to a single worker to avoid disk fragmentation?")
                .default(true)
                .interact()?;
            if !throttle {
                let workers = capabilities.cpu.logical_cores.saturating_sub(1).max(1);
                request.worker_cap = WorkerCap::Fixed(
                    WorkerCount::new(workers.min(WorkerCount::MAX))
                        .map_err(anyhow::Error::msg)?,
                );
            }
        }
    }

    if capabilities.cpu.class == CpuClass::LzxCapableDualCore
        && request.lzx_policy == LzxPolicy::Auto
        && interactive
    {
        let enable = Confirm::new()
            .with_prompt("This CPU has two cores. Use LZX for large files anyway?")
            .default(false)
            .interact()?;
        if enable {
            request.lzx_policy = LzxPolicy::ForceOn;
        }
    }

    Ok(true)
}

fn init_logging(logging: &LoggingConfig, json: bool) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter, Layer};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log filter")?;

    let stderr_layer = if logging.json_format {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(logging.colored_output && !json)
            .boxed()
    };

    let (file_layer, guard) = match &logging.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file {} has no file name", path.display()))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(guard)
}
