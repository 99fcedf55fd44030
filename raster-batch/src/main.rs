use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use raster_batch::config::{BatchConfig, ENV_CALL_DELAY_MS, ENV_LOG_DIR, ENV_TOOLKIT, ExecutionMode};
use raster_batch::layout::RemapTables;
use raster_batch::pipeline::{
    InProcessRunner, ProcessSupervisor, UnitPipeline, UnitRunner, WorkerPool,
};
use raster_batch::toolkit::{CommandToolkit, LicenseGuard, UnlicensedToolkit};
use raster_batch::utils::format_hms;
use raster_batch::{logging, panic_hook};
use tracing::{error, info, warn};

const LOG_PREFIX: &str = "raster-batch";

/// Run the reclassify/aggregate/normalize pipeline over every unit under ROOT,
/// one unit per physical core at a time.
#[derive(Parser, Debug)]
#[command(name = "raster-batch", version, about)]
struct Args {
    /// Work folder containing `Picture/<unit>/` and `table/`. Prompted for when omitted.
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let config = match BatchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    let logging = match logging::init_logging(&config.log_dir, LOG_PREFIX) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };
    panic_hook::install();

    let result = run(args, config).await;
    if let Err(e) = result {
        error!("Application error: {:#}", e);
        drop(logging);
        process::exit(1);
    }
}

async fn run(args: Args, config: BatchConfig) -> anyhow::Result<()> {
    let root = match args.root {
        Some(root) => root,
        None => prompt_root()?,
    };
    info!(root = %root.display(), mode = ?config.mode, "Starting batch");

    let license = UnlicensedToolkit;
    let _session = match config.mode {
        ExecutionMode::Thread => Some(LicenseGuard::acquire(&license)?),
        ExecutionMode::Process => None,
    };

    let runner: Arc<dyn UnitRunner> = match config.mode {
        ExecutionMode::Thread => {
            let tables = RemapTables::discover(&root)?;
            info!(tables = tables.len(), "Remap tables loaded");
            let toolkit = Arc::new(CommandToolkit::new(&config.toolkit_program));
            let pipeline = UnitPipeline::new(toolkit, tables).with_call_delay(config.call_delay());
            Arc::new(InProcessRunner::new(pipeline))
        }
        ExecutionMode::Process => {
            // Workers resolve the same settings as the dispatcher did.
            let supervisor = ProcessSupervisor::new(&config.worker_program)
                .with_env(ENV_TOOLKIT, &config.toolkit_program)
                .with_env(ENV_CALL_DELAY_MS, config.call_delay_ms.to_string())
                .with_env(ENV_LOG_DIR, &config.log_dir);
            info!(worker = %supervisor.program().display(), "Using worker executable");
            Arc::new(supervisor)
        }
    };

    let pool_config = config.pool_config();
    let poll_interval = pool_config.poll_interval();
    let pool = WorkerPool::initialize(&root, runner, pool_config)?;

    let start = Instant::now();
    pool.launch_waiting();

    let shutdown = pool.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling remaining units");
            shutdown.cancel();
        }
    });

    let mut ticker = tokio::time::interval(poll_interval);
    while !pool.is_done() {
        ticker.tick().await;
    }

    let stats = pool.stats();
    info!(
        launched = stats.launched,
        succeeded = stats.succeeded,
        failed = stats.failed,
        cancelled = stats.cancelled,
        peak_in_flight = stats.peak_in_flight,
        "All done! Time elapsed: {}",
        format_hms(start.elapsed())
    );

    Ok(())
}

#[cfg(feature = "interactive")]
fn prompt_root() -> anyhow::Result<PathBuf> {
    let answer = inquire::Text::new("Set work folder:")
        .prompt()
        .context("Failed to read work folder")?;
    Ok(PathBuf::from(answer.trim()))
}

#[cfg(not(feature = "interactive"))]
fn prompt_root() -> anyhow::Result<PathBuf> {
    use std::io::{self, BufRead, Write};

    print!("Set work folder: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read work folder")?;
    Ok(PathBuf::from(line.trim()))
}
