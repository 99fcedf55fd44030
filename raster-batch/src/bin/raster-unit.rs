//! Worker executable for process mode: runs one unit's pipeline and reports
//! through its exit code (0 success, -1 failure).

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use raster_batch::config::BatchConfig;
use raster_batch::layout::{RemapTables, WorkUnit};
use raster_batch::pipeline::{EXIT_FAILURE, PipelineReport, UnitPipeline};
use raster_batch::toolkit::{CommandToolkit, LicenseGuard, UnlicensedToolkit};
use raster_batch::{logging, panic_hook};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const LOG_PREFIX: &str = "raster-unit";

#[derive(Parser, Debug)]
#[command(name = "raster-unit", version, about = "Process a single raster work unit")]
struct Args {
    /// Unit directory, `<root>/Picture/<unit>`.
    unit_dir: PathBuf,
}

fn main() {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let config = match BatchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(EXIT_FAILURE);
        }
    };

    // The logging guard must be dropped before exiting so the file writer flushes.
    let code = {
        let _logging = match logging::init_logging(&config.log_dir, LOG_PREFIX) {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(EXIT_FAILURE);
            }
        };
        panic_hook::install();

        match run(&args, &config) {
            Ok(report) => {
                info!(
                    unit = %report.unit,
                    failed = report.total_failed(),
                    "Unit finished in {:.2}s",
                    report.duration_secs
                );
                0
            }
            Err(e) => {
                error!(unit_dir = %args.unit_dir.display(), "Unit failed: {:#}", e);
                EXIT_FAILURE
            }
        }
    };

    process::exit(code);
}

fn run(args: &Args, config: &BatchConfig) -> anyhow::Result<PipelineReport> {
    let license = UnlicensedToolkit;
    let _session = LicenseGuard::acquire(&license)?;

    let unit = WorkUnit::from_unit_dir(&args.unit_dir)?;
    let tables = RemapTables::discover(unit.root())?;

    let toolkit = Arc::new(CommandToolkit::new(&config.toolkit_program));
    let pipeline = UnitPipeline::new(toolkit, tables).with_call_delay(config.call_delay());

    // The supervisor stops this process by killing it, so nothing cancels here.
    Ok(pipeline.run(&unit, &CancellationToken::new()))
}
