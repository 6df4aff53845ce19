//! # armctl
//!
//! Robot-arm motion driver. Loads the driver config, builds the configured
//! robot model and runs the control loop until interrupted.

use armctl_common::config::LogLevel;
use armctl_common::consts::DEFAULT_CONFIG_PATH;
use armctl_control_unit::config::{ControlUnitConfig, load_config};
use armctl_control_unit::driver::Driver;
use armctl_hal::driver_registry::ModelRegistry;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// armctl: robot-arm motion driver
#[derive(Parser, Debug)]
#[command(name = "armctl")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Command arbitration, motion resolution and safety control for a robot arm")]
struct Args {
    /// Path to the driver configuration TOML.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let loaded = load_config(&args.config);

    let level = loaded
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);

    info!("armctl v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = loaded
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(run);
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("armctl shutdown complete");
}

fn run(config: ControlUnitConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Config OK: service={}, model={}, rate={} Hz, named pose configs={}",
        config.shared.service_name,
        config.robot.model,
        config.control.rate_hz,
        config.robot.named_pose_configs.len()
    );

    let registry = ModelRegistry::with_builtin_models();
    let robot = registry.create(&config.robot.model, &config.simulation)?;
    info!("Robot model '{}' ready ({} joints)", robot.name(), robot.dof());

    let driver = Driver::spawn(config, robot)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) && driver.is_running() {
        std::thread::sleep(Duration::from_millis(100));
    }

    if let Some(stats) = driver.shutdown() {
        info!(
            "Cycles: {}, avg {} µs, max {} µs, overruns {}",
            stats.cycle_count,
            stats.avg_cycle_ns() / 1_000,
            stats.max_cycle_ns / 1_000,
            stats.overruns
        );
    }
    Ok(())
}

fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };

    let filter = EnvFilter::from_default_env().add_directive(
        directive
            .parse::<Directive>()
            .unwrap_or_else(|_| Level::INFO.into()),
    );

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
