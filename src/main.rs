use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

use dimmersync::config::SystemConfig;
use dimmersync::driver::CrossingOutcome;
use dimmersync::sim::run_simulation;

/// Run the dimmer synchronization loop against a simulated mains grid.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file; command-line values override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated time in seconds
    #[arg(short, long)]
    seconds: Option<f64>,

    /// True grid half-cycle length in microseconds
    #[arg(long)]
    half_cycle_us: Option<f64>,

    /// Constant offset of the crossings from the timer start in microseconds
    #[arg(long)]
    phase_offset_us: Option<f64>,

    /// Probability that a crossing interrupt is lost
    #[arg(long)]
    missing_chance: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Print one CSV line per serviced crossing
    #[arg(long, default_value_t = false)]
    trace: bool,

    /// Print the final report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn load_config(args: &Args) -> Result<SystemConfig> {
    let mut config = match &args.config {
        Some(path) => SystemConfig::from_file(path)?,
        None => SystemConfig::default(),
    };

    if let Some(seconds) = args.seconds {
        config.sim.duration_secs = seconds;
    }
    if let Some(us) = args.half_cycle_us {
        config.sim.half_cycle_us = us;
    }
    if let Some(us) = args.phase_offset_us {
        config.sim.phase_offset_us = us;
    }
    if let Some(p) = args.missing_chance {
        config.sim.missing_chance = p;
    }
    if args.seed.is_some() {
        config.sim.seed = args.seed;
    }

    config.validate()?;
    Ok(config)
}

fn print_trace_line(o: &CrossingOutcome) {
    println!("{},{},{},{}", o.captured_ticks, o.error_ticks, o.period_ticks, o.mode.as_str());
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    };

    if args.trace {
        println!("capture,error,period,mode");
    }

    let report = run_simulation(&config, |o| {
        if args.trace {
            print_trace_line(o);
        }
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            "Final: period={}ticks baseline={}ticks error={}ticks mode={}",
            report.final_period_ticks,
            report.final_baseline_ticks,
            report.final_error_ticks,
            report.status.mode
        );
        info!(
            "Syncs: {} frequency, {} phase rounds over {} crossings (seed {})",
            report.stats.frequency_syncs, report.stats.phase_rounds, report.stats.crossings, report.seed
        );
    }

    Ok(())
}
