use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sysrank::cli::{Cli, OutputFormat};
use sysrank::config::BenchConfig;
use sysrank::driver::{Benchmark, RunControl};
use sysrank::fixtures::Fixtures;
use sysrank::probe::Probe;
use sysrank::probes;
use sysrank::report::Report;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Initialize the stderr log subscriber
///
/// RUST_LOG wins when set; otherwise warnings only, `-v` for progress,
/// `--debug` for per-probe tracing.
fn init_tracing(verbose: bool, debug: bool) {
    let default = if debug {
        "trace"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file (if any) with command-line flags on top
fn load_config(args: &Cli) -> Result<BenchConfig> {
    let mut config = match &args.config {
        Some(path) => BenchConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BenchConfig::default(),
    };
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_probe_list(probes: &[Probe]) {
    for probe in probes {
        println!("{:<24} {}", probe.name, probe.class);
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.verbose, args.debug);

    let config = load_config(&args)?;
    debug!("configuration: {:?}", config);

    let filter = config.probe_filter()?;
    let selected = filter
        .apply(&probes::registry())
        .context("Failed to select probes")?;

    if args.list {
        print_probe_list(&selected);
        return Ok(());
    }

    let fixtures = Fixtures::new().context("Failed to set up probe fixtures")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to install signal handler")?;
    }

    info!(
        "running {} probes for {}s (ops limit {}), method {}",
        selected.len(),
        config.duration,
        config.max_ops,
        config.method
    );

    let mut ctl = RunControl::new(config.time_budget(), config.max_ops).with_running_flag(running);
    let mut bench = Benchmark::new(selected, &fixtures, &config);
    let outcome = bench.run(&mut ctl);

    let report = Report::build(bench.probes(), bench.stats(), &outcome, config.top_n);
    report.log_coverage();

    match args.format {
        OutputFormat::Text => print!("{}", report.to_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Csv => print!("{}", report.to_csv()),
    }

    Ok(())
}
