//! telemetry-lab - paced CPU workload with live frame timing statistics.

use std::{
    fs::File,
    io::{self, Write},
    sync::Mutex,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use telemetry_lab::{SchedulerConfig, TelemetryService};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod ui;

use config::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let power = cli.power_save.source();
    let manual = power.manual();
    let service = TelemetryService::new(SchedulerConfig::default(), power)
        .context("invalid scheduler configuration")?;

    if cli.headless {
        run_headless(&service, cli.load, cli.ticks)?;
    } else {
        service.start(cli.load).context("failed to start telemetry")?;
        ui::run(&service, manual).context("dashboard failed")?;
    }

    service.stop().context("telemetry did not stop cleanly")?;
    info!("exiting");
    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    match (&cli.log_file, cli.headless) {
        (Some(path), _) => {
            let file = File::create(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        (None, true) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(io::stderr),
                )
                .init();
        }
        // The dashboard owns the terminal; stay quiet unless given a file.
        (None, false) => {}
    }
    Ok(())
}

// Streams summaries as JSON lines until Ctrl-C or the tick limit.
fn run_headless(service: &TelemetryService, load: i64, ticks: Option<u64>) -> Result<()> {
    let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = quit_tx.try_send(());
    })
    .context("failed to install Ctrl-C handler")?;

    let summaries = service.subscribe();
    service.start(load).context("failed to start telemetry")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut printed = 0u64;

    loop {
        if quit_rx.try_recv().is_ok() {
            info!("interrupted");
            break;
        }
        match summaries.recv_timeout(Duration::from_millis(250)) {
            Ok(summary) => {
                serde_json::to_writer(&mut out, &summary)?;
                writeln!(out)?;
                printed += 1;
                if ticks.is_some_and(|limit| printed >= limit) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !service.is_running() {
                    warn!("compute loop ended unexpectedly");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    out.flush()?;
    Ok(())
}
