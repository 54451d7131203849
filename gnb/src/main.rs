//! gNB PHY timeline runner
//!
//! Builds one cell from a configuration file and runs its slot timeline in
//! simulated time against the reference round-robin scheduler.

mod config;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use interfaces::{RecordingSpectrum, UeDevice};
use layers::mac::{RoundRobinScheduler, Sib1Generator};
use layers::phy::{EnbPhy, PhySimulator};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::GnbConfig;

/// gNB PHY slot timeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Simulated time to run, in milliseconds
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Keep and summarise the PHY event log
    #[arg(long)]
    event_log: bool,

    /// Write the control-message trace to this file as JSON lines
    #[arg(long)]
    trace_file: Option<String>,
}

fn build_simulator(config: &GnbConfig, spectrum: &RecordingSpectrum) -> Result<PhySimulator> {
    let phy_config = config.phy_mac_config()?;
    let cell_id = config.cell_id();

    let mut scheduler = RoundRobinScheduler::new();
    for traffic in config.ue_traffic() {
        scheduler.add_ue(traffic);
    }

    let mut phy = EnbPhy::new(
        phy_config,
        cell_id,
        Box::new(spectrum.clone()),
        Box::new(spectrum.clone()),
        Box::new(scheduler),
    )?;
    phy.set_cam(config.channel_access_manager());

    let sib1 = Sib1Generator::new(config.sib1_config()?)?;
    debug!("SIB1 encoding: {}", common::bytes_to_hex(&sib1.encode()));
    phy.set_sib1(sib1.generate_sib1());

    for ue in &config.ues {
        let device = UeDevice { imsi: common::Imsi(ue.imsi), rnti: common::Rnti(ue.rnti) };
        if !phy.register_ue(device) {
            warn!("Skipping duplicate UE IMSI {}", ue.imsi);
            continue;
        }
        phy.add_ue(device.rnti);
    }
    phy.install_initial_ctrl_slots();

    let sim = PhySimulator::new(phy);
    Ok(if config.sim.event_log { sim.with_event_log() } else { sim })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GnbConfig::from_file(path)?,
        None => GnbConfig::default(),
    };
    if let Some(level) = args.log_level {
        config.log.all_level = level;
    }
    if let Some(duration_ms) = args.duration_ms {
        config.sim.duration_ms = duration_ms;
    }
    if args.event_log {
        config.sim.event_log = true;
    }
    if args.trace_file.is_some() {
        config.sim.trace_file = args.trace_file;
    }

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.all_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting gNB PHY timeline");
    if let Some(path) = &args.config {
        info!("Configuration file: {}", path.display());
    }
    info!("Cell configuration:");
    info!("  Cell ID: {}", config.cell_cfg.cell_id);
    info!("  Band: {}", config.cell_cfg.band);
    info!("  Bandwidth: {} MHz", config.cell_cfg.channel_bandwidth_mhz);
    info!("  Subcarrier spacing: {} kHz", config.cell_cfg.common_scs);
    info!("  Channel access: {:?}", config.channel_access);
    info!("  UEs: {}", config.ues.len());

    let spectrum = RecordingSpectrum::new();
    let sim = build_simulator(&config, &spectrum)?;
    let end = Duration::from_millis(config.sim.duration_ms);

    let stop = Arc::new(AtomicBool::new(false));
    let mut run = tokio::task::spawn_blocking({
        let stop = stop.clone();
        move || {
            let mut sim = sim.with_stop_flag(stop);
            sim.start();
            let result = sim.run_until(end);
            (sim, result)
        }
    });

    // Wait for the run or a shutdown signal
    let (sim, result) = tokio::select! {
        joined = &mut run => joined?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            stop.store(true, Ordering::Relaxed);
            run.await?
        }
    };

    let stats = result.context("PHY timeline aborted")?;
    info!("Run ended at {:?} in slot {}", sim.now(), sim.phy().current_slot());
    info!("PHY Statistics: {}", serde_json::to_string(&stats)?);
    info!(
        "  Control batches: {}, data bursts: {}, expected UL TBs: {}",
        spectrum.ctrl_transmissions().len(),
        spectrum.data_transmissions().len(),
        spectrum.expected_tbs().len()
    );

    if config.sim.event_log {
        let mut counts = BTreeMap::new();
        for (_, kind) in sim.event_log() {
            *counts.entry(format!("{:?}", kind)).or_insert(0u64) += 1;
        }
        info!("Event log: {} events {:?}", sim.event_log().len(), counts);
    }

    if let Some(path) = &config.sim.trace_file {
        let lines = sim.phy().trace().to_json_lines()?;
        std::fs::write(path, lines).with_context(|| format!("writing trace file {}", path))?;
        info!("Control-message trace written to {}", path);
    }

    info!("gNB PHY timeline complete");
    Ok(())
}
