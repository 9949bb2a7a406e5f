// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! vifrelay CLI
//!
//! Exercises a relay in-process: `soak` drives traffic through every path
//! and prints per-device counters, `config` prints the effective settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vifrelay::{Relay, RelayConfig};

mod soak;

#[derive(Parser)]
#[command(name = "vifrelay")]
#[command(author, version, about = "Virtual interface frame relay", long_about = None)]
struct Cli {
    /// Config file, or a directory containing vifrelay.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push, send and pull numbered frames and check their order
    Soak {
        /// Number of devices to create
        #[arg(short, long, default_value_t = 4)]
        devices: usize,

        /// Frames per device in each direction
        #[arg(short, long, default_value_t = 10_000)]
        frames: u64,

        /// Frame size in bytes
        #[arg(short, long, default_value_t = 1514)]
        size: usize,

        /// Override frames_per_schedule
        #[arg(short, long)]
        batch: Option<usize>,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },

    /// Print the effective configuration as YAML
    Config,
}

fn load_config(path: Option<&Path>) -> Result<RelayConfig> {
    let config = match path {
        Some(p) if p.is_dir() => RelayConfig::load_or_default(p),
        Some(p) => RelayConfig::from_file(p),
        None => RelayConfig::load_or_default(&std::env::current_dir()?),
    };
    config.context("Failed to load relay configuration")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Soak {
            devices,
            frames,
            size,
            batch,
            timeout,
        } => {
            if let Some(batch) = batch {
                config.frames_per_schedule = batch;
            }
            let relay = Relay::with_config(config).context("Invalid relay configuration")?;

            let report = soak::run(
                &relay,
                &soak::SoakOptions {
                    devices,
                    frames,
                    frame_size: size,
                    timeout: Duration::from_secs(timeout),
                },
            )?;

            println!(
                "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8}",
                "DEVICE", "PUSHED", "DELIVERED", "SCHEDULES", "SENT", "PULLED", "DROPPED", "ORDER"
            );
            for device in &report.devices {
                let s = &device.stats;
                let order = if device.inbound_out_of_order + device.outbound_out_of_order == 0 {
                    "ok".to_string()
                } else {
                    format!(
                        "{}/{}",
                        device.inbound_out_of_order, device.outbound_out_of_order
                    )
                };
                println!(
                    "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8}",
                    device.name,
                    s.pushed,
                    s.delivered,
                    s.schedules,
                    s.sent,
                    s.pulled,
                    s.dropped_inbound + s.dropped_outbound,
                    order
                );
            }

            let total = frames * 2 * devices as u64;
            let secs = report.elapsed.as_secs_f64();
            println!();
            println!(
                "{} frames in {:.3}s ({:.0} frames/s)",
                total,
                secs,
                if secs > 0.0 { total as f64 / secs } else { 0.0 }
            );

            if !report.is_clean() {
                anyhow::bail!("frames arrived out of order");
            }
        }
        Commands::Config => {
            config.validate().context("Invalid relay configuration")?;
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}
