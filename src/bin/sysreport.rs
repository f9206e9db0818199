//! Dashboard formatting for raw backend system reports.
//!
//! Reads the backend output for one section on stdin and prints JSON:
//!   configctl system status | sysreport status
//!   configctl system temp   | sysreport temperature

use std::io::{self, Read};
use std::process::{self, Command};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{debug, error};
use serde_json::Value;

use plugin_reconcile::logging::setup_logging;
use plugin_reconcile::report;

#[derive(Debug, Parser)]
#[command(name = "sysreport", about = "Format backend system reports as JSON")]
struct Cli {
    /// Pretty-print the JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    section: Section,
}

#[derive(Debug, Subcommand)]
enum Section {
    /// Subsystem status list.
    Status,
    /// Uptime from `kern.boottime`.
    Time {
        /// Epoch of the last configuration change.
        #[arg(long)]
        config_time: Option<i64>,
    },
    /// Memory usage from sysctl values.
    Resources,
    /// Mounted local filesystems.
    Disk,
    /// Temperature sensors, one `sysctl=value` per line.
    Temperature,
    /// Firmware product metadata plus host name and library versions.
    Information {
        /// `hostname.domain` shown above the version list.
        #[arg(long)]
        hostname: Option<String>,
        /// OpenSSL version line, e.g. from `openssl version`.
        #[arg(long)]
        openssl: Option<String>,
    },
    /// mbuf statistics, shown as the backend prints them.
    Mbuf,
    /// Swap devices, shown as the backend prints them.
    Swap,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_logging("sysreport", false, log::LevelFilter::Warn) {
        eprintln!("sysreport: logging disabled: {e}");
    }

    if let Err(e) = run(&cli) {
        error!("{e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut raw = String::new();
    io::stdin().read_to_string(&mut raw).context("cannot read stdin")?;

    let now = chrono::Utc::now();
    let out: Value = match &cli.section {
        Section::Status => report::status_report(&raw, now.timestamp()),
        Section::Time { config_time } => report::time_report(&raw, now, *config_time)?,
        Section::Resources => report::resources_report(&raw)?,
        Section::Disk => report::disk_report(&raw)?,
        Section::Temperature => report::temperature_report(&raw),
        Section::Information { hostname, openssl } => {
            let host = report::HostInfo {
                name:    hostname.clone(),
                kernel:  kernel_release(),
                openssl: openssl.clone(),
            };
            report::information_report(&raw, &host)?
        }
        Section::Mbuf | Section::Swap => report::passthrough_report(&raw)?,
    };

    let text = if cli.pretty {
        serde_json::to_string_pretty(&out)?
    } else {
        serde_json::to_string(&out)?
    };
    println!("{text}");
    Ok(())
}

/// `uname -sr`; omitted from the report when unavailable.
fn kernel_release() -> Option<String> {
    let out = match Command::new("uname").arg("-sr").output() {
        Ok(o) if o.status.success() => o,
        Ok(o) => {
            debug!("uname exited with {}", o.status);
            return None;
        }
        Err(e) => {
            debug!("cannot run uname: {e}");
            return None;
        }
    };
    let release = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!release.is_empty()).then_some(release)
}
