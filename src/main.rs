//! Firmware plugin registration.
//!
//! Called by the package manager after every package event and during full
//! synchronisation passes.
//!
//! Usage:
//!   reconcile install os-wireguard
//!   reconcile resync_factory
//!   reconcile -c /usr/local/etc/reconcile.conf --stderr resync

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use log::{debug, error, warn};

use plugin_reconcile::config::{self, DEFAULT_SETTINGS};
use plugin_reconcile::logging::setup_logging;
use plugin_reconcile::metadata;
use plugin_reconcile::plugins::is_plugin_name;
use plugin_reconcile::store::KvConfigStore;
use plugin_reconcile::{reconcile, Action};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "reconcile", about = "Register installed firmware plugins")]
struct Cli {
    /// Path to the settings file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_SETTINGS)]
    config: PathBuf,

    /// Log to stderr instead of syslog.
    #[arg(long)]
    stderr: bool,

    /// install, remove, resync or resync_factory; anything else does nothing.
    action: Option<String>,

    /// Package name for install and remove.
    #[arg(allow_hyphen_values = true)]
    name: Option<String>,

    /// Extra arguments from generic package hooks; ignored.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    rest: Vec<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    // not a plugin, not our business
    if cli.name.as_deref().is_some_and(|n| !is_plugin_name(n)) {
        return;
    }

    if let Err(e) = run(&cli) {
        error!("{e:#}");
        eprintln!("reconcile: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;
    config::validate_config(&cfg)?;

    if let Err(e) = setup_logging("reconcile", cfg.log_syslog && !cli.stderr, log::LevelFilter::Info) {
        eprintln!("reconcile: logging disabled: {e}");
    }

    let action: Action = match cli.action.as_deref() {
        Some(a) => a.parse()?,
        None => Action::Other(String::new()),
    };
    debug!("action={action:?} name={:?}", cli.name);
    if !cli.rest.is_empty() {
        debug!("ignoring extra arguments {:?}", cli.rest);
    }

    let disk = metadata::scan(&cfg.version_dir)
        .with_context(|| format!("cannot scan {}", cfg.version_dir.display()))?;
    for record in disk.records() {
        debug!("on disk: {} -> {}", record.filename, record.product_id);
    }
    for path in &disk.skipped {
        println!("Ignoring invalid metadata: {}", path.display());
        warn!("ignoring invalid metadata: {}", path.display());
    }

    let mut store = KvConfigStore::open(&cfg.store_file)?;
    let outcome = reconcile(&mut store, &disk, &cfg.obsolete, &action, cli.name.as_deref())
        .with_context(|| format!("cannot update {}", store.path().display()))?;

    for event in &outcome.events {
        println!("{event}");
    }
    Ok(())
}
