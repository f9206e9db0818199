//! Firmware plugin registration and system report formatting.
//!
//! `reconcile` keeps the persisted plugin list in step with the package
//! version metadata on disk; `sysreport` turns raw backend output into
//! dashboard JSON.

pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod plugins;
pub mod reconcile;
pub mod report;
pub mod store;

pub use error::{ReconcileError, Result};
pub use reconcile::{reconcile, Action, Event, Outcome};
