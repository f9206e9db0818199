//! Reconciler settings file parser.
//!
//! Parses the same key = value format used by the firmware tooling config
//! files: one `key = value` pair per line, `#` starts a comment line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ReconcileError, Result};

pub const DEFAULT_SETTINGS: &str = "/usr/local/etc/reconcile.conf";

const STORE_FILE:  &str = "/conf/config.kv";
const VERSION_DIR: &str = "/usr/local/opnsense/version";
const OBSOLETE:    &[&str] = &["firewall", "wireguard"];

/// Full reconciler settings.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Configuration store holding the persisted plugin list.
    pub store_file: PathBuf,
    /// Directory holding one JSON metadata file per installed package.
    pub version_dir: PathBuf,
    /// Historical plugin base names scrubbed by `resync_factory`.
    pub obsolete: Vec<String>,
    pub log_syslog: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            store_file:  PathBuf::from(STORE_FILE),
            version_dir: PathBuf::from(VERSION_DIR),
            obsolete:    OBSOLETE.iter().map(|s| (*s).to_string()).collect(),
            log_syslog:  true,
        }
    }
}

/// Load settings from `path`.  A missing file yields the compiled-in defaults.
pub fn load_config(path: &Path) -> Result<ToolConfig> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(parse_config(&content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ToolConfig::default()),
        Err(e) => Err(ReconcileError::Config(format!("cannot read {}: {e}", path.display()))),
    }
}

/// Parse settings text.  Unknown keys and empty values are ignored.
pub fn parse_config(content: &str) -> ToolConfig {
    let mut cfg = ToolConfig::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, val)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let val = val.trim();
        if val.is_empty() {
            continue;
        }

        match key.as_str() {
            "store_file"  => cfg.store_file  = PathBuf::from(val),
            "version_dir" => cfg.version_dir = PathBuf::from(val),
            "log_syslog"  => cfg.log_syslog  = val == "true" || val == "1" || val == "yes",
            "obsolete" => {
                cfg.obsolete = val
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {} // ignore unknown keys
        }
    }

    cfg
}

/// Validate that required fields are populated.
pub fn validate_config(cfg: &ToolConfig) -> Result<()> {
    if cfg.store_file.as_os_str().is_empty() {
        return Err(ReconcileError::Config("store_file is required".into()));
    }
    if cfg.version_dir.as_os_str().is_empty() {
        return Err(ReconcileError::Config("version_dir is required".into()));
    }
    Ok(())
}
