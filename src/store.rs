//! Shared configuration store.
//!
//! The reconciler never owns configuration state: every read and write goes
//! through the [`ConfigStore`] contract.  [`KvConfigStore`] keeps the data in
//! a key = value file, [`MemoryConfigStore`] keeps it in memory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{ReconcileError, Result};

// ── Well-known paths ──────────────────────────────────────────────────────────

/// Comma-separated list of registered plugins.
pub const PLUGINS_PATH: &str = "system.firmware.plugins";
/// Release type derived from the `core` metadata record.
pub const TYPE_PATH: &str = "system.firmware.type";
/// Present while the first-run wizard has not been completed.
pub const WIZARD_PATH: &str = "trigger_initial_wizard";

/// Dotted-path access to the configuration shared with the rest of the system.
///
/// `get` distinguishes an absent entry (`None`) from an empty one.
pub trait ConfigStore {
    fn get(&self, path: &str) -> Option<String>;
    fn set(&mut self, path: &str, value: &str);
    /// Durably persist every `set` made so far.
    fn save(&mut self) -> Result<()>;
}

// ── Ordered entry list ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Entries(Vec<(String, String)>);

impl Entries {
    fn get(&self, path: &str) -> Option<String> {
        self.0.iter().find(|(k, _)| k == path).map(|(_, v)| v.clone())
    }

    fn set(&mut self, path: &str, value: &str) {
        match self.0.iter_mut().find(|(k, _)| k == path) {
            Some((_, v)) => *v = value.to_string(),
            None => self.0.push((path.to_string(), value.to_string())),
        }
    }
}

// ── File-backed store ─────────────────────────────────────────────────────────

/// Configuration store backed by a key = value file.
///
/// Entry order is preserved across a load/save cycle.  Empty values are kept
/// because presence alone is meaningful for some paths.
#[derive(Debug)]
pub struct KvConfigStore {
    path:    PathBuf,
    entries: Entries,
}

impl KvConfigStore {
    /// Open the store at `path`.  A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(ReconcileError::Store(format!("cannot read {}: {e}", path.display())))
            }
        };
        Ok(Self { path: path.to_path_buf(), entries: parse_entries(&content) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for KvConfigStore {
    fn get(&self, path: &str) -> Option<String> {
        self.entries.get(path)
    }

    fn set(&mut self, path: &str, value: &str) {
        self.entries.set(path, value);
    }

    fn save(&mut self) -> Result<()> {
        // one entry per line; a line break would split a value into new keys
        let broken = self.entries.0.iter().find(|(k, v)| has_line_break(k) || has_line_break(v));
        if let Some((key, _)) = broken {
            return Err(ReconcileError::Store(format!(
                "refusing to save {}: line break in entry {key:?}",
                self.path.display()
            )));
        }

        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut f = fs::File::create(&tmp)?;
        for (key, value) in &self.entries.0 {
            writeln!(f, "{key} = {value}")?;
        }
        f.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        debug!("configuration saved to {}", self.path.display());
        Ok(())
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\n', '\r'])
}

fn parse_entries(content: &str) -> Entries {
    let mut entries = Entries::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            entries.set(key.trim(), val.trim());
        }
    }
    entries
}

// ── In-memory store ───────────────────────────────────────────────────────────

/// In-memory store; counts `save` calls so callers can observe writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    entries: Entries,
    saves:   usize,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper for seeding entries.
    pub fn with(mut self, path: &str, value: &str) -> Self {
        self.entries.set(path, value);
        self
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, path: &str) -> Option<String> {
        self.entries.get(path)
    }

    fn set(&mut self, path: &str, value: &str) {
        self.entries.set(path, value);
    }

    fn save(&mut self) -> Result<()> {
        self.saves += 1;
        Ok(())
    }
}
