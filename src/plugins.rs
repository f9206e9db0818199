//! Persisted plugin set and the name rules shared by every action.

use std::collections::BTreeMap;

use crate::metadata::DiskScan;

pub const PLUGIN_PREFIX: &str = "os-";
pub const DEVEL_SUFFIX: &str = "-devel";

/// Registered plugins: name → opaque marker.
///
/// The marker is carried but never interpreted.  Iteration and serialization
/// follow ascending name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginSet {
    plugins: BTreeMap<String, String>,
}

impl PluginSet {
    /// Parse the stored comma-separated list.  Each entry's marker is its
    /// position in the stored list; empty items are dropped.
    pub fn parse(stored: &str) -> Self {
        let plugins = stored
            .split(',')
            .filter(|name| !name.is_empty())
            .enumerate()
            .map(|(i, name)| (name.to_string(), i.to_string()))
            .collect();
        Self { plugins }
    }

    /// Comma-joined names, ascending.
    pub fn serialize(&self) -> String {
        self.plugins.keys().map(String::as_str).collect::<Vec<_>>().join(",")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    #[cfg(test)]
    pub fn marker(&self, name: &str) -> Option<&str> {
        self.plugins.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, marker: &str) {
        self.plugins.insert(name.to_string(), marker.to_string());
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.plugins.remove(name).is_some()
    }

    /// Drop the stable/development counterpart of `name`.  Returns whether
    /// anything was removed.
    pub fn remove_sibling(&mut self, name: &str) -> bool {
        self.remove(&sibling_of(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// `os-foo` ↔ `os-foo-devel`.
pub fn sibling_of(name: &str) -> String {
    match name.strip_suffix(DEVEL_SUFFIX) {
        Some(stable) => stable.to_string(),
        None => format!("{name}{DEVEL_SUFFIX}"),
    }
}

/// `name` without a leading `os-` and a trailing `-devel`.
pub fn bare_name(name: &str) -> &str {
    let name = name.strip_prefix(PLUGIN_PREFIX).unwrap_or(name);
    name.strip_suffix(DEVEL_SUFFIX).unwrap_or(name)
}

/// True when the disk scan reports exactly `name` under its bare filename,
/// so `os-foo` never matches a `foo` file that carries `os-foo-devel`.
pub fn disk_found(name: &str, disk: &DiskScan) -> bool {
    disk.product_id(bare_name(name)) == Some(name)
}

pub fn is_plugin_name(name: &str) -> bool {
    name.starts_with(PLUGIN_PREFIX)
}
