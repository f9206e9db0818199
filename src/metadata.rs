//! Package version metadata scan.
//!
//! Every installed package drops a JSON file into the version directory,
//! named after the package (e.g. `wireguard`) and carrying at least a
//! `product_id` (e.g. `os-wireguard-devel`).  The scan turns that directory
//! into the disk-side view used by the reconciler.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;

use crate::error::Result;

/// Filename prefixes provided by the base sets or business add-ons.
const EXCLUDED_PREFIXES: &[&str] = &["base", "kernel", "pkgs", "OPNBEcore"];
const EXCLUDED_FILES:    &[&str] = &["core.license"];
const CORE_PREFIX:       &str = "core";

/// The part of a metadata file the reconciler cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionMetadata {
    pub product_id: String,
}

/// One registration candidate found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskMetadataRecord {
    pub filename:   String,
    pub product_id: String,
}

/// Result of a single directory scan.
#[derive(Debug, Clone, Default)]
pub struct DiskScan {
    /// filename → product id, registration candidates only.
    candidates: BTreeMap<String, String>,
    /// Derived from the `core` record; empty for the community release.
    pub release_type: String,
    /// Files skipped because their metadata could not be used.
    pub skipped: Vec<PathBuf>,
}

impl DiskScan {
    pub fn insert(&mut self, filename: &str, product_id: &str) {
        self.candidates.insert(filename.to_string(), product_id.to_string());
    }

    pub fn product_id(&self, filename: &str) -> Option<&str> {
        self.candidates.get(filename).map(String::as_str)
    }

    /// Candidate product ids in filename order.
    pub fn product_ids(&self) -> impl Iterator<Item = &str> {
        self.candidates.values().map(String::as_str)
    }

    pub fn records(&self) -> Vec<DiskMetadataRecord> {
        self.candidates
            .iter()
            .map(|(filename, product_id)| DiskMetadataRecord {
                filename:   filename.clone(),
                product_id: product_id.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Scan `dir` for version metadata.
///
/// A missing directory yields an empty scan.  Unreadable or malformed files
/// are recorded in [`DiskScan::skipped`] and otherwise ignored.
pub fn scan(dir: &Path) -> Result<DiskScan> {
    let mut out = DiskScan::default();

    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("version directory {} does not exist", dir.display());
            return Ok(out);
        }
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(e) => paths.push(e.path()),
            Err(e) => warn!("skipping unreadable entry in {}: {e}", dir.display()),
        }
    }
    paths.sort();

    for path in paths {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            out.skipped.push(path.clone());
            continue;
        };
        if filename.starts_with('.') {
            continue;
        }
        let prefix = filename.split('.').next().unwrap_or(filename);

        if EXCLUDED_PREFIXES.contains(&prefix) || EXCLUDED_FILES.contains(&filename) {
            debug!("not registering from {filename}");
            continue;
        }

        let Some(meta) = read_metadata(&path) else {
            out.skipped.push(path.clone());
            continue;
        };

        if prefix == CORE_PREFIX {
            if let Some(t) = release_type(&meta.product_id) {
                out.release_type = t.to_string();
            }
            continue;
        }

        out.insert(filename, &meta.product_id);
    }

    Ok(out)
}

fn read_metadata(path: &Path) -> Option<VersionMetadata> {
    let raw = match fs::read_to_string(path) {
        Ok(r) => r,
        Err(e) => {
            debug!("cannot read {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str::<VersionMetadata>(&raw) {
        Ok(m) if valid_product_id(&m.product_id) => Some(m),
        Ok(m) => {
            debug!("unusable product id {:?} in {}", m.product_id, path.display());
            None
        }
        Err(e) => {
            debug!("cannot parse {}: {e}", path.display());
            None
        }
    }
}

/// Product ids end up in a comma-separated, line-based store entry.
fn valid_product_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c.is_control() || c.is_whitespace() || c == ',')
}

/// `opnsense-business` → `business`; ids without a hyphen carry no type.
pub fn release_type(product_id: &str) -> Option<&str> {
    product_id.split_once('-').map(|(_, rest)| rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn scan_filters_and_derives_type() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        write(d, "core", r#"{"product_id": "opnsense-business"}"#);
        write(d, "core.license", r#"{"product_id": "x"}"#);
        write(d, "base", r#"{"product_id": "base"}"#);
        write(d, "kernel.arm", r#"{"product_id": "kernel"}"#);
        write(d, "pkgs", r#"{"product_id": "pkgs"}"#);
        write(d, "OPNBEcore", r#"{"product_id": "be"}"#);
        write(d, "wireguard", r#"{"product_id": "os-wireguard-devel", "product_version": "2.1"}"#);
        write(d, "acme", r#"{"product_id": "os-acme"}"#);

        let scan = scan(d).unwrap();
        assert_eq!(scan.release_type, "business");
        assert_eq!(scan.len(), 2);
        assert_eq!(scan.product_id("wireguard"), Some("os-wireguard-devel"));
        assert_eq!(scan.product_ids().collect::<Vec<_>>(), vec!["os-acme", "os-wireguard-devel"]);
        assert!(scan.skipped.is_empty());
    }

    #[test]
    fn invalid_metadata_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        write(d, "broken", "{not json");
        write(d, "noid", r#"{"product_name": "x"}"#);
        write(d, "numeric", r#"{"product_id": 7}"#);
        write(d, "ok", r#"{"product_id": "os-ok"}"#);

        let scan = scan(d).unwrap();
        assert_eq!(scan.records(), vec![DiskMetadataRecord {
            filename:   "ok".into(),
            product_id: "os-ok".into(),
        }]);
        assert_eq!(scan.skipped.len(), 3);
    }

    #[test]
    fn product_id_with_separators_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        write(d, "inject", r#"{"product_id": "os-x\ntrigger_initial_wizard = 1"}"#);
        write(d, "comma", r#"{"product_id": "os-a,os-b"}"#);
        write(d, "blank", r#"{"product_id": ""}"#);
        write(d, "ok", r#"{"product_id": "os-ok"}"#);

        let scan = scan(d).unwrap();
        assert_eq!(scan.product_ids().collect::<Vec<_>>(), vec!["os-ok"]);
        assert_eq!(scan.skipped.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_filename_is_reported() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let odd = dir.path().join(OsStr::from_bytes(b"plug\xffin"));
        if fs::write(&odd, r#"{"product_id": "os-plugin"}"#).is_err() {
            // filesystem refuses non-UTF-8 names
            return;
        }

        let scan = scan(dir.path()).unwrap();
        assert!(scan.is_empty());
        assert_eq!(scan.skipped, vec![odd]);
    }

    #[test]
    fn core_without_hyphen_keeps_community() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "core", r#"{"product_id": "opnsense"}"#);
        let scan = scan(dir.path()).unwrap();
        assert_eq!(scan.release_type, "");
        assert!(scan.is_empty());
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let scan = scan(&dir.path().join("nope")).unwrap();
        assert!(scan.is_empty());
    }

    #[test]
    fn release_type_after_first_hyphen() {
        assert_eq!(release_type("opnsense-devel"), Some("devel"));
        assert_eq!(release_type("opnsense-business-devel"), Some("business-devel"));
        assert_eq!(release_type("opnsense"), None);
    }
}
