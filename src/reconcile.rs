//! Plugin registration reconciler.
//!
//! Brings the persisted plugin list in line with what the package manager
//! actually installed, for one of four actions:
//!
//! - `install` / `remove` — single package event from the package manager
//! - `resync`             — full two-way pass over store and disk
//! - `resync_factory`     — release type and obsolete plugin cleanup, then
//!   `resync` while the first-run wizard is still pending

use std::fmt;
use std::str::FromStr;

use log::{debug, info};

use crate::error::Result;
use crate::metadata::DiskScan;
use crate::plugins::{disk_found, is_plugin_name, PluginSet, DEVEL_SUFFIX, PLUGIN_PREFIX};
use crate::store::{ConfigStore, PLUGINS_PATH, TYPE_PATH, WIZARD_PATH};

const INSTALL_MARKER: &str = "hello";
const RESYNC_MARKER:  &str = "yep";
const COMMUNITY:      &str = "community";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Install,
    Remove,
    Resync,
    ResyncFactory,
    /// Anything else; accepted and ignored.
    Other(String),
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "install"        => Action::Install,
            "remove"         => Action::Remove,
            "resync"         => Action::Resync,
            "resync_factory" => Action::ResyncFactory,
            other            => Action::Other(other.to_string()),
        })
    }
}

/// A user-visible step taken during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Registered(String),
    Unregistered(String),
    ReleaseType(String),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Registered(name)   => write!(f, "Registering plugin: {name}"),
            Event::Unregistered(name) => write!(f, "Unregistering plugin: {name}"),
            Event::ReleaseType(t)     => {
                write!(f, "Registering release type: {}", if t.is_empty() { COMMUNITY } else { t })
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Whether the store was written and saved.
    pub changed: bool,
    pub events:  Vec<Event>,
}

/// What `resync_factory` decided about the second phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stop,
    Continue,
}

/// One reconciliation run against a store.
pub struct Reconciler<'a> {
    store:    &'a mut dyn ConfigStore,
    disk:     &'a DiskScan,
    obsolete: &'a [String],
    plugins:  PluginSet,
    changed:  bool,
    events:   Vec<Event>,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a mut dyn ConfigStore, disk: &'a DiskScan, obsolete: &'a [String]) -> Self {
        let plugins = PluginSet::parse(&store.get(PLUGINS_PATH).unwrap_or_default());
        Self { store, disk, obsolete, plugins, changed: false, events: Vec::new() }
    }

    /// Apply `action` and persist the plugin list if anything changed.
    pub fn run(mut self, action: &Action, name: Option<&str>) -> Result<Outcome> {
        match action {
            Action::Install => self.install(name),
            Action::Remove => self.remove(name),
            Action::Resync => self.resync(),
            Action::ResyncFactory => {
                if self.resync_factory() == Phase::Continue {
                    self.resync();
                }
            }
            Action::Other(other) => debug!("ignoring action {other:?}"),
        }

        if self.changed {
            self.store.set(PLUGINS_PATH, &self.plugins.serialize());
            self.store.save()?;
            info!("plugin list saved: {}", self.plugins.serialize());
        }

        Ok(Outcome { changed: self.changed, events: self.events })
    }

    fn install(&mut self, name: Option<&str>) {
        let Some(name) = name.filter(|n| is_plugin_name(n)) else {
            return;
        };
        if !disk_found(name, self.disk) {
            debug!("{name} not found on disk, not registering");
            return;
        }
        self.plugins.remove_sibling(name);
        self.plugins.insert(name, INSTALL_MARKER);
        self.changed = true;
        info!("registered plugin {name}");
    }

    fn remove(&mut self, name: Option<&str>) {
        let Some(name) = name.filter(|n| is_plugin_name(n)) else {
            return;
        };
        if disk_found(name, self.disk) {
            debug!("{name} still on disk, keeping registration");
            return;
        }
        if self.plugins.remove(name) {
            self.changed = true;
            info!("unregistered plugin {name}");
        }
    }

    fn resync(&mut self) {
        for name in self.plugins.names() {
            if !disk_found(&name, self.disk) {
                self.plugins.remove(&name);
                self.events.push(Event::Unregistered(name));
                self.changed = true;
            }
        }

        let disk = self.disk;
        for product_id in disk.product_ids() {
            if !self.plugins.contains(product_id) {
                self.plugins.insert(product_id, RESYNC_MARKER);
                self.events.push(Event::Registered(product_id.to_string()));
                self.changed = true;
            }
            // scrub stale siblings even when nothing was registered
            if self.plugins.remove_sibling(product_id) {
                self.changed = true;
            }
        }
    }

    fn resync_factory(&mut self) -> Phase {
        let current = match self.store.get(TYPE_PATH) {
            Some(t) => t,
            None => {
                self.store.set(TYPE_PATH, "");
                self.changed = true;
                String::new()
            }
        };
        if current != self.disk.release_type {
            let release = self.disk.release_type.clone();
            self.store.set(TYPE_PATH, &release);
            self.events.push(Event::ReleaseType(release));
            self.changed = true;
        }

        let count = self.plugins.len();
        let obsolete = self.obsolete;
        for base in obsolete {
            self.plugins.remove(&format!("{PLUGIN_PREFIX}{base}"));
            self.plugins.remove(&format!("{PLUGIN_PREFIX}{base}{DEVEL_SUFFIX}"));
        }
        if self.plugins.len() != count {
            self.changed = true;
        }

        if self.store.get(WIZARD_PATH).is_none() {
            Phase::Stop
        } else {
            Phase::Continue
        }
    }
}

/// Convenience wrapper for a single run.
pub fn reconcile(
    store:    &mut dyn ConfigStore,
    disk:     &DiskScan,
    obsolete: &[String],
    action:   &Action,
    name:     Option<&str>,
) -> Result<Outcome> {
    Reconciler::new(store, disk, obsolete).run(action, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::sibling_of;
    use crate::store::MemoryConfigStore;

    fn disk(records: &[(&str, &str)]) -> DiskScan {
        let mut d = DiskScan::default();
        for (filename, product_id) in records {
            d.insert(filename, product_id);
        }
        d
    }

    fn obsolete() -> Vec<String> {
        vec!["firewall".into(), "wireguard".into()]
    }

    fn plugins(store: &MemoryConfigStore) -> String {
        store.get(PLUGINS_PATH).unwrap_or_default()
    }

    fn run(store: &mut MemoryConfigStore, d: &DiskScan, action: &str, name: Option<&str>) -> Outcome {
        let action: Action = action.parse().unwrap();
        reconcile(store, d, &obsolete(), &action, name).unwrap()
    }

    #[test]
    fn install_registers_and_drops_sibling() {
        let d = disk(&[("foo", "os-foo-devel")]);
        let mut store = MemoryConfigStore::new().with(PLUGINS_PATH, "os-bar,os-foo");

        let out = run(&mut store, &d, "install", Some("os-foo-devel"));
        assert!(out.changed);
        assert!(out.events.is_empty());
        assert_eq!(plugins(&store), "os-bar,os-foo-devel");
        assert!(!plugins(&store).split(',').any(|n| n == sibling_of("os-foo-devel")));
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn install_requires_disk_match() {
        let d = disk(&[("foo", "os-foo-devel")]);
        let mut store = MemoryConfigStore::new().with(PLUGINS_PATH, "os-bar");

        let out = run(&mut store, &d, "install", Some("os-foo"));
        assert!(!out.changed);
        assert_eq!(plugins(&store), "os-bar");
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn install_without_name_is_noop() {
        let d = disk(&[("foo", "os-foo")]);
        let mut store = MemoryConfigStore::new();
        assert!(!run(&mut store, &d, "install", None).changed);
        assert!(!run(&mut store, &d, "install", Some("foo")).changed);
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn remove_keeps_plugin_still_on_disk() {
        let d = disk(&[("foo", "os-foo")]);
        let mut store = MemoryConfigStore::new().with(PLUGINS_PATH, "os-foo");

        assert!(!run(&mut store, &d, "remove", Some("os-foo")).changed);
        assert_eq!(plugins(&store), "os-foo");
    }

    #[test]
    fn remove_unregisters_missing_plugin() {
        let d = disk(&[]);
        let mut store = MemoryConfigStore::new().with(PLUGINS_PATH, "os-a,os-foo");

        assert!(run(&mut store, &d, "remove", Some("os-foo")).changed);
        assert_eq!(plugins(&store), "os-a");

        assert!(!run(&mut store, &d, "remove", Some("os-foo")).changed);
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn resync_converges() {
        let d = disk(&[("b", "os-b"), ("c", "os-c")]);
        let mut store = MemoryConfigStore::new().with(PLUGINS_PATH, "os-a,os-b");

        let out = run(&mut store, &d, "resync", None);
        assert!(out.changed);
        assert_eq!(plugins(&store), "os-b,os-c");
        assert_eq!(out.events, vec![
            Event::Unregistered("os-a".into()),
            Event::Registered("os-c".into()),
        ]);
    }

    #[test]
    fn resync_twice_writes_once() {
        let d = disk(&[("b", "os-b"), ("c", "os-c-devel")]);
        let mut store = MemoryConfigStore::new().with(PLUGINS_PATH, "os-a");

        assert!(run(&mut store, &d, "resync", None).changed);
        let second = run(&mut store, &d, "resync", None);
        assert!(!second.changed);
        assert!(second.events.is_empty());
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn resync_drops_stale_sibling() {
        // stale stable entry whose devel build is what is on disk
        let d = disk(&[("c", "os-c-devel")]);
        let mut store = MemoryConfigStore::new().with(PLUGINS_PATH, "os-c,os-c-devel");

        let out = run(&mut store, &d, "resync", None);
        assert!(out.changed);
        assert_eq!(plugins(&store), "os-c-devel");
        assert_eq!(out.events, vec![Event::Unregistered("os-c".into())]);
    }

    #[test]
    fn factory_sets_type_and_stops_without_wizard() {
        let mut d = disk(&[("c", "os-c")]);
        d.release_type = "business".into();
        let mut store = MemoryConfigStore::new()
            .with(PLUGINS_PATH, "os-firewall,os-wireguard-devel,os-x");

        let out = run(&mut store, &d, "resync_factory", None);
        assert!(out.changed);
        assert_eq!(out.events, vec![Event::ReleaseType("business".into())]);
        assert_eq!(store.get(TYPE_PATH).as_deref(), Some("business"));
        // no resync phase: os-x stays, os-c is not registered
        assert_eq!(plugins(&store), "os-x");
    }

    #[test]
    fn factory_creates_missing_type() {
        let d = disk(&[]);
        let mut store = MemoryConfigStore::new();

        let out = run(&mut store, &d, "resync_factory", None);
        assert!(out.changed);
        assert!(out.events.is_empty());
        assert_eq!(store.get(TYPE_PATH).as_deref(), Some(""));

        let again = run(&mut store, &d, "resync_factory", None);
        assert!(!again.changed);
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn factory_falls_through_with_wizard_pending() {
        let d = disk(&[("c", "os-c")]);
        let mut store = MemoryConfigStore::new()
            .with(TYPE_PATH, "")
            .with(WIZARD_PATH, "")
            .with(PLUGINS_PATH, "os-x");

        let out = run(&mut store, &d, "resync_factory", None);
        assert!(out.changed);
        assert_eq!(plugins(&store), "os-c");
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn resync_cannot_inject_store_keys() {
        use crate::store::KvConfigStore;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.kv");
        std::fs::write(&path, "system.firmware.plugins = os-a\n").unwrap();
        let d = disk(&[("x", "os-x\ntrigger_initial_wizard = 1")]);

        let mut store = KvConfigStore::open(&path).unwrap();
        let action = Action::Resync;
        assert!(reconcile(&mut store, &d, &obsolete(), &action, None).is_err());

        let reopened = KvConfigStore::open(&path).unwrap();
        assert_eq!(reopened.get(WIZARD_PATH), None);
        assert_eq!(reopened.get(PLUGINS_PATH).as_deref(), Some("os-a"));
    }

    #[test]
    fn unknown_action_is_noop() {
        let d = disk(&[("c", "os-c")]);
        let mut store = MemoryConfigStore::new();
        assert!(!run(&mut store, &d, "frobnicate", Some("os-c")).changed);
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn release_type_display_falls_back_to_community() {
        assert_eq!(Event::ReleaseType(String::new()).to_string(), "Registering release type: community");
        assert_eq!(Event::Registered("os-a".into()).to_string(), "Registering plugin: os-a");
    }
}
