//! Display formatting for raw backend system reports.
//!
//! Each function takes the text a backend command printed (usually JSON) and
//! returns the JSON object shown on the dashboard.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::Result;

const FS_TYPES: &[&str] = &["cd9660", "msdosfs", "tmpfs", "ufs", "zfs"];
const MIB: f64 = 1024.0 * 1024.0;

// ── Time ──────────────────────────────────────────────────────────────────────

/// `"01:02:03"` below one day, `"2 days, 01:02:03"` from then on.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        let plural = if days > 1 { "days" } else { "day" };
        format!("{days} {plural}, {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Human readable age such as `"5 minutes ago"`.  `None` for negative ages,
/// which happen after the clock jumped backwards.
pub fn format_age(age: i64) -> Option<String> {
    const MINUTE: i64 = 60;
    const HOUR:   i64 = 60 * MINUTE;
    const DAY:    i64 = 24 * HOUR;
    const WEEK:   i64 = 7 * DAY;
    const MONTH:  i64 = 30 * DAY;
    const YEAR:   i64 = 365 * DAY;

    let (n, unit) = match age {
        a if a < 0 => return None,
        a if a < MINUTE => (a, "second"),
        a if a < HOUR => (a / MINUTE, "minute"),
        a if a < DAY => (a / HOUR, "hour"),
        a if a < WEEK => (a / DAY, "day"),
        a if a < MONTH => (a / WEEK, "week"),
        a if a < YEAR => (a / MONTH, "month"),
        a => (a / YEAR, "year"),
    };
    let plural = if n == 1 { "" } else { "s" };
    Some(format!("{n} {unit}{plural} ago"))
}

fn format_datetime(t: &DateTime<Utc>) -> String {
    t.format("%a %b %-d %-H:%M:%S %Z %Y").to_string()
}

/// Pull `sec` out of a `kern.boottime` value like `{ sec = 1700000000, usec = 0 }`.
pub fn parse_boottime(raw: &str) -> Option<i64> {
    let rest = &raw[raw.find("sec = ")? + "sec = ".len()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Uptime, current time and last configuration change.
pub fn time_report(raw: &str, now: DateTime<Utc>, config_time: Option<i64>) -> Result<Value> {
    let sysctl: Map<String, Value> = serde_json::from_str(raw)?;
    let boot = sysctl
        .get("kern.boottime")
        .and_then(Value::as_str)
        .and_then(parse_boottime)
        .unwrap_or_else(|| now.timestamp());
    let uptime = u64::try_from(now.timestamp() - boot).unwrap_or(0);
    let config = DateTime::from_timestamp(config_time.unwrap_or(0), 0).unwrap_or_default();

    Ok(json!({
        "uptime":   format_uptime(uptime),
        "datetime": format_datetime(&now),
        "config":   format_datetime(&config),
    }))
}

// ── Status ────────────────────────────────────────────────────────────────────

fn status_name(code: i64) -> Option<&'static str> {
    match code {
        -1 => Some("Error"),
        0 => Some("Warning"),
        1 => Some("Notice"),
        2 => Some("OK"),
        _ => None,
    }
}

fn failed() -> Value {
    json!({ "status": "failed" })
}

/// Annotate subsystem statuses with names and ages, and add an overall
/// `System` entry carrying the worst status.
pub fn status_report(raw: &str, now: i64) -> Value {
    let Ok(Value::Object(mut statuses)) = serde_json::from_str::<Value>(raw.trim()) else {
        return failed();
    };
    if statuses.is_empty() {
        return failed();
    }

    let mut codes = Vec::new();
    for status in statuses.values_mut() {
        let Some(entry) = status.as_object_mut() else {
            return failed();
        };
        if !not_empty(entry.get("logLocation")) {
            return failed();
        }
        let code = entry.get("statusCode").and_then(as_i64);
        if let Some(c) = code {
            codes.push(c);
        }
        entry.insert("status".into(), code.and_then(status_name).map_or(Value::Null, Value::from));

        if let Some(ts) = entry.get("timestamp").filter(|v| not_empty(Some(*v))).and_then(as_i64) {
            if let Some(age) = format_age(now - ts) {
                entry.insert("age".into(), Value::from(age));
            }
        }
    }

    let worst = codes.into_iter().min().unwrap_or(2);
    statuses.insert("System".into(), json!({ "status": status_name(worst) }));
    Value::Object(statuses)
}

// ── Resources ─────────────────────────────────────────────────────────────────

/// Memory usage from the `hw.physmem` and `vm.stats.vm.*` sysctls.
pub fn resources_report(raw: &str) -> Result<Value> {
    let mem: Map<String, Value> = serde_json::from_str(raw)?;
    let get = |key: &str| mem.get(key).and_then(as_f64).unwrap_or(0.0);

    let pages = get("vm.stats.vm.v_page_count");
    if pages == 0.0 {
        return Ok(json!({ "memory": { "used": "N/A" } }));
    }

    let physmem = get("hw.physmem");
    let idle = get("vm.stats.vm.v_inactive_count")
        + get("vm.stats.vm.v_cache_count")
        + get("vm.stats.vm.v_free_count");
    let used = ((pages - idle) / pages * physmem).round();

    let mut memory = Map::new();
    memory.insert("total".into(), json!(physmem as u64));
    memory.insert("total_frmt".into(), json!(format!("{}", (physmem / MIB) as i64)));
    memory.insert("used".into(), json!(used as i64));
    memory.insert("used_frmt".into(), json!(format!("{}", (used / MIB) as i64)));

    let arc = get("kstat.zfs.misc.arcstats.size");
    if arc > 0.0 {
        let arc_mb = (arc / MIB) as i64;
        memory.insert("arc".into(), json!(arc as u64));
        memory.insert("arc_frmt".into(), json!(format!("{arc_mb}")));
        memory.insert("arc_txt".into(), json!(format!("ARC size {arc_mb} MB")));
    }

    Ok(json!({ "memory": memory }))
}

// ── Disk ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DiskInfo {
    #[serde(rename = "storage-system-information")]
    storage: Option<StorageInfo>,
}

#[derive(Debug, Deserialize)]
struct StorageInfo {
    #[serde(default)]
    filesystem: Vec<Filesystem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Filesystem {
    name:         String,
    #[serde(rename = "type")]
    fs_type:      String,
    blocks:       Value,
    used:         Value,
    available:    Value,
    used_percent: Value,
    mounted_on:   String,
}

/// Local filesystems only; pseudo and network filesystems are dropped.
pub fn disk_report(raw: &str) -> Result<Value> {
    let info: DiskInfo = serde_json::from_str(raw)?;
    let devices: Vec<Value> = info
        .storage
        .map(|s| s.filesystem)
        .unwrap_or_default()
        .into_iter()
        .filter(|fs| FS_TYPES.contains(&fs.fs_type.trim()))
        .map(|fs| {
            json!({
                "device":     fs.name,
                "type":       fs.fs_type.trim(),
                "blocks":     fs.blocks,
                "used":       fs.used,
                "available":  fs.available,
                "used_pct":   fs.used_percent,
                "mountpoint": fs.mounted_on,
            })
        })
        .collect();
    Ok(json!({ "devices": devices }))
}

// ── Temperature ───────────────────────────────────────────────────────────────

/// One entry per `sysctl=value` line, e.g. `dev.cpu.0.temperature=45.0C`.
pub fn temperature_report(raw: &str) -> Value {
    let items: Vec<Value> = raw
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(device, value)| {
            let seq: String = device
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '+' || *c == '-')
                .collect();
            let zone = device.contains("hw.acpi");
            json!({
                "device":          device,
                "device_seq":      seq,
                "temperature":     value.replace('C', "").trim(),
                "type":            if zone { "zone" } else { "core" },
                "type_translated": if zone { "Zone" } else { "Core" },
            })
        })
        .collect();
    Value::Array(items)
}

// ── Firmware information ──────────────────────────────────────────────────────

const CHECK_LISTS: &[&str] = &[
    "upgrade_sets",
    "downgrade_packages",
    "new_packages",
    "reinstall_packages",
    "remove_packages",
    "upgrade_packages",
];

#[derive(Debug, Deserialize)]
struct Product {
    product_name:    String,
    product_version: String,
    #[serde(default)]
    product_arch:    String,
    #[serde(default)]
    product_id:      String,
    #[serde(default)]
    product_latest:  Option<String>,
    #[serde(default)]
    product_check:   Option<Map<String, Value>>,
}

/// Host details that do not come from the firmware product metadata.
#[derive(Debug, Clone, Default)]
pub struct HostInfo {
    /// `hostname.domain`.
    pub name:    Option<String>,
    /// e.g. `FreeBSD 14.1-RELEASE-p5`.
    pub kernel:  Option<String>,
    /// e.g. `OpenSSL 3.0.15 3 Sep 2024`.
    pub openssl: Option<String>,
}

/// Host name, version lines and whether updates are known to be pending.
pub fn information_report(raw: &str, host: &HostInfo) -> Result<Value> {
    let product: Product = serde_json::from_str(raw)?;
    let current = product.product_version.split('_').next().unwrap_or_default();

    // changelog data is only authoritative for production releases
    let from_changelog = !product.product_id.contains("-devel")
        && product.product_latest.as_deref().is_some_and(|l| !l.is_empty() && l != current);
    let from_check = product
        .product_check
        .as_ref()
        .is_some_and(|check| CHECK_LISTS.iter().any(|k| not_empty(check.get(*k))));

    let mut versions = vec![format!(
        "{} {}-{}",
        product.product_name, product.product_version, product.product_arch
    )];
    versions.extend(
        [&host.kernel, &host.openssl]
            .into_iter()
            .flatten()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
    );

    let mut out = Map::new();
    if let Some(name) = &host.name {
        out.insert("name".into(), json!(name));
    }
    out.insert("versions".into(), json!(versions));
    out.insert("updates_pending".into(), json!(from_changelog || from_check));
    Ok(Value::Object(out))
}

// ── Pass-through ──────────────────────────────────────────────────────────────

/// Sections shown as the backend prints them (mbuf and swap statistics);
/// only checked to be JSON.
pub fn passthrough_report(raw: &str) -> Result<Value> {
    Ok(serde_json::from_str(raw)?)
}

// ── JSON helpers ──────────────────────────────────────────────────────────────

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose emptiness: null, false, zero, `""`, `"0"` and empty containers.
fn not_empty(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}
