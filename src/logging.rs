//! Logging backend selection shared by both binaries.

use std::process;

/// Route the `log` facade to syslog, or to stderr via `env_logger`.
///
/// `RUST_LOG` overrides `default_level` for the stderr backend.
pub fn setup_logging(name: &str, use_syslog: bool, default_level: log::LevelFilter) -> anyhow::Result<()> {
    if use_syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process:  name.into(),
            pid:      process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| anyhow::anyhow!("syslog connect failed: {e}"))?;
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map(|()| log::set_max_level(default_level))
            .map_err(|e| anyhow::anyhow!("set_logger: {e}"))?;
    } else {
        env_logger::Builder::new()
            .filter_level(default_level)
            .parse_default_env()
            .try_init()
            .map_err(|e| anyhow::anyhow!("set_logger: {e}"))?;
    }
    Ok(())
}
