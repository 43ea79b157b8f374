//! The scanner settings.
//!
//! The scanner prints its effective settings when called with `-s`, one
//! `key = value` pair per line. The only setting required here is
//! `db_address`, the path of the redis socket (or `host:port`).

use std::collections::HashMap;
use std::process::Command;

use log::{debug, error, trace};
use regex::Regex;

use crate::errors::CacheError;

/// The default name of the scanner binary.
pub const DEFAULT_SCANNER: &str = "openvas";

/// Represents the settings of the scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerSettings {
    /// Where the knowledge base listens.
    pub db_address: String,
    /// Whether the scanner drops its privileges.
    pub drop_privileges: bool,
    /// Whether the scanner identifies hosts by MAC address.
    pub use_mac_addr: bool,
    /// Every setting, as printed by the scanner.
    pub raw: HashMap<String, String>,
}

impl ScannerSettings {
    /// Runs `<scanner> -s` and parses its output.
    pub fn from_scanner(scanner: &str) -> Result<Self, CacheError> {
        trace!("Running ScannerSettings::from_scanner()");
        let output = Command::new(scanner).arg("-s").output().map_err(|e| {
            error!("Unable to run {}: {}", scanner, e);
            CacheError::ConfigUnavailable(format!("unable to run {}: {}", scanner, e))
        })?;

        if !output.status.success() {
            error!("{} -s exited with {}", scanner, output.status);
            return Err(CacheError::ConfigUnavailable(format!(
                "{} -s exited with {}",
                scanner, output.status
            )));
        }

        Self::parse(&String::from_utf8_lossy(&output.stdout))
    }

    /// Parses a settings dump.
    /// Lines which are not `key = value` are ignored.
    pub fn parse(dump: &str) -> Result<Self, CacheError> {
        trace!("Running ScannerSettings::parse()");
        // Example: db_address = /run/redis/redis.sock
        let regex = Regex::new(r"^\s*(?P<key>[^=\s]+)\s*=\s*(?P<value>.*?)\s*$").unwrap();
        let mut raw: HashMap<String, String> = HashMap::new();
        for line in dump.lines() {
            if let Some(caps) = regex.captures(line) {
                raw.insert(caps["key"].to_string(), caps["value"].to_string());
            } else if !line.trim().is_empty() {
                debug!("Ignoring settings line {:?}", line);
            }
        }

        let db_address = match raw.get("db_address") {
            Some(address) if !address.is_empty() => address.clone(),
            _ => {
                error!("The scanner settings have no db_address");
                return Err(CacheError::ConfigUnavailable(
                    "db_address is not set".to_string(),
                ));
            }
        };

        Ok(ScannerSettings {
            db_address,
            drop_privileges: is_enabled(&raw, "drop_privileges"),
            use_mac_addr: is_enabled(&raw, "use_mac_addr"),
            raw,
        })
    }
}

/// Boolean settings are written yes / no.
fn is_enabled(raw: &HashMap<String, String>, key: &str) -> bool {
    raw.get(key).map_or(false, |v| v == "yes")
}
