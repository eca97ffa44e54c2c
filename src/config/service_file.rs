//! libpq connection service file
//!
//! Profiles may name a `service`; its parameters come from the `[name]`
//! section of `$PGSERVICEFILE`, or `~/.pg_service.conf` when unset.

use crate::config::connections::SslMode;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Parameters defined for one service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEntry {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub sslmode: Option<SslMode>,
}

/// Location of the per-user service file
pub fn service_file_path() -> ConfigResult<PathBuf> {
    if let Some(path) = std::env::var_os("PGSERVICEFILE") {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".pg_service.conf"))
}

/// Look a service up in the per-user service file
pub fn lookup(service: &str) -> ConfigResult<ServiceEntry> {
    lookup_in(&service_file_path()?, service)
}

/// Look a service up in a specific file
pub fn lookup_in(path: &Path, service: &str) -> ConfigResult<ServiceEntry> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, service).ok_or_else(|| ConfigError::ServiceNotFound(service.to_string()))
}

/// Parse INI-style content and return the named section
fn parse(content: &str, service: &str) -> Option<ServiceEntry> {
    let mut in_section = false;
    let mut found = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = section.trim() == service;
            if in_section {
                found.get_or_insert_with(ServiceEntry::default);
            }
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        if let Some(entry) = found.as_mut() {
            match key.trim() {
                "host" | "hostaddr" => entry.host = Some(value),
                "port" => entry.port = value.parse().ok(),
                "dbname" => entry.dbname = Some(value),
                "user" => entry.user = Some(value),
                "password" => entry.password = Some(value),
                "sslmode" => entry.sslmode = Some(SslMode::parse(&value)),
                _ => {}
            }
        }
    }

    found
}
