//! Hierarchical settings profile store
//!
//! Mirrors the desktop GIS settings layout: one group per profile under
//! `PostgreSQL/connections/<name>` with string keys, plus a scalar key that
//! names the default connection. `/` and `%` in a profile name are
//! percent-encoded in its group segment. The raw store is only reachable through
//! [`SettingsBackend`], so tests can inject an in-memory one.

use crate::config::{ConnectionConfig, SslMode};
use crate::error::{ProfileError, ProfileResult};
use crate::repository::ProfileStore;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

/// Group holding one sub-group per connection
pub const CONNECTIONS_GROUP: &str = "PostgreSQL/connections";

/// Scalar key naming the default connection
pub const DEFAULT_CONNECTION_KEY: &str = "pgfunc/default_connection";

/// Characters escaped when a profile name becomes a group segment
const SEGMENT: &AsciiSet = &CONTROLS.add(b'/').add(b'%');

const PROFILE_KEYS: [&str; 7] = [
    "host", "port", "database", "username", "password", "service", "sslmode",
];

/// A slash-separated key/value settings store
pub trait SettingsBackend: Send {
    /// Immediate child group names under `group`, sorted
    fn child_groups(&self, group: &str) -> Vec<String>;

    fn value(&self, key: &str) -> Option<String>;

    fn set_value(&mut self, key: &str, value: &str);

    /// Remove a key and everything nested beneath it
    fn remove(&mut self, key: &str);

    /// Flush pending writes to durable storage
    fn sync(&self) -> std::io::Result<()>;

    /// Human-readable location for error messages
    fn location(&self) -> PathBuf;
}

/// Settings backed by a flat TOML table, optionally persisted to a file
#[derive(Debug, Default, Clone)]
pub struct SettingsFile {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl SettingsFile {
    /// Settings that live only in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a settings file; a missing or malformed file starts empty
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse settings file {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path: Some(path),
            values,
        })
    }
}

impl SettingsBackend for SettingsFile {
    fn child_groups(&self, group: &str) -> Vec<String> {
        let prefix = format!("{}/", group.trim_end_matches('/'));
        let groups: BTreeSet<String> = self
            .values
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split_once('/').map(|(child, _)| child.to_string()))
            .collect();
        groups.into_iter().collect()
    }

    fn value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_value(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        let prefix = format!("{}/", key);
        self.values.retain(|k, _| k != key && !k.starts_with(&prefix));
    }

    fn sync(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string(&self.values)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)
    }

    fn location(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from("<memory>"))
    }
}

/// Profile store over a [`SettingsBackend`]
pub struct SettingsProfileStore<B> {
    backend: Mutex<B>,
}

impl<B: SettingsBackend> SettingsProfileStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Run a closure against the raw backend
    pub fn with_backend<T>(&self, f: impl FnOnce(&mut B) -> T) -> T {
        let mut backend = self
            .backend
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut backend)
    }
}

/// Group segment for a profile name; `/` and `%` are percent-encoded
fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, SEGMENT).to_string()
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn group(segment: &str) -> String {
    format!("{}/{}", CONNECTIONS_GROUP, segment)
}

fn group_key(segment: &str, key: &str) -> String {
    format!("{}/{}", group(segment), key)
}

fn read_profile(
    backend: &dyn SettingsBackend,
    segment: &str,
    default: Option<&str>,
) -> ConnectionConfig {
    let name = decode_segment(segment);
    let get = |key: &str| backend.value(&group_key(segment, key)).unwrap_or_default();
    let non_empty = |key: &str| Some(get(key)).filter(|v| !v.is_empty());

    let port_raw = get("port");
    let port = match port_raw.trim() {
        "" => 5432,
        raw => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Connection \"{}\" has invalid port '{}'; using 5432", name, raw);
            5432
        }),
    };

    ConnectionConfig {
        is_default: default == Some(name.as_str()),
        name,
        host: get("host"),
        port,
        database: non_empty("database"),
        username: get("username"),
        password: non_empty("password"),
        service: non_empty("service"),
        ssl_mode: non_empty("sslmode")
            .map(|mode| SslMode::parse(&mode))
            .unwrap_or_default(),
    }
}

fn write_profile(backend: &mut dyn SettingsBackend, config: &ConnectionConfig) {
    let segment = encode_segment(&config.name);
    let port = config.port.to_string();
    let values = [
        config.host.as_str(),
        port.as_str(),
        config.database.as_deref().unwrap_or(""),
        config.username.as_str(),
        config.password.as_deref().unwrap_or(""),
        config.service.as_deref().unwrap_or(""),
        config.ssl_mode.as_str(),
    ];
    for (key, value) in PROFILE_KEYS.iter().zip(values) {
        backend.set_value(&group_key(&segment, key), value);
    }
}

impl<B: SettingsBackend> ProfileStore for SettingsProfileStore<B> {
    fn load(&self) -> ProfileResult<Vec<ConnectionConfig>> {
        self.with_backend(|backend| {
            let backend: &B = backend;
            let default = backend.value(DEFAULT_CONNECTION_KEY);
            Ok(backend
                .child_groups(CONNECTIONS_GROUP)
                .iter()
                .map(|segment| read_profile(backend, segment, default.as_deref()))
                .collect())
        })
    }

    fn save(&self, profiles: &[ConnectionConfig]) -> ProfileResult<()> {
        self.with_backend(|backend| {
            let keep: BTreeSet<String> = profiles.iter().map(|c| encode_segment(&c.name)).collect();
            for stale in backend.child_groups(CONNECTIONS_GROUP) {
                if !keep.contains(&stale) {
                    backend.remove(&group(&stale));
                }
            }
            for config in profiles {
                write_profile(backend, config);
            }
            match profiles.iter().find(|c| c.is_default) {
                Some(default) => backend.set_value(DEFAULT_CONNECTION_KEY, &default.name),
                None => backend.remove(DEFAULT_CONNECTION_KEY),
            }
            backend.sync().map_err(|e| ProfileError::Storage {
                path: backend.location(),
                message: e.to_string(),
            })
        })
    }
}
