//! JSON file profile store
//!
//! Profiles are kept as a pretty-printed JSON array, by default in
//! `~/.pgfunc/connections.json`. Writes go to a sibling temp file which is
//! then renamed over the target, so readers never see a partial file.

use crate::config::ConnectionConfig;
use crate::error::{ProfileError, ProfileResult};
use crate::repository::ProfileStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, message: impl ToString) -> ProfileError {
        ProfileError::Storage {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

impl ProfileStore for JsonFileStore {
    fn load(&self) -> ProfileResult<Vec<ConnectionConfig>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.storage_error(e)),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<ConnectionConfig>>(&content) {
            Ok(profiles) => Ok(profiles),
            Err(e) => {
                tracing::warn!(
                    "Failed to decode connections file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, profiles: &[ConnectionConfig]) -> ProfileResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.storage_error(e))?;
        }
        let content =
            serde_json::to_string_pretty(profiles).map_err(|e| self.storage_error(e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, content).map_err(|e| self.storage_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.storage_error(e))?;

        tracing::debug!(
            "Saved {} connection(s) to {}",
            profiles.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SslMode;
    use crate::repository::ConnectionRepository;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("nested").join("connections.json"))
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_loads_empty_and_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();

        let repo = ConnectionRepository::new(store.clone());
        assert!(repo.get_all().unwrap().is_empty());

        repo.add(ConnectionConfig::new("a", "h", "u")).unwrap();
        let reloaded = JsonFileStore::new(store.path()).load().unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_round_trip_preserves_fields_and_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut geo = ConnectionConfig::new("geo", "localhost", "u");
        geo.database = Some("gis".to_string());
        geo.password = Some("p".to_string());
        geo.service = Some("gis_svc".to_string());
        geo.ssl_mode = SslMode::Require;
        geo.is_default = true;
        let other = ConnectionConfig::new("other", "10.0.0.1", "postgres");

        store.save(&[geo.clone(), other.clone()]).unwrap();
        let loaded = JsonFileStore::new(store.path()).load().unwrap();
        assert_eq!(loaded, vec![geo, other]);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&[ConnectionConfig::new("a", "h", "u")]).unwrap();

        let entries: Vec<_> = std::fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("connections.json")]);
    }

    #[test]
    fn test_written_layout_uses_original_keys() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&[ConnectionConfig::new("a", "h", "u")]).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let record = &raw[0];
        for key in [
            "name", "host", "port", "database", "username", "password", "service", "sslmode",
            "is_default",
        ] {
            assert!(record.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(record["sslmode"], "prefer");
    }
}
