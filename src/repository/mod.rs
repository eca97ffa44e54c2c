//! Connection profile repository
//!
//! [`ConnectionRepository`] owns the profile invariants (unique names, at
//! most one default) and delegates persistence to a [`ProfileStore`]
//! adapter. Every mutation is a whole-collection read-modify-write, so a
//! read always observes the last completed write.

pub mod json;
pub mod memory;
pub mod settings_store;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use settings_store::{SettingsBackend, SettingsFile, SettingsProfileStore};

use crate::config::ConnectionConfig;
use crate::error::{ProfileError, ProfileResult};
use std::collections::HashSet;
use std::sync::Mutex;

/// Persistence adapter for connection profiles
///
/// Implementations must be durable, return the latest completed `save` from
/// `load`, and treat malformed content as an empty collection (logged, not
/// an error).
pub trait ProfileStore: Send + Sync {
    /// Read every stored profile
    fn load(&self) -> ProfileResult<Vec<ConnectionConfig>>;

    /// Replace the stored collection
    fn save(&self, profiles: &[ConnectionConfig]) -> ProfileResult<()>;
}

impl<S: ProfileStore + ?Sized> ProfileStore for Box<S> {
    fn load(&self) -> ProfileResult<Vec<ConnectionConfig>> {
        (**self).load()
    }

    fn save(&self, profiles: &[ConnectionConfig]) -> ProfileResult<()> {
        (**self).save(profiles)
    }
}

/// Profile CRUD over any [`ProfileStore`]
pub struct ConnectionRepository<S> {
    store: S,
    write_lock: Mutex<()>,
}

impl<S: ProfileStore> ConnectionRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get_all(&self) -> ProfileResult<Vec<ConnectionConfig>> {
        Ok(self.load_set()?.into_vec())
    }

    pub fn get_by_name(&self, name: &str) -> ProfileResult<Option<ConnectionConfig>> {
        Ok(self.load_set()?.get(name).cloned())
    }

    /// Append a new profile; fails with `DuplicateName` if the name is taken
    pub fn add(&self, config: ConnectionConfig) -> ProfileResult<()> {
        self.modify(|set| set.add(config))
    }

    /// Replace the profile with the same name; fails with `NotFound`
    pub fn update(&self, config: ConnectionConfig) -> ProfileResult<()> {
        self.modify(|set| set.update(config))
    }

    /// Remove a profile; fails with `NotFound`
    pub fn delete(&self, name: &str) -> ProfileResult<()> {
        self.modify(|set| set.delete(name))
    }

    /// Mark one profile as default and clear the flag on all others
    pub fn set_default(&self, name: &str) -> ProfileResult<()> {
        self.modify(|set| set.set_default(name))
    }

    fn load_set(&self) -> ProfileResult<ProfileSet> {
        Ok(ProfileSet::normalized(self.store.load()?))
    }

    fn modify<F>(&self, change: F) -> ProfileResult<()>
    where
        F: FnOnce(&mut ProfileSet) -> ProfileResult<()>,
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut set = self.load_set()?;
        change(&mut set)?;
        self.store.save(set.as_slice())
    }
}

/// In-memory profile collection enforcing the repository invariants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSet {
    profiles: Vec<ConnectionConfig>,
}

impl ProfileSet {
    /// Build a set from stored records, dropping repeated names and any
    /// default flag after the first one.
    pub fn normalized(records: Vec<ConnectionConfig>) -> Self {
        let mut seen = HashSet::new();
        let mut default_seen = false;
        let mut profiles = Vec::with_capacity(records.len());

        for mut record in records {
            if !seen.insert(record.name.clone()) {
                tracing::warn!("Ignoring duplicate stored connection \"{}\"", record.name);
                continue;
            }
            if record.is_default {
                if default_seen {
                    tracing::warn!(
                        "Connection \"{}\" was also marked default; clearing",
                        record.name
                    );
                    record.is_default = false;
                }
                default_seen = true;
            }
            profiles.push(record);
        }

        Self { profiles }
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionConfig> {
        self.profiles.iter().find(|c| c.name == name)
    }

    pub fn default_profile(&self) -> Option<&ConnectionConfig> {
        self.profiles.iter().find(|c| c.is_default)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn as_slice(&self) -> &[ConnectionConfig] {
        &self.profiles
    }

    pub fn into_vec(self) -> Vec<ConnectionConfig> {
        self.profiles
    }

    pub fn add(&mut self, config: ConnectionConfig) -> ProfileResult<()> {
        if self.get(&config.name).is_some() {
            return Err(ProfileError::DuplicateName(config.name));
        }
        if config.is_default {
            self.clear_default();
        }
        self.profiles.push(config);
        Ok(())
    }

    pub fn update(&mut self, config: ConnectionConfig) -> ProfileResult<()> {
        let idx = self
            .position(&config.name)
            .ok_or_else(|| ProfileError::NotFound(config.name.clone()))?;
        if config.is_default {
            self.clear_default();
        }
        self.profiles[idx] = config;
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> ProfileResult<()> {
        let idx = self
            .position(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        self.profiles.remove(idx);
        Ok(())
    }

    pub fn set_default(&mut self, name: &str) -> ProfileResult<()> {
        if self.position(name).is_none() {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        for profile in &mut self.profiles {
            profile.is_default = profile.name == name;
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.profiles.iter().position(|c| c.name == name)
    }

    fn clear_default(&mut self) {
        for profile in &mut self.profiles {
            profile.is_default = false;
        }
    }
}
