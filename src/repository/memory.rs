//! In-process profile store

use crate::config::ConnectionConfig;
use crate::error::ProfileResult;
use crate::repository::ProfileStore;
use std::sync::Mutex;

/// Keeps profiles in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: Mutex<Vec<ConnectionConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: Vec<ConnectionConfig>) -> Self {
        Self {
            profiles: Mutex::new(profiles),
        }
    }
}

impl ProfileStore for MemoryStore {
    fn load(&self) -> ProfileResult<Vec<ConnectionConfig>> {
        Ok(self
            .profiles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, profiles: &[ConnectionConfig]) -> ProfileResult<()> {
        *self
            .profiles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = profiles.to_vec();
        Ok(())
    }
}
