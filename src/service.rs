//! Connection profile service
//!
//! Thin orchestration over the repository and the tester. Every call logs
//! its outcome; repository errors are passed on unchanged.

use crate::config::ConnectionConfig;
use crate::error::{ProfileError, ProfileResult};
use crate::repository::{ConnectionRepository, ProfileStore};
use crate::tester::ConnectionTester;

pub struct ConnectionService<S, T> {
    repository: ConnectionRepository<S>,
    tester: T,
}

impl<S: ProfileStore, T: ConnectionTester> ConnectionService<S, T> {
    pub fn new(repository: ConnectionRepository<S>, tester: T) -> Self {
        Self { repository, tester }
    }

    pub fn repository(&self) -> &ConnectionRepository<S> {
        &self.repository
    }

    pub fn get_all_connections(&self) -> ProfileResult<Vec<ConnectionConfig>> {
        logged("load connections", self.repository.get_all())
    }

    pub fn get_connection_by_name(&self, name: &str) -> ProfileResult<Option<ConnectionConfig>> {
        logged(
            &format!("load connection \"{}\"", name),
            self.repository.get_by_name(name),
        )
    }

    /// Like [`get_connection_by_name`](Self::get_connection_by_name), but a
    /// missing profile is `NotFound`
    pub fn require_connection(&self, name: &str) -> ProfileResult<ConnectionConfig> {
        self.get_connection_by_name(name)?
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    pub fn add_connection(&self, config: ConnectionConfig) -> ProfileResult<()> {
        let name = config.name.clone();
        logged(
            &format!("add connection \"{}\"", name),
            self.repository.add(config),
        )?;
        tracing::info!("Connection \"{}\" added", name);
        Ok(())
    }

    pub fn update_connection(&self, config: ConnectionConfig) -> ProfileResult<()> {
        let name = config.name.clone();
        logged(
            &format!("update connection \"{}\"", name),
            self.repository.update(config),
        )?;
        tracing::info!("Connection \"{}\" updated", name);
        Ok(())
    }

    pub fn delete_connection(&self, name: &str) -> ProfileResult<()> {
        logged(
            &format!("delete connection \"{}\"", name),
            self.repository.delete(name),
        )?;
        tracing::info!("Connection \"{}\" deleted", name);
        Ok(())
    }

    pub fn set_default_connection(&self, name: &str) -> ProfileResult<()> {
        logged(
            &format!("set default connection \"{}\"", name),
            self.repository.set_default(name),
        )?;
        tracing::info!("Connection \"{}\" is now the default", name);
        Ok(())
    }

    /// The profile marked default; `NoDefaultDefined` when none is marked,
    /// even if profiles exist
    pub fn get_default_connection(&self) -> ProfileResult<ConnectionConfig> {
        let default = self
            .get_all_connections()?
            .into_iter()
            .find(|c| c.is_default);
        match default {
            Some(config) => Ok(config),
            None => {
                tracing::warn!("No default connection defined");
                Err(ProfileError::NoDefaultDefined)
            }
        }
    }

    /// Named profile, or the default one when `name` is `None`
    pub fn resolve(&self, name: Option<&str>) -> ProfileResult<ConnectionConfig> {
        match name {
            Some(name) => self.require_connection(name),
            None => self.get_default_connection(),
        }
    }

    pub async fn test_connection(&self, config: &ConnectionConfig) -> bool {
        self.tester.test(config).await
    }
}

fn logged<T>(action: &str, result: ProfileResult<T>) -> ProfileResult<T> {
    if let Err(e) = &result {
        tracing::error!("Failed to {}: {}", action, e);
    }
    result
}
