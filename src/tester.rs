//! Connection probing

use crate::config::ConnectionConfig;
use crate::db::{Connector, Database, PostgresConnector};
use std::future::Future;
use std::time::Duration;

/// Default connect timeout used when probing a profile
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Reports whether a profile can reach its database.
///
/// Never fails: every error collapses to `false` plus a log entry.
pub trait ConnectionTester: Send + Sync {
    fn test(&self, config: &ConnectionConfig) -> impl Future<Output = bool> + Send;
}

/// Probes a profile by connecting and running `SELECT 1`
#[derive(Debug, Clone)]
pub struct ConnectorTester<C> {
    connector: C,
}

impl<C: Connector> ConnectorTester<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

impl ConnectorTester<PostgresConnector> {
    /// PostgreSQL tester with the given connect timeout
    pub fn postgres(timeout: Duration) -> Self {
        Self::new(PostgresConnector::new(timeout))
    }
}

impl Default for ConnectorTester<PostgresConnector> {
    fn default() -> Self {
        Self::postgres(TEST_TIMEOUT)
    }
}

pub type PostgresConnectionTester = ConnectorTester<PostgresConnector>;

impl<C: Connector> ConnectionTester for ConnectorTester<C> {
    async fn test(&self, config: &ConnectionConfig) -> bool {
        let db = match self.connector.connect(config).await {
            Ok(db) => db,
            Err(e) => {
                tracing::error!("Connection test for \"{}\" failed: {}", config.name, e);
                return false;
            }
        };
        match db.query("SELECT 1", &[]).await {
            Ok(_) => {
                tracing::info!(
                    "Connection test for \"{}\" succeeded ({}@{}:{}/{})",
                    config.name,
                    config.username,
                    config.host,
                    config.port,
                    config.dbname()
                );
                true
            }
            Err(e) => {
                tracing::error!("Connection test for \"{}\" failed: {}", config.name, e);
                false
            }
        }
    }
}
