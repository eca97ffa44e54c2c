//! Database abstraction layer
//!
//! [`Connector`] turns a connection profile into a live [`Database`]
//! handle. The metadata services and the execution task only talk to these
//! traits, so tests can substitute a scripted backend for PostgreSQL.

pub mod catalog;
pub mod postgres;
pub mod types;

pub use catalog::{
    FunctionDescriptor, FunctionService, ParameterDescriptor, ParameterMode, SchemaService,
};
pub use postgres::{PostgresClient, PostgresConnector};
pub use types::{CellValue, ColumnDef, ParamValue, QueryResults, Row};

use crate::config::ConnectionConfig;
use crate::error::DbResult;
use std::future::Future;

/// A live database session
pub trait Database: Send + Sync {
    /// Run one statement with positional `$n` parameters and drain every row
    fn query(
        &self,
        sql: &str,
        params: &[ParamValue],
    ) -> impl Future<Output = DbResult<QueryResults>> + Send;

    /// Ask the server to abort the statement currently running on this
    /// session. The pending `query` future then resolves with
    /// `DbError::Cancelled`.
    fn cancel(&self) -> impl Future<Output = DbResult<()>> + Send {
        async { Ok(()) }
    }
}

/// Opens [`Database`] sessions from connection profiles
pub trait Connector: Send + Sync {
    type Handle: Database + 'static;

    /// Resolve the profile (including any `service` reference) and connect
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = DbResult<Self::Handle>> + Send;
}

/// Quote an SQL identifier unless it is a plain lowercase name
pub fn quote_ident(ident: &str) -> String {
    let plain = ident
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}
