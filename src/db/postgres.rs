//! PostgreSQL connector
//!
//! Concrete [`Connector`]/[`Database`] implementation using tokio-postgres.

use crate::config::{ConnectionConfig, SslMode};
use crate::db::types::{CellValue, ColumnDef, ParamValue, QueryResults, Row};
use crate::db::{Connector, Database};
use crate::error::{DbError, DbResult};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use std::time::{Duration, Instant};
use tokio_postgres::Client;
use tokio_postgres::types::{FromSql, Type};

const APPLICATION_NAME: &str = "pgfunc";

/// Opens tokio-postgres sessions with a bounded connect time
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    timeout: Duration,
}

impl PostgresConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn pg_config(&self, config: &ConnectionConfig) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        let host = if config.host.is_empty() {
            "localhost"
        } else {
            config.host.as_str()
        };
        pg.host(host)
            .port(config.port)
            .dbname(config.dbname())
            .user(&config.username)
            .application_name(APPLICATION_NAME)
            .connect_timeout(self.timeout)
            .ssl_mode(match config.ssl_mode {
                SslMode::Disable => tokio_postgres::config::SslMode::Disable,
                SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
                SslMode::Require => tokio_postgres::config::SslMode::Require,
            });
        if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
            pg.password(password);
        }
        pg
    }

    async fn open(&self, config: &ConnectionConfig) -> DbResult<Client> {
        let pg = self.pg_config(config);
        let name = config.name.clone();
        let client = match config.ssl_mode {
            SslMode::Disable => {
                let (client, connection) = pg
                    .connect(tokio_postgres::NoTls)
                    .await
                    .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::warn!("Connection \"{}\" lost: {}", name, e);
                    }
                });
                client
            }
            SslMode::Prefer | SslMode::Require => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
                let (client, connection) = pg
                    .connect(tls)
                    .await
                    .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::warn!("Connection \"{}\" lost: {}", name, e);
                    }
                });
                client
            }
        };
        Ok(client)
    }
}

impl Connector for PostgresConnector {
    type Handle = PostgresClient;

    async fn connect(&self, config: &ConnectionConfig) -> DbResult<PostgresClient> {
        let resolved = config
            .resolve_service()
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        tracing::debug!("Connecting to {}", resolved.connection_string());

        let client = tokio::time::timeout(self.timeout, self.open(&resolved))
            .await
            .map_err(|_| DbError::Timeout(self.timeout.as_secs()))??;

        Ok(PostgresClient {
            cancel_token: client.cancel_token(),
            client,
            ssl_mode: resolved.ssl_mode,
        })
    }
}

/// A connected PostgreSQL session
pub struct PostgresClient {
    /// The tokio-postgres client
    client: Client,
    /// Token for cancelling in-flight queries
    cancel_token: tokio_postgres::CancelToken,
    /// SSL mode (needed to cancel over the right transport)
    ssl_mode: SslMode,
}

impl Database for PostgresClient {
    async fn query(&self, sql: &str, params: &[ParamValue]) -> DbResult<QueryResults> {
        let start = Instant::now();

        let stmt = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| DbError::from_query(&e))?;

        let columns: Vec<ColumnDef> = stmt
            .columns()
            .iter()
            .map(|col| ColumnDef {
                name: col.name().to_string(),
                type_name: col.type_().name().to_string(),
            })
            .collect();

        let opaque: Vec<bool> = stmt.columns().iter().map(|c| !decodable(c.type_())).collect();
        let stmt = if opaque.contains(&true) {
            let wrapped = text_cast_sql(sql, &opaque);
            tracing::debug!("Re-preparing with text casts: {}", wrapped);
            self.client
                .prepare(&wrapped)
                .await
                .map_err(|e| DbError::from_query(&e))?
        } else {
            stmt
        };

        let pg_rows: Vec<tokio_postgres::Row> = self
            .client
            .query_raw(&stmt, params.iter())
            .await
            .map_err(|e| DbError::from_query(&e))?
            .try_collect()
            .await
            .map_err(|e| DbError::from_query(&e))?;

        let rows: Vec<Row> = pg_rows
            .iter()
            .map(|pg_row| Row::new((0..columns.len()).map(|i| extract_cell_value(pg_row, i)).collect()))
            .collect();
        let row_count = rows.len();

        Ok(QueryResults::new(columns, rows, start.elapsed(), row_count))
    }

    /// Send a cancel request for the currently running query.
    async fn cancel(&self) -> DbResult<()> {
        match self.ssl_mode {
            SslMode::Disable => self.cancel_token.cancel_query(tokio_postgres::NoTls).await,
            SslMode::Prefer | SslMode::Require => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
                self.cancel_token.cancel_query(tls).await
            }
        }
        .map_err(|e| DbError::QueryFailed(format!("Cancel failed: {}", e)))
    }
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> rustls::ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let loaded = native_certs
        .certs
        .into_iter()
        .filter(|cert| root_store.add(cert.clone()).is_ok())
        .count();
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Whether [`extract_cell_value`] has a binary decoder for `ty`
fn decodable(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::VOID
            | Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::JSON
            | Type::JSONB
            | Type::BYTEA
            | Type::UUID
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::DATE
            | Type::TIME
            | Type::BOOL_ARRAY
            | Type::INT2_ARRAY
            | Type::INT4_ARRAY
            | Type::INT8_ARRAY
            | Type::FLOAT8_ARRAY
            | Type::TEXT_ARRAY
            | Type::VARCHAR_ARRAY
            | Type::NAME_ARRAY
            | Type::JSON_ARRAY
            | Type::JSONB_ARRAY
    ) || <String as FromSql>::accepts(ty)
}

/// Wrap `sql` so the flagged output columns come back as `::text`.
///
/// Records, geometric types and extension types such as PostGIS geometry
/// have no binary decoder here; the server renders them instead.
fn text_cast_sql(sql: &str, opaque: &[bool]) -> String {
    let aliases: Vec<String> = (1..=opaque.len()).map(|i| format!("c{}", i)).collect();
    let select: Vec<String> = aliases
        .iter()
        .zip(opaque)
        .map(|(alias, &cast)| {
            if cast {
                format!("q.{}::text", alias)
            } else {
                format!("q.{}", alias)
            }
        })
        .collect();
    format!(
        "SELECT {} FROM ({}) AS q({})",
        select.join(", "),
        sql.trim().trim_end_matches(';'),
        aliases.join(", ")
    )
}

/// Decode column `idx` as `T`, falling back to text when the type does not match
fn typed<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, wrap: F) -> CellValue
where
    T: FromSql<'a>,
    F: FnOnce(T) -> CellValue,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => CellValue::Null,
        Err(_) => try_as_string(row, idx),
    }
}

fn array<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, wrap: F) -> CellValue
where
    T: FromSql<'a>,
    F: Fn(T) -> CellValue,
{
    typed::<Vec<T>, _>(row, idx, |items| {
        CellValue::Array(items.into_iter().map(&wrap).collect())
    })
}

/// Extract a cell value from a tokio_postgres Row based on the column type.
///
/// Types outside [`decodable`] have already been cast to text by the
/// server, so the catch-all arm reads them as strings.
fn extract_cell_value(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    let pg_type = row.columns()[idx].type_();
    match *pg_type {
        Type::VOID => CellValue::Null,
        Type::BOOL => typed(row, idx, CellValue::Boolean),
        Type::INT2 => typed(row, idx, |v: i16| CellValue::Integer(v.into())),
        Type::INT4 => typed(row, idx, |v: i32| CellValue::Integer(v.into())),
        Type::INT8 => typed(row, idx, CellValue::Integer),
        Type::OID => typed(row, idx, |v: u32| CellValue::Integer(v.into())),
        Type::FLOAT4 => typed(row, idx, |v: f32| CellValue::Float(v.into())),
        Type::FLOAT8 => typed(row, idx, CellValue::Float),
        Type::NUMERIC => typed(row, idx, |v: Decimal| CellValue::Text(v.to_string())),
        Type::JSON | Type::JSONB => typed(row, idx, CellValue::Json),
        Type::BYTEA => typed(row, idx, CellValue::Binary),
        Type::UUID => typed(row, idx, |v: uuid::Uuid| CellValue::Uuid(v.to_string())),
        Type::TIMESTAMP => typed(row, idx, |v: chrono::NaiveDateTime| {
            CellValue::DateTime(v.to_string())
        }),
        Type::TIMESTAMPTZ => typed(row, idx, |v: chrono::DateTime<chrono::Utc>| {
            CellValue::DateTime(v.to_rfc3339())
        }),
        Type::DATE => typed(row, idx, |v: chrono::NaiveDate| CellValue::DateTime(v.to_string())),
        Type::TIME => typed(row, idx, |v: chrono::NaiveTime| CellValue::DateTime(v.to_string())),
        Type::BOOL_ARRAY => array(row, idx, CellValue::Boolean),
        Type::INT2_ARRAY => array(row, idx, |v: i16| CellValue::Integer(v.into())),
        Type::INT4_ARRAY => array(row, idx, |v: i32| CellValue::Integer(v.into())),
        Type::INT8_ARRAY => array(row, idx, CellValue::Integer),
        Type::FLOAT8_ARRAY => array(row, idx, CellValue::Float),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY => {
            array(row, idx, CellValue::Text)
        }
        Type::JSON_ARRAY | Type::JSONB_ARRAY => array(row, idx, CellValue::Json),
        _ => try_as_string(row, idx),
    }
}

/// Try to extract a value as a string (fallback for type mismatches).
///
/// When even the string fallback fails, includes the postgres type name
/// in the message so the user knows what type couldn't be displayed.
fn try_as_string(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    match row.try_get::<_, Option<String>>(idx) {
        Ok(Some(v)) => CellValue::Text(v),
        Ok(None) => CellValue::Null,
        Err(_) => {
            let type_name = row
                .columns()
                .get(idx)
                .map_or("unknown", |c| c.type_().name());
            CellValue::Text(format!("<unable to display: {}>", type_name))
        }
    }
}
