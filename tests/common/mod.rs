//! Common test utilities and helpers
//!
//! A scripted in-memory backend standing in for PostgreSQL: queries are
//! answered by the first response whose SQL fragment matches.

#![allow(dead_code)]

use pgfunc::config::ConnectionConfig;
use pgfunc::db::{CellValue, ColumnDef, Connector, Database, ParamValue, QueryResults, Row};
use pgfunc::error::{DbError, DbResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone)]
enum Response {
    Rows(QueryResults),
    Error(String),
}

#[derive(Default)]
struct Shared {
    responses: Vec<(String, Response)>,
    connect_error: Option<String>,
    delay: Duration,
    connect_delay: Duration,
    connects: AtomicUsize,
    cancels: AtomicUsize,
    queries: Mutex<Vec<(String, Vec<ParamValue>)>>,
}

/// Fake [`Connector`] with scripted answers
#[derive(Clone, Default)]
pub struct FakeConnector {
    shared: Arc<Shared>,
}

pub struct FakeDb {
    shared: Arc<Shared>,
    cancelled: Notify,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn shared_mut(&mut self) -> &mut Shared {
        Arc::get_mut(&mut self.shared).expect("configure the fake before sharing it")
    }

    /// Answer queries containing `fragment` with these text rows
    pub fn with_rows(mut self, fragment: &str, columns: &[&str], rows: Vec<Vec<CellValue>>) -> Self {
        let results = results(columns, rows);
        self.shared_mut()
            .responses
            .push((fragment.to_string(), Response::Rows(results)));
        self
    }

    /// Fail queries containing `fragment` with a server error
    pub fn with_error(mut self, fragment: &str, message: &str) -> Self {
        self.shared_mut()
            .responses
            .push((fragment.to_string(), Response::Error(message.to_string())));
        self
    }

    /// Refuse every connection attempt
    pub fn failing_connect(mut self, message: &str) -> Self {
        self.shared_mut().connect_error = Some(message.to_string());
        self
    }

    /// Hold every query for `delay` unless it is cancelled first
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.shared_mut().delay = delay;
        self
    }

    /// Take `delay` to answer every connection attempt
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.shared_mut().connect_delay = delay;
        self
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.shared.cancels.load(Ordering::SeqCst)
    }

    /// Every statement received, with its bound parameters
    pub fn queries(&self) -> Vec<(String, Vec<ParamValue>)> {
        self.shared.queries.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    type Handle = FakeDb;

    async fn connect(&self, _config: &ConnectionConfig) -> DbResult<FakeDb> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if !self.shared.connect_delay.is_zero() {
            tokio::time::sleep(self.shared.connect_delay).await;
        }
        if let Some(message) = &self.shared.connect_error {
            return Err(DbError::ConnectionFailed(message.clone()));
        }
        Ok(FakeDb {
            shared: self.shared.clone(),
            cancelled: Notify::new(),
        })
    }
}

impl Database for FakeDb {
    async fn query(&self, sql: &str, params: &[ParamValue]) -> DbResult<QueryResults> {
        self.shared
            .queries
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));

        if !self.shared.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.shared.delay) => {}
                _ = self.cancelled.notified() => return Err(DbError::Cancelled),
            }
        }

        let response = self
            .shared
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, response)| response.clone());
        match response {
            Some(Response::Rows(results)) => Ok(results),
            Some(Response::Error(message)) => Err(DbError::QueryFailed(message)),
            None => Err(DbError::QueryFailed(format!("no scripted response for: {}", sql))),
        }
    }

    async fn cancel(&self) -> DbResult<()> {
        self.shared.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.notify_one();
        Ok(())
    }
}

pub fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

pub fn results(columns: &[&str], rows: Vec<Vec<CellValue>>) -> QueryResults {
    let count = rows.len();
    QueryResults::new(
        columns
            .iter()
            .map(|name| ColumnDef {
                name: name.to_string(),
                type_name: "text".to_string(),
            })
            .collect(),
        rows.into_iter().map(Row::new).collect(),
        Duration::from_millis(1),
        count,
    )
}

/// The `geo` profile used across scenarios
pub fn geo_profile() -> ConnectionConfig {
    let mut config = ConnectionConfig::new("geo", "localhost", "u");
    config.database = Some("gis".to_string());
    config.password = Some("p".to_string());
    config
}

/// Backend whose `muvd` schema holds `f0()` and `f1(x int)`
pub fn muvd_backend() -> FakeConnector {
    FakeConnector::new()
        .with_rows(
            "information_schema.schemata",
            &["schema_name"],
            vec![vec![text("public")], vec![text("muvd")], vec![text("pg_catalog")]],
        )
        .with_rows(
            "information_schema.routines",
            &["routine_name", "data_type", "specific_name", "input_arity"],
            vec![
                vec![text("f0"), text("integer"), text("f0_16400"), CellValue::Integer(0)],
                vec![text("f1"), text("integer"), text("f1_16401"), CellValue::Integer(1)],
            ],
        )
        .with_rows(
            "information_schema.parameters",
            &["parameter_name", "data_type", "parameter_mode", "ordinal_position"],
            vec![
                vec![text("x"), text("integer"), text("IN"), CellValue::Integer(1)],
                vec![CellValue::Null, text("text"), text("INOUT"), CellValue::Integer(2)],
                vec![text("r"), text("integer"), text("OUT"), CellValue::Integer(3)],
            ],
        )
}
