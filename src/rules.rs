//! Validation rules
//!
//! A rule is a named check run against one connection profile. Rules report
//! through a [`TaskListener`] and return `true` when the check passed.

use crate::config::ConnectionConfig;
use crate::db::catalog::{fetch_functions, fetch_schemas};
use crate::db::{Connector, Database, FunctionDescriptor};
use crate::error::DbResult;
use crate::task::{FunctionExecutionTask, Severity, TaskEvent, TaskListener};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub trait ValidationRule: Send + Sync {
    fn name(&self) -> String;

    fn description(&self) -> String;

    fn run(
        &self,
        profile: &ConnectionConfig,
        listener: &dyn TaskListener,
    ) -> impl Future<Output = bool> + Send;
}

/// Progress reporter that stamps events with the time since the rule started
struct Reporter<'a> {
    listener: &'a dyn TaskListener,
    started: Instant,
}

impl<'a> Reporter<'a> {
    fn new(listener: &'a dyn TaskListener) -> Self {
        Self {
            listener,
            started: Instant::now(),
        }
    }

    fn report(&self, percent: Option<u8>, severity: Severity, message: String) {
        severity.log(&message);
        let event = TaskEvent::new(percent, message, severity, self.started.elapsed());
        self.listener.progress(&event);
    }
}

/// Lists every function of a schema and fails when there are none.
///
/// Only routines of type `FUNCTION` count; procedures cannot be executed
/// with `SELECT` and are skipped.
pub struct DiscoverFunctionsRule<C> {
    connector: Arc<C>,
    schema: String,
    last_functions: Mutex<Vec<FunctionDescriptor>>,
}

impl<C: Connector> DiscoverFunctionsRule<C> {
    pub fn new(connector: Arc<C>, schema: impl Into<String>) -> Self {
        Self {
            connector,
            schema: schema.into(),
            last_functions: Mutex::new(Vec::new()),
        }
    }

    /// Functions found by the last successful run
    pub fn last_functions(&self) -> Vec<FunctionDescriptor> {
        self.last_functions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl<C: Connector> ValidationRule for DiscoverFunctionsRule<C> {
    fn name(&self) -> String {
        format!("Discover {} functions", self.schema)
    }

    fn description(&self) -> String {
        format!("Lists every function available in schema '{}'.", self.schema)
    }

    async fn run(&self, profile: &ConnectionConfig, listener: &dyn TaskListener) -> bool {
        let reporter = Reporter::new(listener);
        let schema = self.schema.as_str();
        reporter.report(
            Some(0),
            Severity::Info,
            format!("Checking functions in '{}' on \"{}\"", schema, profile.name),
        );

        let db = match self.connector.connect(profile).await {
            Ok(db) => db,
            Err(e) => {
                reporter.report(
                    Some(0),
                    Severity::Critical,
                    format!("Connection error while checking '{}': {}", schema, e),
                );
                return false;
            }
        };

        let functions = match functions_if_schema_exists(&db, schema).await {
            Ok(Some(functions)) => functions,
            Ok(None) => {
                reporter.report(
                    Some(0),
                    Severity::Critical,
                    format!("Schema '{}' not found", schema),
                );
                return false;
            }
            Err(e) => {
                reporter.report(
                    Some(0),
                    Severity::Critical,
                    format!("Error while listing functions in '{}': {}", schema, e),
                );
                return false;
            }
        };

        if functions.is_empty() {
            reporter.report(
                Some(0),
                Severity::Critical,
                format!("No functions found in '{}'", schema),
            );
            return false;
        }

        let total = functions.len();
        for (idx, function) in functions.iter().enumerate() {
            let done = idx + 1;
            let percent = u8::try_from(done * 100 / total).unwrap_or(100);
            reporter.report(
                Some(percent),
                Severity::Info,
                format!("{}/{}: function '{}' found", done, total, function.name),
            );
        }

        reporter.report(
            Some(100),
            Severity::Info,
            format!("Listing finished: {} function(s) found in '{}'", total, schema),
        );
        *self
            .last_functions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = functions;
        true
    }
}

async fn functions_if_schema_exists<D: Database>(
    db: &D,
    schema: &str,
) -> DbResult<Option<Vec<FunctionDescriptor>>> {
    let schemas = fetch_schemas(db).await?;
    if !schemas.iter().any(|s| s == schema) {
        return Ok(None);
    }
    fetch_functions(db, schema).await.map(Some)
}

/// Runs one zero-argument function and reports what it returned
pub struct ExecuteFunctionRule<C> {
    connector: Arc<C>,
    schema: String,
    function: String,
}

impl<C: Connector> ExecuteFunctionRule<C> {
    pub fn new(connector: Arc<C>, schema: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            connector,
            schema: schema.into(),
            function: function.into(),
        }
    }
}

impl<C: Connector> ValidationRule for ExecuteFunctionRule<C> {
    fn name(&self) -> String {
        format!("Execute {}", self.function)
    }

    fn description(&self) -> String {
        format!(
            "Executes function '{}' in schema '{}'.",
            self.function, self.schema
        )
    }

    async fn run(&self, profile: &ConnectionConfig, listener: &dyn TaskListener) -> bool {
        let mut task = FunctionExecutionTask::new(
            self.connector.clone(),
            profile.clone(),
            self.schema.clone(),
            self.function.clone(),
            Vec::new(),
        );
        let ok = task.run(listener).await;

        let reporter = Reporter::new(listener);
        if ok {
            let returned = task
                .result()
                .and_then(|r| r.scalar())
                .map(ToString::to_string)
                .unwrap_or_else(|| "no rows".to_string());
            reporter.report(
                Some(100),
                Severity::Info,
                format!(
                    "Function '{}' executed successfully. Returned: {}",
                    self.function, returned
                ),
            );
        } else {
            reporter.report(
                Some(0),
                Severity::Critical,
                format!(
                    "Error executing '{}': {}",
                    self.function,
                    task.error_message().unwrap_or("cancelled")
                ),
            );
        }
        ok
    }
}
