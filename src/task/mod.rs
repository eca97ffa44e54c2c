//! Background function execution
//!
//! A [`FunctionExecutionTask`] runs `SELECT schema.function(...)` once,
//! reports progress to a [`TaskListener`] and ends in exactly one of
//! `Succeeded`, `Failed` or `Cancelled`. Cancellation is cooperative. A
//! pending connect is abandoned as soon as the token fires. A statement
//! already running is asked to stop through the provider's cancel request.

pub mod cancel;
pub mod events;
pub mod runner;

pub use cancel::CancellationToken;
pub use events::{ChannelListener, NoopListener, Severity, TaskEvent, TaskListener, TaskNotification};
pub use runner::{TaskHandle, TaskRunner};

use crate::config::ConnectionConfig;
use crate::db::{Connector, Database, ParamValue, QueryResults, quote_ident};
use crate::error::{DbError, DbResult};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

/// One invocation of a stored function
pub struct FunctionExecutionTask<C> {
    connector: Arc<C>,
    profile: ConnectionConfig,
    schema: String,
    function: String,
    parameters: Vec<ParamValue>,
    token: CancellationToken,
    state: TaskState,
    result: Option<QueryResults>,
    error_message: Option<String>,
    started: Option<Instant>,
    elapsed: Duration,
    notified: bool,
}

impl<C: Connector> FunctionExecutionTask<C> {
    pub fn new(
        connector: Arc<C>,
        profile: ConnectionConfig,
        schema: impl Into<String>,
        function: impl Into<String>,
        parameters: Vec<ParamValue>,
    ) -> Self {
        Self {
            connector,
            profile,
            schema: schema.into(),
            function: function.into(),
            parameters,
            token: CancellationToken::new(),
            state: TaskState::Pending,
            result: None,
            error_message: None,
            started: None,
            elapsed: Duration::ZERO,
            notified: false,
        }
    }

    /// Human-readable title
    pub fn description(&self) -> String {
        format!("Executing function {}.{}", self.schema, self.function)
    }

    /// Statement sent to the server, with `$n` placeholders
    pub fn sql(&self) -> String {
        let placeholders: Vec<String> =
            (1..=self.parameters.len()).map(|i| format!("${}", i)).collect();
        format!("SELECT {}({})", self.qualified_name(), placeholders.join(", "))
    }

    /// Statement with parameters rendered inline, for display only
    pub fn display_sql(&self) -> String {
        let args: Vec<String> = self
            .parameters
            .iter()
            .map(ParamValue::to_sql_literal)
            .collect();
        format!("SELECT {}({})", self.qualified_name(), args.join(", "))
    }

    fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.function))
    }

    pub fn profile(&self) -> &ConnectionConfig {
        &self.profile
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Materialized rows; only set once the task succeeded
    pub fn result(&self) -> Option<&QueryResults> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<QueryResults> {
        self.result.take()
    }

    /// Set whenever the task failed
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Wall time spent in `run`
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A token that cancels this task from elsewhere
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Execute the function; returns `true` on success.
    ///
    /// Only the first call does anything. Later calls log and return `false`.
    pub async fn run(&mut self, listener: &dyn TaskListener) -> bool {
        if self.state != TaskState::Pending {
            tracing::warn!("{} already ran ({})", self.description(), self.state);
            return false;
        }
        let started = Instant::now();
        self.started = Some(started);
        self.state = TaskState::Running;
        self.emit(
            listener,
            Some(0),
            Severity::Info,
            format!("{}: {}", self.description(), self.display_sql()),
        );

        let outcome = self.execute(listener).await;
        self.elapsed = started.elapsed();

        match outcome {
            Ok(Some(results)) => {
                self.state = TaskState::Succeeded;
                self.emit(
                    listener,
                    Some(100),
                    Severity::Info,
                    format!(
                        "Function {}.{} returned {} row(s) in {:.2?}",
                        self.schema, self.function, results.row_count, self.elapsed
                    ),
                );
                self.result = Some(results);
                true
            }
            Ok(None) => {
                self.state = TaskState::Cancelled;
                self.emit(
                    listener,
                    None,
                    Severity::Warning,
                    format!("Execution of {}.{} cancelled", self.schema, self.function),
                );
                false
            }
            Err(e) => {
                self.state = TaskState::Failed;
                let message = e.to_string();
                self.emit(
                    listener,
                    None,
                    Severity::Critical,
                    format!(
                        "Error executing function {}.{}: {}",
                        self.schema, self.function, message
                    ),
                );
                self.error_message = Some(message);
                false
            }
        }
    }

    /// `Ok(None)` means the task observed a cancellation
    async fn execute(&self, listener: &dyn TaskListener) -> DbResult<Option<QueryResults>> {
        if self.is_cancelled() {
            return Ok(None);
        }
        let db = tokio::select! {
            res = self.connector.connect(&self.profile) => match res {
                Ok(db) => db,
                Err(e) if self.is_cancelled() => {
                    tracing::debug!("Connect error after cancellation: {}", e);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            },
            () = self.token.cancelled() => return Ok(None),
        };
        self.emit(
            listener,
            Some(10),
            Severity::Info,
            format!("Connected to \"{}\"", self.profile.name),
        );
        if self.is_cancelled() {
            return Ok(None);
        }

        let sql = self.sql();
        let query = db.query(&sql, &self.parameters);
        tokio::pin!(query);
        let outcome = tokio::select! {
            res = &mut query => res,
            () = self.token.cancelled() => {
                self.emit(
                    listener,
                    None,
                    Severity::Warning,
                    "Cancellation requested; waiting for the server",
                );
                if let Err(e) = db.cancel().await {
                    tracing::warn!("{}", e);
                }
                query.await
            }
        };

        match outcome {
            Err(DbError::Cancelled) => Ok(None),
            Err(e) => Err(e),
            Ok(_) if self.is_cancelled() => Ok(None),
            Ok(results) => Ok(Some(results)),
        }
    }

    /// Deliver the single completion notification for a terminal task
    pub fn finished(&mut self, ok: bool, listener: &dyn TaskListener) {
        if self.notified || !self.state.is_terminal() {
            return;
        }
        self.notified = true;
        match (&self.result, ok) {
            (Some(results), true) => {
                tracing::info!("{} completed", self.description());
                listener.completed(results);
            }
            _ => {
                if self.state == TaskState::Failed {
                    tracing::error!(
                        "{} failed: {}",
                        self.description(),
                        self.error_message().unwrap_or("unknown error")
                    );
                } else {
                    tracing::warn!("{} terminated", self.description());
                }
                listener.terminated(self.error_message());
            }
        }
    }

    fn emit(
        &self,
        listener: &dyn TaskListener,
        percent: Option<u8>,
        severity: Severity,
        message: impl Into<String>,
    ) {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        let event = TaskEvent::new(percent, message, severity, elapsed);
        severity.log(&event.message);
        listener.progress(&event);
    }
}
