//! Task progress events and listeners
//!
//! A listener is the bridge between a background task and whatever shows
//! its progress (a terminal, a GUI message bar, a test).

use crate::db::QueryResults;
use std::time::Duration;
use tokio::sync::mpsc;

/// Log level attached to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Write `message` to the log at the matching level
    pub fn log(self, message: &str) {
        match self {
            Severity::Info => tracing::info!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Critical => tracing::error!("{}", message),
        }
    }
}

/// One progress update from a running task or rule
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    /// Completion in percent, when known
    pub percent: Option<u8>,
    pub message: String,
    pub severity: Severity,
    /// Time since the task started
    pub elapsed: Duration,
}

impl TaskEvent {
    pub fn new(
        percent: Option<u8>,
        message: impl Into<String>,
        severity: Severity,
        elapsed: Duration,
    ) -> Self {
        Self {
            percent,
            message: message.into(),
            severity,
            elapsed,
        }
    }
}

/// Receives task callbacks; every method defaults to doing nothing
pub trait TaskListener: Send + Sync {
    fn progress(&self, _event: &TaskEvent) {}

    /// Called once when the task succeeded
    fn completed(&self, _results: &QueryResults) {}

    /// Called once when the task failed or was cancelled. `error` is
    /// `None` for a cancellation.
    fn terminated(&self, _error: Option<&str>) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl TaskListener for NoopListener {}

/// A task callback forwarded over a channel
#[derive(Debug, Clone, PartialEq)]
pub enum TaskNotification {
    Progress(TaskEvent),
    Completed(QueryResults),
    Terminated(Option<String>),
}

/// Forwards every callback into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<TaskNotification>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: TaskNotification) {
        // The receiver may already be gone when the caller stopped listening
        let _ = self.tx.send(notification);
    }
}

impl TaskListener for ChannelListener {
    fn progress(&self, event: &TaskEvent) {
        self.send(TaskNotification::Progress(event.clone()));
    }

    fn completed(&self, results: &QueryResults) {
        self.send(TaskNotification::Completed(results.clone()));
    }

    fn terminated(&self, error: Option<&str>) {
        self.send(TaskNotification::Terminated(error.map(str::to_string)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_forwards_in_order() {
        let (listener, mut rx) = ChannelListener::new();
        let event = TaskEvent::new(Some(10), "connected", Severity::Info, Duration::ZERO);
        listener.progress(&event);
        listener.terminated(Some("boom"));

        assert_eq!(rx.try_recv().unwrap(), TaskNotification::Progress(event));
        assert_eq!(
            rx.try_recv().unwrap(),
            TaskNotification::Terminated(Some("boom".to_string()))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_listener_survives_dropped_receiver() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        listener.terminated(None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }
}
