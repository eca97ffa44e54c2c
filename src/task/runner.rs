//! Spawns execution tasks on the tokio runtime

use crate::db::Connector;
use crate::task::{CancellationToken, FunctionExecutionTask, TaskListener};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};

/// Runs each submitted task on its own tokio task.
///
/// Tasks are independent: two submissions against the same profile run
/// concurrently and are not serialized.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    handle: Handle,
}

impl TaskRunner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Runner bound to the runtime of the calling context.
    ///
    /// Panics when called outside a tokio runtime, like `Handle::current`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Start `task`; `run` is invoked once, then `finished` with its outcome
    pub fn submit<C>(
        &self,
        mut task: FunctionExecutionTask<C>,
        listener: Arc<dyn TaskListener>,
    ) -> TaskHandle<C>
    where
        C: Connector + 'static,
    {
        let token = task.cancellation_token();
        tracing::debug!("Submitting task: {}", task.description());
        let join = self.handle.spawn(async move {
            let ok = task.run(listener.as_ref()).await;
            task.finished(ok, listener.as_ref());
            task
        });
        TaskHandle {
            token,
            started: Instant::now(),
            join,
        }
    }
}

/// Owner's view of a submitted task
pub struct TaskHandle<C> {
    token: CancellationToken,
    started: Instant,
    join: JoinHandle<FunctionExecutionTask<C>>,
}

impl<C> TaskHandle<C> {
    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Time since submission
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task and hand it back for inspection
    pub async fn join(self) -> Result<FunctionExecutionTask<C>, JoinError> {
        self.join.await
    }
}
