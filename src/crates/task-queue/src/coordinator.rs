//! Translates submit/cancel requests into persisted runs and queue entries,
//! and owns the graceful start/stop signal workers watch. The shutdown
//! primitive (`AtomicBool` + `tokio::sync::Notify`) generalizes from "one
//! in-flight run" to "however many workers are currently polling".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use runtime_types::{Run, RunStatus, Task};
use state_store::StateStore;
use tokio::sync::Notify;
use tracing::info;

use crate::backend::{QueueBackend, QueueStats};
use crate::error::Result;

/// A graceful shutdown signal shared between a coordinator and every worker
/// it spawned. Cloning shares the same underlying flag.
#[derive(Clone)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
            self.notify.notify_waiters();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once `request()` has been called; a no-op await if it
    /// already has been, so callers can `select!` against it without
    /// missing a signal raised before they started waiting.
    pub async fn cancelled(&self) {
        if self.is_requested() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A submission request, translated by the coordinator into a persisted
/// `queued` run plus an enqueued `attempt = 1` task.
pub struct SubmitRequest {
    pub run_id: String,
    pub session_id: String,
    pub input: String,
    pub max_attempts: u32,
    pub mode: Option<String>,
    pub workflow: Option<String>,
}

impl SubmitRequest {
    pub fn new(run_id: impl Into<String>, session_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            input: input.into(),
            max_attempts: 3,
            mode: None,
            workflow: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// The control-plane surface (§6.4): submit, cancel, and queue introspection,
/// plus the shutdown signal workers spawned from `start()` observe.
pub struct Coordinator {
    store: Arc<dyn StateStore>,
    queue: Arc<dyn QueueBackend>,
    shutdown: ShutdownSignal,
}

impl Coordinator {
    pub fn new(store: Arc<dyn StateStore>, queue: Arc<dyn QueueBackend>) -> Self {
        Self {
            store,
            queue,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Persist the run as `queued` and enqueue its first attempt.
    pub async fn submit_run(&self, request: SubmitRequest) -> Result<String> {
        let now = Utc::now();
        let mut run = Run::new(&request.run_id, &request.session_id, &request.input, now);
        run.status = RunStatus::Queued;
        self.store.save_run(run).await?;

        let task = Task::first_attempt(&request.run_id, &request.session_id, &request.input, request.max_attempts.max(1));
        let task = Task { mode: request.mode, workflow: request.workflow, ..task };
        let message_id = self.queue.enqueue(task).await?;
        Ok(message_id)
    }

    /// Mark the run `canceled`. Workers observe this at their next status
    /// re-read (heartbeat boundary or pre-process check) and abandon the
    /// attempt rather than the coordinator reaching into the queue.
    pub async fn cancel_run(&self, run_id: &str) -> Result<()> {
        let mut run = self.store.load_run(run_id).await?;
        if !matches!(run.status, RunStatus::Completed | RunStatus::Failed | RunStatus::Canceled) {
            run.status = RunStatus::Canceled;
            run.updated_at = Utc::now();
            self.store.save_run(run).await?;
        }
        Ok(())
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.queue.stats().await
    }

    /// No coordinator-owned background loop runs beyond the shutdown signal
    /// itself — workers poll the queue independently, each holding a clone
    /// from [`Coordinator::shutdown_signal`]. `start` is a no-op marker for
    /// symmetry with `stop`; the signal is live from construction.
    pub fn start(&self) {}

    pub fn stop(&self) {
        self.shutdown.request();
    }
}
