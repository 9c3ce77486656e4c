//! The worker loop (§4.3 "Worker"): claim, lock, heartbeat, process,
//! ack/nack/requeue/dead-letter, with cancellation observed at every
//! suspension point.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use runtime_types::{AttemptRecord, AttemptStatus, Delivery, RunStatus, Task, Usage};
use state_store::StateStore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::attempts::AttemptStore;
use crate::backend::QueueBackend;
use crate::coordinator::ShutdownSignal;
use crate::error::Result;
use crate::policy::RuntimePolicy;

/// What a successful [`Processor::process`] produced.
pub struct ProcessOutput {
    pub output: String,
    pub provider: Option<String>,
    pub usage: Option<Usage>,
}

impl ProcessOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            provider: None,
            usage: None,
        }
    }
}

/// A processing failure, classified so the worker knows whether to retry.
#[derive(Debug, Clone)]
pub struct ProcessFailure {
    pub message: String,
    pub retriable: bool,
}

impl ProcessFailure {
    pub fn retriable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retriable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retriable: false,
        }
    }
}

impl std::fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProcessFailure {}

/// The caller-supplied unit of work: input task in, `(output, usage?)` or a
/// classified failure out. Implementations (LLM adapters, graph executors
/// invoked per-task) are external to this crate, the same way `Runner` is
/// external to `graph-exec`/`eval-runner`.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, task: &Task) -> std::result::Result<ProcessOutput, ProcessFailure>;
}

/// A long-running claim/process loop against a [`QueueBackend`], persisting
/// progress through a [`StateStore`] and an [`AttemptStore`].
pub struct Worker {
    id: String,
    queue: Arc<dyn QueueBackend>,
    store: Arc<dyn StateStore>,
    attempts: Arc<dyn AttemptStore>,
    processor: Arc<dyn Processor>,
    policy: RuntimePolicy,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn QueueBackend>,
        store: Arc<dyn StateStore>,
        attempts: Arc<dyn AttemptStore>,
        processor: Arc<dyn Processor>,
        policy: RuntimePolicy,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            store,
            attempts,
            processor,
            policy,
        }
    }

    /// Run until `shutdown` is requested. Between claims with nothing
    /// delivered, sleeps `poll_interval`.
    pub async fn run(&self, shutdown: ShutdownSignal) -> Result<()> {
        loop {
            if shutdown.is_requested() {
                return Ok(());
            }

            let deliveries = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                claimed = self.queue.claim(&self.id, self.policy.claim_block, self.policy.max_concurrent) => claimed?,
            };

            if deliveries.is_empty() {
                tokio::time::sleep(self.policy.poll_interval).await;
                continue;
            }

            for delivery in deliveries {
                if let Err(e) = self.process_delivery(delivery).await {
                    error!(worker = %self.id, error = %e, "error handling delivery");
                }
            }
        }
    }

    /// Fully handle one claimed delivery: lock, heartbeat, process, and
    /// settle (ack/nack/requeue/dead-letter). Exposed separately from
    /// `run()` so tests (and a caller doing manual claim fan-out) can drive
    /// one delivery at a time.
    pub async fn process_delivery(&self, delivery: Delivery) -> Result<()> {
        let run_id = delivery.task.run_id.clone();
        let owner = format!("{}:{}", self.id, Uuid::new_v4());

        if !self.store.acquire_run_lock(&run_id, &owner, self.policy.lock_ttl).await? {
            debug!(worker = %self.id, run_id, "run lock held elsewhere, nacking");
            self.queue.nack(&self.id, std::slice::from_ref(&delivery), "lock held by another worker").await?;
            return Ok(());
        }

        let outcome = self.handle_locked(&delivery, &owner).await;

        if let Err(e) = self.store.release_run_lock(&run_id, &owner).await {
            warn!(worker = %self.id, run_id, error = %e, "failed to release run lock");
        }

        outcome
    }

    async fn handle_locked(&self, delivery: &Delivery, owner: &str) -> Result<()> {
        let task = &delivery.task;
        let run_id = &task.run_id;

        if self.run_is_canceled(run_id).await? {
            return self.settle_canceled(delivery, 1).await;
        }

        let prior_attempts = self.attempts.list_for_run(run_id).await?;
        let attempt_number = prior_attempts.len() as u32 + 1;

        let started_at = Utc::now();
        self.attempts.record_started(AttemptRecord::started(run_id, attempt_number, &self.id, started_at)).await?;

        let heartbeat = self.spawn_heartbeat(run_id.clone(), owner.to_string());
        let process_result = self.processor.process(task).await;
        heartbeat.abort();

        if self.run_is_canceled(run_id).await? {
            return self.settle_canceled(delivery, attempt_number).await;
        }

        match process_result {
            Ok(output) => self.settle_success(delivery, attempt_number, output).await,
            Err(failure) => self.settle_failure(delivery, attempt_number, failure).await,
        }
    }

    async fn run_is_canceled(&self, run_id: &str) -> Result<bool> {
        Ok(self.store.load_run(run_id).await?.status == RunStatus::Canceled)
    }

    fn spawn_heartbeat(&self, run_id: String, owner: String) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let interval = self.policy.heartbeat_interval;
        let ttl = self.policy.lock_ttl;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = store.renew_run_lock(&run_id, &owner, ttl).await {
                    warn!(run_id, error = %e, "heartbeat lock renewal failed");
                }
            }
        })
    }

    async fn settle_success(&self, delivery: &Delivery, attempt: u32, output: ProcessOutput) -> Result<()> {
        let mut run = self.store.load_run(&delivery.task.run_id).await?;
        run.status = RunStatus::Completed;
        run.output = output.output;
        run.provider = output.provider;
        run.usage = output.usage;
        run.updated_at = Utc::now();
        run.completed_at = Some(run.updated_at);
        self.store.save_run(run).await?;

        self.attempts.close(&delivery.task.run_id, attempt, AttemptStatus::Completed, Utc::now(), None).await?;
        self.queue.ack(&self.id, &[delivery.message_id.clone()]).await?;
        info!(worker = %self.id, run_id = %delivery.task.run_id, attempt, "run completed");
        Ok(())
    }

    async fn settle_failure(&self, delivery: &Delivery, attempt: u32, failure: ProcessFailure) -> Result<()> {
        self.attempts
            .close(&delivery.task.run_id, attempt, AttemptStatus::Failed, Utc::now(), Some(failure.message.clone()))
            .await?;

        let max_attempts = delivery.task.max_attempts.max(1);
        if failure.retriable && attempt < max_attempts {
            let mut next_task = delivery.task.next_attempt();
            next_task.attempt = attempt + 1;
            let delay = self.policy.backoff_delay(attempt);
            self.queue.requeue(next_task, &failure.message, delay).await?;
            self.queue.ack(&self.id, &[delivery.message_id.clone()]).await?;
            warn!(worker = %self.id, run_id = %delivery.task.run_id, attempt, delay_ms = delay.as_millis() as u64, "attempt failed, requeued");
            return Ok(());
        }

        let mut run = self.store.load_run(&delivery.task.run_id).await?;
        run.status = RunStatus::Failed;
        run.error = failure.message.clone();
        run.updated_at = Utc::now();
        run.completed_at = Some(run.updated_at);
        self.store.save_run(run).await?;

        self.queue.dead_letter(delivery.clone(), &failure.message).await?;
        error!(worker = %self.id, run_id = %delivery.task.run_id, attempt, "attempts exhausted, dead-lettered");
        Ok(())
    }

    async fn settle_canceled(&self, delivery: &Delivery, attempt: u32) -> Result<()> {
        self.attempts.close(&delivery.task.run_id, attempt, AttemptStatus::Canceled, Utc::now(), None).await.ok();
        self.queue.ack(&self.id, &[delivery.message_id.clone()]).await?;
        info!(worker = %self.id, run_id = %delivery.task.run_id, "run canceled, delivery acked without requeue");
        Ok(())
    }
}
